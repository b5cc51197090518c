use crate::error::ChatError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Roster shipped with the binary, one TOML document per persona.
const BUILTIN_PERSONAS: &[(&str, &str)] = &[
    ("crypto_degen.toml", include_str!("../personas/crypto_degen.toml")),
    ("crypto_og.toml", include_str!("../personas/crypto_og.toml")),
    ("mev_dev.toml", include_str!("../personas/mev_dev.toml")),
    ("retro_dropper.toml", include_str!("../personas/retro_dropper.toml")),
    ("chat_grinder.toml", include_str!("../personas/chat_grinder.toml")),
    ("chain_ambassador.toml", include_str!("../personas/chain_ambassador.toml")),
    ("defi_dev.toml", include_str!("../personas/defi_dev.toml")),
];

/// A question/answer pair showing how the persona talks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageExample {
    pub prompt: String,
    pub reply: String,
}

/// Style directives split by context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleGuide {
    pub all: Vec<String>,
    pub chat: Vec<String>,
    pub post: Vec<String>,
}

/// A scripted chat character. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub handle: String,
    /// Natural-language directive placed at the top of the system prompt.
    pub system: String,
    #[serde(default)]
    pub bio: Vec<String>,
    #[serde(default)]
    pub lore: Vec<String>,
    #[serde(default)]
    pub message_examples: Vec<MessageExample>,
    #[serde(default)]
    pub post_examples: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub style: StyleGuide,
    #[serde(default)]
    pub adjectives: Vec<String>,
}

impl Persona {
    pub fn from_toml_str(origin: &str, source: &str) -> Result<Self, ChatError> {
        let persona: Persona = toml::from_str(source).map_err(|e| ChatError::PersonaParse {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;
        if persona.handle.trim().is_empty() {
            return Err(ChatError::PersonaParse {
                origin: origin.to_string(),
                message: "handle must not be empty".to_string(),
            });
        }
        Ok(persona)
    }

    /// Example dialogue formatted as `Q: ...` / `A: ...` lines.
    pub fn format_examples(&self) -> String {
        self.message_examples
            .iter()
            .map(|ex| format!("Q: {}\nA: {}", ex.prompt, ex.reply))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Read-only catalog of personas, indexed by handle.
#[derive(Debug, Clone, Default)]
pub struct PersonaRegistry {
    personas: Vec<Persona>,
    index: HashMap<String, usize>,
}

impl PersonaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundled roster.
    pub fn builtin() -> Result<Self, ChatError> {
        let mut registry = Self::new();
        for (origin, source) in BUILTIN_PERSONAS {
            registry.insert(Persona::from_toml_str(origin, source)?)?;
        }
        Ok(registry)
    }

    /// Add every `*.toml` file in `dir` to the registry.
    /// Files are read in name order so registry order is stable.
    pub fn load_dir<P: AsRef<Path>>(&mut self, dir: P) -> anyhow::Result<usize> {
        let mut paths: Vec<_> = std::fs::read_dir(dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            let source = std::fs::read_to_string(&path)?;
            let persona = Persona::from_toml_str(&path.display().to_string(), &source)?;
            tracing::debug!("Loaded persona {} from {}", persona.handle, path.display());
            self.insert(persona)?;
            loaded += 1;
        }
        Ok(loaded)
    }

    pub fn insert(&mut self, persona: Persona) -> Result<(), ChatError> {
        if self.index.contains_key(&persona.handle) {
            return Err(ChatError::DuplicateHandle(persona.handle));
        }
        self.index.insert(persona.handle.clone(), self.personas.len());
        self.personas.push(persona);
        Ok(())
    }

    pub fn get(&self, handle: &str) -> Option<&Persona> {
        self.index.get(handle).map(|&i| &self.personas[i])
    }

    pub fn require(&self, handle: &str) -> Result<&Persona, ChatError> {
        self.get(handle)
            .ok_or_else(|| ChatError::UnknownPersona(handle.to_string()))
    }

    pub fn handles(&self) -> Vec<String> {
        self.personas.iter().map(|p| p.handle.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Persona> {
        self.personas.iter()
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}
