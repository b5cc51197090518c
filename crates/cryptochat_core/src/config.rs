use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub llm: LlmConfig,
    pub sampling: SamplingConfig,
    pub room: RoomConfig,
    pub similarity: SimilarityConfig,
    pub strategy: StrategyKind,
    pub store: StoreConfig,
    pub enrichment: EnrichmentConfig,
    pub logging: LoggingConfig,
    /// Extra persona TOML files merged into the bundled roster.
    pub persona_dir: Option<PathBuf>,
}

impl ChatConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: ChatConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LLM_PROVIDER") {
            self.llm.provider = v;
        }
        if let Ok(v) = std::env::var("OPENAI_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("OPENAI_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("LLM_PROXY_URL") {
            self.llm.proxy_url = Some(v);
        }
        if let Ok(v) = std::env::var("LLM_TEMPERATURE") {
            if let Ok(n) = v.parse() {
                self.sampling.temperature = n;
            }
        }
        if let Ok(v) = std::env::var("CHAT_SEED") {
            if let Ok(n) = v.parse() {
                self.room.seed = Some(n);
            }
        }
        if let Ok(v) = std::env::var("ENRICHMENT_URL") {
            self.enrichment.base_url = Some(v);
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// "openai" or "mock".
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// HTTP(S) proxy for every completion request, credentials inline if needed.
    pub proxy_url: Option<String>,
    /// Orchestrator budget for one completion call. Raised when needed so that
    /// every retry attempt fits inside it.
    pub timeout_secs: u64,
    /// Timeout of a single HTTP attempt.
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    /// First pause between attempts, doubled after each failure.
    pub retry_backoff_ms: u64,
    pub retry_backoff_max_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            base_url: None,
            proxy_url: None,
            timeout_secs: 30,
            request_timeout_secs: 10,
            max_attempts: 3,
            retry_backoff_ms: 1000,
            retry_backoff_max_ms: 8000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    pub max_tokens: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 1.4,
            top_p: None,
            presence_penalty: 0.3,
            frequency_penalty: 0.3,
            max_tokens: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    pub topics: Vec<String>,
    pub participants_min: usize,
    pub participants_max: usize,
    /// Generated turns per bounded discussion, after the opening line.
    pub turns_min: usize,
    pub turns_max: usize,
    /// How many recent turns go into each prompt.
    pub context_window: usize,
    pub pacing_min_ms: u64,
    pub pacing_max_ms: u64,
    pub discussion_gap_ms: u64,
    /// Spoken in place of a reply the model failed to produce.
    pub fallback_line: String,
    pub seed: Option<u64>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            topics: default_topics(),
            participants_min: 2,
            participants_max: 3,
            turns_min: 2,
            turns_max: 4,
            context_window: 3,
            pacing_min_ms: 500,
            pacing_max_ms: 2000,
            discussion_gap_ms: 2000,
            fallback_line: "cant be bothered rn".to_string(),
            seed: None,
        }
    }
}

fn default_topics() -> Vec<String> {
    [
        "BeraChain launch",
        "Base token rumors",
        "Linea TVL growth",
        "Monad testnet",
        "0G AI integrations",
        "Sahara Labs update",
        "MegaETH architecture",
        "BOB on Bitcoin",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub enabled: bool,
    /// Scores strictly above this count as a repeat.
    pub threshold: f32,
    /// Recent transcript lines compared against each draft.
    pub history_window: usize,
    /// Added to the sampling temperature for the single regeneration.
    pub regeneration_temperature_boost: f32,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.7,
            history_window: 5,
            regeneration_temperature_boost: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// In-character replies with stylistic noise.
    #[default]
    Roleplay,
    /// A bored operator typing for the account.
    LazyOperator,
    /// Persona embedded as JSON in the system prompt.
    JsonPersona,
    /// Roleplay grounded on topic enrichment.
    Grounded,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StrategyKind::Roleplay => "roleplay",
            StrategyKind::LazyOperator => "lazy_operator",
            StrategyKind::JsonPersona => "json_persona",
            StrategyKind::Grounded => "grounded",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            db_path: "cryptochat.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Lookup service root; enrichment is off when unset.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset.
    pub level: String,
    pub json: bool,
    /// Directory for a daily rolling log file.
    pub file_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
            file_dir: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
