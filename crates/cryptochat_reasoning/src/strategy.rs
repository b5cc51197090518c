//! Response strategies: how a persona is prompted and how its raw reply is styled.

use crate::llm::CompletionParams;
use crate::prompts::PromptAssembler;
use cryptochat_core::config::StrategyKind;
use cryptochat_core::sanitize::{clip_sentences, first_sentence, is_question, sanitize};
use cryptochat_core::{Enrichment, Persona, Turn};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

/// Chance that a roleplay reply is cut down to its first sentence.
pub const FIRST_SENTENCE_PROBABILITY: f64 = 0.2;
/// Chance that a roleplay reply gets one of the speaker's adjectives tacked on.
pub const ADJECTIVE_PROBABILITY: f64 = 0.3;

const LAZY_OPERATOR_MAX_TOKENS: u32 = 40;

/// Everything a strategy needs to phrase one turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnContext<'a> {
    pub topic: &'a str,
    /// Last few turns, oldest first.
    pub recent: &'a [Turn],
    /// The previous turn was a question.
    pub answer_previous: bool,
    pub ask_question: bool,
    pub grounding: Option<&'a Enrichment>,
}

/// A reply after styling, ready for the transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct StyledReply {
    pub text: String,
    /// Read from the styled text before the question mark is stripped.
    pub is_question: bool,
}

impl StyledReply {
    pub fn from_styled(styled: &str) -> Self {
        Self {
            text: sanitize(styled),
            is_question: is_question(styled),
        }
    }
}

pub trait ResponseStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn system_prompt(&self, persona: &Persona) -> String;

    fn turn_prompt(&self, persona: &Persona, ctx: &TurnContext<'_>) -> String {
        PromptAssembler::turn_prompt(
            persona,
            ctx.recent,
            ctx.topic,
            ctx.answer_previous,
            ctx.ask_question,
            "",
        )
    }

    fn sampling(&self, base: &CompletionParams) -> CompletionParams {
        base.clone()
    }

    /// Turn the raw completion into the text that goes on the transcript.
    fn finish(&self, _persona: &Persona, raw: &str, _rng: &mut dyn RngCore) -> StyledReply {
        StyledReply::from_styled(raw)
    }

    /// Whether the orchestrator should fetch topic enrichment before prompting.
    fn wants_grounding(&self) -> bool {
        false
    }
}

pub fn strategy_for(kind: StrategyKind) -> Box<dyn ResponseStrategy> {
    match kind {
        StrategyKind::Roleplay => Box::new(Roleplay),
        StrategyKind::LazyOperator => Box::new(LazyOperator),
        StrategyKind::JsonPersona => Box::new(JsonPersona),
        StrategyKind::Grounded => Box::new(Grounded),
    }
}

// ============================================================================
// Roleplay
// ============================================================================

/// In-character replies with a little stylistic noise.
pub struct Roleplay;

impl ResponseStrategy for Roleplay {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Roleplay
    }

    fn system_prompt(&self, persona: &Persona) -> String {
        PromptAssembler::character_context(persona)
    }

    fn finish(&self, persona: &Persona, raw: &str, rng: &mut dyn RngCore) -> StyledReply {
        let mut text = if rng.gen_bool(FIRST_SENTENCE_PROBABILITY) {
            first_sentence(raw).to_string()
        } else {
            raw.to_string()
        };

        if rng.gen_bool(ADJECTIVE_PROBABILITY) {
            if let Some(adjective) = persona.adjectives.choose(rng) {
                text.push(' ');
                text.push_str(adjective);
            }
        }

        StyledReply::from_styled(&text)
    }
}

// ============================================================================
// Lazy operator
// ============================================================================

/// A bored human paid to keep the account active.
pub struct LazyOperator;

impl ResponseStrategy for LazyOperator {
    fn kind(&self) -> StrategyKind {
        StrategyKind::LazyOperator
    }

    fn system_prompt(&self, persona: &Persona) -> String {
        format!(
            "You are a bored community operator paid to post as {} ({}) in a crypto group chat.\n\
             You barely read the chat. Reply with one short line, all lower case, \
             no hashtags, no emojis, no greetings.\n\n\
             The account usually talks about: {}\n\
             Words the account uses: {}",
            persona.handle,
            persona.name,
            persona.topics.join(", "),
            persona.adjectives.join(", "),
        )
    }

    fn sampling(&self, base: &CompletionParams) -> CompletionParams {
        CompletionParams {
            max_tokens: base.max_tokens.min(LAZY_OPERATOR_MAX_TOKENS),
            ..base.clone()
        }
    }

    fn finish(&self, _persona: &Persona, raw: &str, _rng: &mut dyn RngCore) -> StyledReply {
        let mut reply = StyledReply::from_styled(&clip_sentences(raw, 1));
        reply.text = reply.text.to_lowercase();
        reply
    }
}

// ============================================================================
// JSON persona
// ============================================================================

/// The whole persona record handed to the model as JSON.
pub struct JsonPersona;

impl ResponseStrategy for JsonPersona {
    fn kind(&self) -> StrategyKind {
        StrategyKind::JsonPersona
    }

    fn system_prompt(&self, persona: &Persona) -> String {
        let sheet = serde_json::to_string_pretty(persona).unwrap_or_else(|e| {
            tracing::warn!("Failed to serialize persona {}: {}", persona.handle, e);
            String::new()
        });
        format!(
            "Roleplay the character described by this JSON character sheet. \
             Stay in character, keep replies short and casual.\n\n{}",
            sheet
        )
    }
}

// ============================================================================
// Grounded
// ============================================================================

/// Roleplay prompt plus whatever the enrichment service knows about the topic.
pub struct Grounded;

impl ResponseStrategy for Grounded {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Grounded
    }

    fn system_prompt(&self, persona: &Persona) -> String {
        PromptAssembler::character_context(persona)
    }

    fn turn_prompt(&self, persona: &Persona, ctx: &TurnContext<'_>) -> String {
        PromptAssembler::turn_prompt(
            persona,
            ctx.recent,
            ctx.topic,
            ctx.answer_previous,
            ctx.ask_question,
            &PromptAssembler::facts(ctx.grounding),
        )
    }

    fn wants_grounding(&self) -> bool {
        true
    }
}
