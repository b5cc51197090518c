pub mod api_types;
pub mod console;
pub mod engine;
pub mod llm;
pub mod prompts;
pub mod providers;
pub mod retry;
pub mod similarity;
pub mod strategy;

pub use engine::{DiscussionEvent, DiscussionOrchestrator, DiscussionState};
pub use llm::{CompletionParams, LlmClient};
pub use similarity::{SimilarityGate, SimilarityScore};
pub use strategy::{strategy_for, ResponseStrategy, StyledReply, TurnContext};
