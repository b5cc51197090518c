pub mod config;
pub mod error;
pub mod persona;
pub mod sanitize;
pub mod session;
pub mod turn_taking;

pub use config::ChatConfig;
pub use error::ChatError;
pub use persona::{Persona, PersonaRegistry};
pub use session::{Session, SpeakerUsage, Turn};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One message as persisted by a transcript store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub speaker: String,
    pub text: String,
    pub timestamp: i64, // Unix timestamp
}

/// Grounding material for a topic, returned by an enrichment service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub summary: String,
    #[serde(default)]
    pub snippets: Vec<String>,
}

impl Enrichment {
    pub fn is_empty(&self) -> bool {
        self.summary.trim().is_empty() && self.snippets.is_empty()
    }
}

/// Chat history persistence, keyed by room.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn create_room(&self, room_id: &str) -> anyhow::Result<()>;
    async fn append_message(&self, room_id: &str, speaker: &str, text: &str) -> anyhow::Result<()>;
    /// Up to `limit` most recent messages, oldest first.
    async fn recent_messages(&self, room_id: &str, limit: usize) -> anyhow::Result<Vec<StoredMessage>>;
}

/// Topic lookup used to ground persona replies in facts.
#[async_trait]
pub trait TopicEnrichment: Send + Sync {
    async fn lookup(&self, topic: &str, context: &str) -> anyhow::Result<Enrichment>;
}
