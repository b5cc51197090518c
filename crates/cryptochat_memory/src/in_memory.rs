use anyhow::{bail, Result};
use async_trait::async_trait;
use cryptochat_core::{StoredMessage, TranscriptStore};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local transcripts. Lost on exit.
#[derive(Debug, Default)]
pub struct InMemoryTranscriptStore {
    rooms: RwLock<HashMap<String, Vec<StoredMessage>>>,
}

impl InMemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn room_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.rooms.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl TranscriptStore for InMemoryTranscriptStore {
    async fn create_room(&self, room_id: &str) -> Result<()> {
        self.rooms
            .write()
            .await
            .entry(room_id.to_string())
            .or_default();
        Ok(())
    }

    async fn append_message(&self, room_id: &str, speaker: &str, text: &str) -> Result<()> {
        let mut rooms = self.rooms.write().await;
        let Some(messages) = rooms.get_mut(room_id) else {
            bail!("Room {} does not exist", room_id);
        };
        messages.push(StoredMessage {
            speaker: speaker.to_string(),
            text: text.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        });
        Ok(())
    }

    async fn recent_messages(&self, room_id: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        let rooms = self.rooms.read().await;
        let messages = rooms.get(room_id).map(Vec::as_slice).unwrap_or_default();
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }
}
