use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One utterance in a session transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub seq: usize,
    pub speaker: String,
    pub text: String,
    /// Derived from the unsanitized reply.
    pub is_question: bool,
    pub topic: String,
    /// True when `text` is the fallback filler for a failed generation.
    #[serde(default)]
    pub placeholder: bool,
}

/// Turns taken per persona since the current topic started.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeakerUsage {
    counts: HashMap<String, u32>,
}

impl SpeakerUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, handle: &str) -> u32 {
        self.counts.get(handle).copied().unwrap_or(0)
    }

    pub fn increment(&mut self, handle: &str) {
        *self.counts.entry(handle.to_string()).or_insert(0) += 1;
    }

    pub fn reset(&mut self) {
        self.counts.clear();
    }

    /// Smallest count among `pool`.
    pub fn min_over(&self, pool: &[String]) -> Option<u32> {
        pool.iter().map(|h| self.count(h)).min()
    }

    /// Largest minus smallest count among `pool`.
    pub fn spread(&self, pool: &[String]) -> u32 {
        let max = pool.iter().map(|h| self.count(h)).max().unwrap_or(0);
        max - self.min_over(pool).unwrap_or(0)
    }
}

/// A running discussion: topic, transcript and speaker bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub room_id: String,
    pub topic: String,
    pub turns: Vec<Turn>,
    /// Personas eligible to speak in the current round.
    pub pool: Vec<String>,
    pub usage: SpeakerUsage,
}

impl Session {
    pub fn new(topic: &str, pool: Vec<String>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            room_id: format!("room-{}", id.simple()),
            topic: topic.to_string(),
            turns: Vec::new(),
            pool,
            usage: SpeakerUsage::new(),
        }
    }

    /// Append a turn under the active topic.
    pub fn record(&mut self, speaker: &str, text: String, is_question: bool, placeholder: bool) -> &Turn {
        let turn = Turn {
            seq: self.turns.len(),
            speaker: speaker.to_string(),
            text,
            is_question,
            topic: self.topic.clone(),
            placeholder,
        };
        self.turns.push(turn);
        &self.turns[self.turns.len() - 1]
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn last_speaker(&self) -> Option<&str> {
        self.turns.last().map(|t| t.speaker.as_str())
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// Switch topic: the transcript is kept, speaker bookkeeping starts over.
    pub fn change_topic(&mut self, topic: &str, pool: Vec<String>) {
        self.topic = topic.to_string();
        self.pool = pool;
        self.usage.reset();
    }
}
