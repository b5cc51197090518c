//! Mock LLM provider: deterministic responses for running without API keys.

use crate::llm::{CompletionParams, LlmClient};
use crate::similarity::SIMILARITY_SYSTEM_PROMPT;
use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};

const CANNED_REPLIES: &[&str] = &[
    "ngl this looks early",
    "anyone checked the docs yet?",
    "bridged a little, gas was fine",
    "seen this before. wait for the audit",
    "testnet is live, farming already",
    "team is cooking fr",
];

#[derive(Debug)]
pub struct MockProvider {
    model: String,
    cursor: AtomicUsize,
}

impl MockProvider {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            cursor: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for MockProvider {
    async fn complete(&self, system: &str, _user: &str, _params: CompletionParams) -> Result<String> {
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        if system == SIMILARITY_SYSTEM_PROMPT {
            return Ok("0.1".to_string());
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Mock {} reply #{}", self.model, i);
        Ok(CANNED_REPLIES[i % CANNED_REPLIES.len()].to_string())
    }
}
