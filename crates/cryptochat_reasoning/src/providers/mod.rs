pub mod mock;
pub mod openai;

pub use mock::MockProvider;
pub use openai::OpenAiClient;

use crate::llm::LlmClient;
use anyhow::Result;
use cryptochat_core::config::LlmConfig;
use std::sync::Arc;

/// Build the completion client named by `config.provider`.
pub fn build_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiClient::from_env(config)?)),
        "mock" => Ok(Arc::new(MockProvider::new(&config.model))),
        other => anyhow::bail!("Unknown LLM provider: {}", other),
    }
}
