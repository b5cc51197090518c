use anyhow::Result;
use async_trait::async_trait;
use cryptochat_core::config::SamplingConfig;

const MAX_TEMPERATURE: f32 = 2.0;

/// Sampling parameters for one completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionParams {
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self::from(&SamplingConfig::default())
    }
}

impl From<&SamplingConfig> for CompletionParams {
    fn from(cfg: &SamplingConfig) -> Self {
        Self {
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            presence_penalty: cfg.presence_penalty,
            frequency_penalty: cfg.frequency_penalty,
        }
    }
}

impl CompletionParams {
    /// Same parameters with the temperature raised by `boost`, capped at 2.0.
    pub fn hotter(&self, boost: f32) -> Self {
        let wanted = self.temperature + boost;
        if wanted > MAX_TEMPERATURE && boost > 0.0 {
            tracing::warn!(
                "Temperature {} is already near the {} ceiling, regeneration runs at {}",
                self.temperature,
                MAX_TEMPERATURE,
                wanted.min(MAX_TEMPERATURE)
            );
        }
        Self {
            temperature: wanted.clamp(0.0, MAX_TEMPERATURE),
            ..self.clone()
        }
    }
}

/// The remote chat-completion collaborator: prompt in, text out, may fail.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str, params: CompletionParams) -> Result<String>;
}
