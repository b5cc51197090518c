use crate::api_types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use crate::llm::{CompletionParams, LlmClient};
use crate::retry::{attempt, AttemptError, RetryPolicy};
use anyhow::{anyhow, Context, Result};
use cryptochat_core::config::LlmConfig;
use reqwest::{Client, Proxy};
use std::env;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiClient {
    /// Build a client from config, reading the key from `OPENAI_API_KEY`.
    pub fn from_env(config: &LlmConfig) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?;
        Self::new(config, &api_key)
    }

    pub fn new(config: &LlmConfig, api_key: &str) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let retry = RetryPolicy::from_config(config);
        let mut builder = Client::builder().timeout(retry.request_timeout);
        if let Some(proxy_url) = &config.proxy_url {
            let proxy = Proxy::all(proxy_url)
                .with_context(|| "Invalid proxy URL in llm.proxy_url".to_string())?;
            builder = builder.proxy(proxy);
            tracing::info!("Routing completion requests through proxy");
        }

        Ok(Self {
            client: builder.build()?,
            api_key: api_key.to_string(),
            base_url,
            model: config.model.clone(),
            retry,
        })
    }

    /// One HTTP round trip. Network failures and throttling are transient,
    /// a malformed or empty answer is not.
    async fn send_once(&self, url: &str, payload: &ChatCompletionRequest) -> Result<String, AttemptError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| AttemptError::transient(anyhow::Error::new(e).context("Failed to reach OpenAI")))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::from_status(status, &headers, &body));
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|e| {
            let decode = e.is_decode();
            let error = anyhow::Error::new(e).context("Failed to read OpenAI response");
            if decode {
                AttemptError::Fatal(error)
            } else {
                AttemptError::transient(error)
            }
        })?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AttemptError::Fatal(anyhow!("OpenAI response had no choices")))?;
        tracing::debug!("OpenAI finish_reason: {:?}", choice.finish_reason);

        match choice.message.content {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(AttemptError::Fatal(anyhow!("OpenAI returned an empty message"))),
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, system: &str, user: &str, params: CompletionParams) -> Result<String> {
        let payload = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            presence_penalty: params.presence_penalty,
            frequency_penalty: params.frequency_penalty,
        };
        let url = format!("{}/chat/completions", self.base_url);

        attempt(&self.retry, "OpenAI", |n| {
            tracing::debug!("Completion request to {}, attempt {}", self.model, n);
            self.send_once(&url, &payload)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> LlmConfig {
        LlmConfig {
            base_url: Some(format!("{}/v1/", server.uri())),
            max_attempts: 1,
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn test_complete_sends_sampling_and_parses_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "gpt-3.5-turbo",
                "max_tokens": 60,
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "hi"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "gm ser"}, "finish_reason": "stop"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&config_for(&server), "test-key").unwrap();
        let text = client
            .complete("sys", "hi", CompletionParams::default())
            .await
            .unwrap();
        assert_eq!(text, "gm ser");
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let mut cfg = config_for(&server);
        cfg.max_attempts = 3;
        let client = OpenAiClient::new(&cfg, "nope").unwrap();
        let err = client
            .complete("sys", "hi", CompletionParams::default())
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("401"));
    }

    #[tokio::test]
    async fn test_throttled_request_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "0")
                    .set_body_string("slow down"),
            )
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "back online"}, "finish_reason": "stop"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut cfg = config_for(&server);
        cfg.max_attempts = 3;
        cfg.retry_backoff_ms = 10;
        let client = OpenAiClient::new(&cfg, "k").unwrap();
        let text = client
            .complete("sys", "hi", CompletionParams::default())
            .await
            .unwrap();
        assert_eq!(text, "back online");
    }

    #[tokio::test]
    async fn test_slow_attempt_times_out_and_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(std::time::Duration::from_millis(2500))
                    .set_body_json(json!({
                        "choices": [{"message": {"content": "too slow"}, "finish_reason": "stop"}]
                    })),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "fast reply"}, "finish_reason": "stop"}]
            })))
            .mount(&server)
            .await;

        let mut cfg = config_for(&server);
        cfg.max_attempts = 3;
        cfg.request_timeout_secs = 1;
        cfg.retry_backoff_ms = 10;
        let client = OpenAiClient::new(&cfg, "k").unwrap();
        let text = client
            .complete("sys", "hi", CompletionParams::default())
            .await
            .unwrap();
        assert_eq!(text, "fast reply");
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_content_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": null}, "finish_reason": "length"}]
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&config_for(&server), "k").unwrap();
        assert!(client
            .complete("sys", "hi", CompletionParams::default())
            .await
            .is_err());
    }

    #[test]
    fn test_invalid_proxy_rejected() {
        let cfg = LlmConfig {
            proxy_url: Some("not a url".to_string()),
            ..LlmConfig::default()
        };
        assert!(OpenAiClient::new(&cfg, "k").is_err());
    }
}
