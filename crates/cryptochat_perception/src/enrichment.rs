use anyhow::{Context, Result};
use async_trait::async_trait;
use cryptochat_core::config::EnrichmentConfig;
use cryptochat_core::{Enrichment, TopicEnrichment};
use serde::Serialize;
use std::time::Duration;
use url::Url;

#[derive(Serialize)]
struct LookupRequest<'a> {
    topic: &'a str,
    context: &'a str,
}

/// Topic lookup backed by an HTTP service that answers `POST {base_url}/lookup`.
pub struct HttpTopicEnrichment {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpTopicEnrichment {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(base_url).context("Invalid enrichment base URL")?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            anyhow::bail!("Only HTTP/HTTPS schemes are allowed");
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint: format!("{}/lookup", base_url.trim_end_matches('/')),
            client,
        })
    }

    /// `None` when no enrichment service is configured.
    pub fn from_config(config: &EnrichmentConfig) -> Result<Option<Self>> {
        config
            .base_url
            .as_deref()
            .map(|url| Self::new(url, Duration::from_secs(config.timeout_secs)))
            .transpose()
    }
}

#[async_trait]
impl TopicEnrichment for HttpTopicEnrichment {
    async fn lookup(&self, topic: &str, context: &str) -> Result<Enrichment> {
        let enrichment = self
            .client
            .post(&self.endpoint)
            .json(&LookupRequest { topic, context })
            .send()
            .await
            .context("Failed to reach enrichment service")?
            .error_for_status()
            .context("Enrichment service returned an error")?
            .json::<Enrichment>()
            .await
            .context("Failed to parse enrichment response")?;

        tracing::debug!(
            "Enrichment for {:?}: {} chars, {} snippets",
            topic,
            enrichment.summary.len(),
            enrichment.snippets.len()
        );
        Ok(enrichment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_lookup_posts_topic_and_context() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/lookup"))
            .and(body_json(serde_json::json!({
                "topic": "Monad testnet",
                "context": "degen_ape: checking out Monad testnet"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "summary": "Parallel EVM L1 with a public testnet",
                "snippets": ["10k TPS claimed", "faucet is rate limited"]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let source = HttpTopicEnrichment::new(&format!("{}/", mock_server.uri()), Duration::from_secs(5)).unwrap();
        let result = source
            .lookup("Monad testnet", "degen_ape: checking out Monad testnet")
            .await
            .unwrap();

        assert_eq!(result.summary, "Parallel EVM L1 with a public testnet");
        assert_eq!(result.snippets.len(), 2);
    }

    #[tokio::test]
    async fn test_snippets_are_optional() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/lookup"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "summary": "L2 on Bitcoin" })),
            )
            .mount(&mock_server)
            .await;

        let source = HttpTopicEnrichment::new(&mock_server.uri(), Duration::from_secs(5)).unwrap();
        let result = source.lookup("BOB on Bitcoin", "").await.unwrap();
        assert_eq!(result.summary, "L2 on Bitcoin");
        assert!(result.snippets.is_empty());
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let source = HttpTopicEnrichment::new(&mock_server.uri(), Duration::from_secs(5)).unwrap();
        assert!(source.lookup("anything", "").await.is_err());
    }

    #[test]
    fn test_rejects_non_http_urls() {
        assert!(HttpTopicEnrichment::new("ftp://example.com", Duration::from_secs(1)).is_err());
        assert!(HttpTopicEnrichment::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_from_config() {
        let config = EnrichmentConfig::default();
        assert!(HttpTopicEnrichment::from_config(&config).unwrap().is_none());

        let config = EnrichmentConfig {
            base_url: Some("http://127.0.0.1:9000".to_string()),
            timeout_secs: 3,
        };
        assert!(HttpTopicEnrichment::from_config(&config).unwrap().is_some());
    }
}
