//! Near-duplicate detection, scored by the remote model.

use crate::llm::{CompletionParams, LlmClient};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

pub const SIMILARITY_SYSTEM_PROMPT: &str = "You rate how similar chat messages are. \
Reply with a single number between 0.0 and 1.0 and nothing else.";

static RE_SCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?|\.\d+").unwrap());

/// Outcome of one scoring request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimilarityScore {
    Scored(f32),
    /// The scorer failed or replied with something unparsable. Treated as
    /// "not similar" so a flaky scorer never blocks the room.
    PermissiveFallback,
}

impl SimilarityScore {
    pub fn exceeds(&self, threshold: f32) -> bool {
        match self {
            SimilarityScore::Scored(score) => *score > threshold,
            SimilarityScore::PermissiveFallback => false,
        }
    }
}

/// First numeric literal in `text`, clamped to [0, 1].
pub fn parse_score(text: &str) -> Option<f32> {
    let m = RE_SCORE.find(text)?;
    let value: f32 = m.as_str().parse().ok()?;
    value.is_finite().then(|| value.clamp(0.0, 1.0))
}

pub struct SimilarityGate {
    client: Arc<dyn LlmClient>,
    threshold: f32,
    timeout: Duration,
}

impl SimilarityGate {
    pub fn new(client: Arc<dyn LlmClient>, threshold: f32) -> Self {
        Self {
            client,
            threshold,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn score(&self, candidate: &str, recent: &[String]) -> SimilarityScore {
        let prompt = format!(
            "Message A:\n{}\n\nRecent messages:\n{}\n\n\
             How similar is message A to the recent messages? \
             0.0 means unrelated, 1.0 means the same message.",
            candidate,
            recent.join("\n")
        );
        let params = CompletionParams {
            max_tokens: 8,
            temperature: 0.0,
            top_p: None,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
        };

        let reply = tokio::time::timeout(
            self.timeout,
            self.client.complete(SIMILARITY_SYSTEM_PROMPT, &prompt, params),
        )
        .await;

        match reply {
            Ok(Ok(text)) => match parse_score(&text) {
                Some(score) => {
                    tracing::debug!("Similarity score {:.2}", score);
                    SimilarityScore::Scored(score)
                }
                None => {
                    tracing::warn!("Unparsable similarity score {:?}, assuming distinct", text);
                    SimilarityScore::PermissiveFallback
                }
            },
            Ok(Err(e)) => {
                tracing::warn!("Similarity scoring failed, assuming distinct: {:#}", e);
                SimilarityScore::PermissiveFallback
            }
            Err(_) => {
                tracing::warn!("Similarity scoring timed out, assuming distinct");
                SimilarityScore::PermissiveFallback
            }
        }
    }

    /// Is `candidate` a near-repeat of the recent transcript?
    /// An empty history is never similar and costs no remote call.
    pub async fn is_too_similar(&self, candidate: &str, recent: &[String]) -> bool {
        if recent.is_empty() {
            return false;
        }
        self.score(candidate, recent).await.exceeds(self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scores by exact match against the recent lines, like a perfect scorer would.
    struct ExactScorer {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl LlmClient for ExactScorer {
        async fn complete(&self, _system: &str, user: &str, _params: CompletionParams) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (a, rest) = user
                .strip_prefix("Message A:\n")
                .and_then(|s| s.split_once("\n\nRecent messages:\n"))
                .unwrap();
            let recent = rest.split("\n\n").next().unwrap();
            if recent.lines().any(|l| l == a) {
                Ok("1.0".into())
            } else {
                Ok("0.0".into())
            }
        }
    }

    struct FixedReply(&'static str);

    #[async_trait::async_trait]
    impl LlmClient for FixedReply {
        async fn complete(&self, _system: &str, _user: &str, _params: CompletionParams) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl LlmClient for Failing {
        async fn complete(&self, _system: &str, _user: &str, _params: CompletionParams) -> anyhow::Result<String> {
            anyhow::bail!("scorer down")
        }
    }

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score("0.95"), Some(0.95));
        assert_eq!(parse_score("Score: 0.4 (roughly)"), Some(0.4));
        assert_eq!(parse_score(".5"), Some(0.5));
        assert_eq!(parse_score("7"), Some(1.0));
        assert_eq!(parse_score("very similar"), None);
        assert_eq!(parse_score(""), None);
    }

    #[tokio::test]
    async fn test_identical_strings_are_too_similar() {
        let scorer = Arc::new(ExactScorer { calls: AtomicUsize::new(0) });
        let gate = SimilarityGate::new(scorer.clone(), 0.7);
        let recent = vec!["wen token".to_string()];
        assert!(gate.is_too_similar("wen token", &recent).await);
        assert!(!gate.is_too_similar("something else", &recent).await);
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_history_is_never_similar() {
        let scorer = Arc::new(ExactScorer { calls: AtomicUsize::new(0) });
        let gate = SimilarityGate::new(scorer.clone(), 0.7);
        assert!(!gate.is_too_similar("anything", &[]).await);
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_threshold_is_strict() {
        let gate = SimilarityGate::new(Arc::new(FixedReply("0.7")), 0.7);
        assert!(!gate.is_too_similar("x", &["y".to_string()]).await);
        let gate = SimilarityGate::new(Arc::new(FixedReply("0.71")), 0.7);
        assert!(gate.is_too_similar("x", &["y".to_string()]).await);
    }

    #[tokio::test]
    async fn test_failures_fall_back_to_permissive() {
        let recent = vec!["y".to_string()];

        let gate = SimilarityGate::new(Arc::new(Failing), 0.7);
        assert_eq!(gate.score("x", &recent).await, SimilarityScore::PermissiveFallback);
        assert!(!gate.is_too_similar("x", &recent).await);

        let gate = SimilarityGate::new(Arc::new(FixedReply("no idea")), 0.7);
        assert_eq!(gate.score("x", &recent).await, SimilarityScore::PermissiveFallback);
        assert!(!gate.is_too_similar("x", &recent).await);
    }
}
