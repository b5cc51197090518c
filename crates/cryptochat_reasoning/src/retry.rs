//! Attempt loop for completion requests.
//!
//! Every attempt reports whether its failure is worth another try. Timeouts,
//! dropped connections, 408, 429 and 5xx are. Anything else ends the call.

use anyhow::{anyhow, Error, Result};
use cryptochat_core::config::LlmConfig;
use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;

const MAX_JITTER_MS: u64 = 250;

/// How often and how patiently one completion call is attempted.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub request_timeout: Duration,
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &LlmConfig) -> Self {
        Self {
            attempts: cfg.max_attempts.max(1),
            request_timeout: Duration::from_secs(cfg.request_timeout_secs.max(1)),
            backoff: Duration::from_millis(cfg.retry_backoff_ms),
            max_backoff: Duration::from_millis(cfg.retry_backoff_max_ms.max(cfg.retry_backoff_ms)),
        }
    }

    /// Pause after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff.saturating_mul(factor).min(self.max_backoff)
    }

    /// Upper bound on a whole call: every attempt running into its timeout,
    /// with the longest possible pause between attempts.
    pub fn call_budget(&self) -> Duration {
        let pause = self.max_backoff + Duration::from_millis(MAX_JITTER_MS);
        self.request_timeout * self.attempts + pause * self.attempts.saturating_sub(1)
    }
}

/// Why a single attempt failed.
#[derive(Debug)]
pub enum AttemptError {
    /// Worth another try, after the server's requested pause if it sent one.
    Transient {
        error: Error,
        retry_after: Option<Duration>,
    },
    Fatal(Error),
}

impl AttemptError {
    pub fn transient(error: Error) -> Self {
        AttemptError::Transient {
            error,
            retry_after: None,
        }
    }

    /// Classify a non-success HTTP response.
    pub fn from_status(status: StatusCode, headers: &HeaderMap, body: &str) -> Self {
        let error = anyhow!(
            "API error ({}): {}",
            status,
            body.chars().take(200).collect::<String>()
        );
        if is_transient_status(status) {
            AttemptError::Transient {
                error,
                retry_after: retry_after(headers),
            }
        } else {
            AttemptError::Fatal(error)
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// `Retry-After` in delta-seconds form. HTTP dates are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(secs))
}

/// Run `op` until it succeeds, fails fatally, or the policy runs out of attempts.
/// `op` receives the 1-based attempt number.
pub async fn attempt<T, F, Fut>(policy: &RetryPolicy, label: &str, op: F) -> Result<T>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut n = 1;
    loop {
        let (error, server_pause) = match op(n).await {
            Ok(value) => {
                if n > 1 {
                    tracing::info!("{} answered on attempt {}", label, n);
                }
                return Ok(value);
            }
            Err(AttemptError::Fatal(error)) => return Err(error),
            Err(AttemptError::Transient { error, retry_after }) => (error, retry_after),
        };

        if n >= policy.attempts {
            return Err(error.context(format!("{} gave up after {} attempts", label, n)));
        }

        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=MAX_JITTER_MS));
        let pause = server_pause
            .map(|d| d.min(policy.max_backoff))
            .unwrap_or_else(|| policy.delay_after(n))
            + jitter;
        tracing::warn!(
            "{} attempt {}/{} failed: {:#}. Next try in {:.1}s",
            label,
            n,
            policy.attempts,
            error,
            pause.as_secs_f64()
        );
        tokio::time::sleep(pause).await;
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            request_timeout: Duration::from_secs(10),
            backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(4),
        }
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let p = policy(5);
        assert_eq!(p.delay_after(1), Duration::from_secs(1));
        assert_eq!(p.delay_after(2), Duration::from_secs(2));
        assert_eq!(p.delay_after(3), Duration::from_secs(4));
        assert_eq!(p.delay_after(4), Duration::from_secs(4));
    }

    #[test]
    fn test_call_budget_covers_every_attempt() {
        assert_eq!(policy(1).call_budget(), Duration::from_secs(10));
        let p = policy(3);
        assert!(p.call_budget() >= p.request_timeout * 3 + p.max_backoff * 2);
    }

    #[test]
    fn test_policy_from_config_never_zero_attempts() {
        let cfg = LlmConfig {
            max_attempts: 0,
            request_timeout_secs: 0,
            ..LlmConfig::default()
        };
        let p = RetryPolicy::from_config(&cfg);
        assert_eq!(p.attempts, 1);
        assert_eq!(p.request_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_status_classification() {
        let headers = HeaderMap::new();
        for status in [StatusCode::TOO_MANY_REQUESTS, StatusCode::BAD_GATEWAY, StatusCode::REQUEST_TIMEOUT] {
            assert!(matches!(
                AttemptError::from_status(status, &headers, ""),
                AttemptError::Transient { .. }
            ));
        }
        for status in [StatusCode::UNAUTHORIZED, StatusCode::BAD_REQUEST, StatusCode::NOT_IMPLEMENTED] {
            assert!(matches!(
                AttemptError::from_status(status, &headers, ""),
                AttemptError::Fatal(_)
            ));
        }
    }

    #[test]
    fn test_retry_after_seconds_are_read() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        match AttemptError::from_status(StatusCode::TOO_MANY_REQUESTS, &headers, "slow down") {
            AttemptError::Transient { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(3)))
            }
            AttemptError::Fatal(e) => panic!("expected transient, got {:#}", e),
        }

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let calls = AtomicU32::new(0);
        let out = attempt(&policy(3), "test", |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err(AttemptError::transient(anyhow!("timed out")))
                } else {
                    Ok("third time")
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(out, "third time");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_failure_stops_immediately() {
        let calls = AtomicU32::new(0);
        let err = attempt(&policy(3), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(AttemptError::Fatal(anyhow!("API error (401)"))) }
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("401"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_keep_last_error() {
        let err = attempt(&policy(2), "test", |_| async {
            Err::<(), _>(AttemptError::transient(anyhow!("503 upstream")))
        })
        .await
        .unwrap_err();
        assert!(format!("{:#}", err).contains("gave up after 2 attempts"));
        assert!(format!("{:#}", err).contains("503 upstream"));
    }
}
