use backoff::ExponentialBackoff;
use serenity::http::HttpError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{BotError, Result};

/// Bounded exponential backoff for Discord calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_elapsed: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: config.initial_backoff(),
            max_elapsed: config.max_elapsed(),
        }
    }
}

/// Rate limits, server errors and connection failures are worth retrying
pub fn is_transient(err: &serenity::Error) -> bool {
    match err {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) => {
            response.status_code.is_server_error() || response.status_code.as_u16() == 429
        }
        serenity::Error::Http(HttpError::Request(_)) => true,
        serenity::Error::Io(_) => true,
        _ => false,
    }
}

/// Run `op` until it succeeds, fails permanently, or the policy is exhausted.
/// Failures surface as [`BotError::Transport`] naming the operation.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    transient: fn(&E) -> bool,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    let backoff = ExponentialBackoff {
        current_interval: policy.initial_backoff,
        initial_interval: policy.initial_backoff,
        max_elapsed_time: Some(policy.max_elapsed),
        ..Default::default()
    };
    let max_attempts = policy.max_attempts;
    let mut attempt = 0u32;

    backoff::future::retry(backoff, || {
        attempt += 1;
        let current = attempt;
        let fut = op();
        async move {
            fut.await.map_err(|e| {
                if current < max_attempts && transient(&e) {
                    warn!(
                        "{} failed (attempt {}/{}), retrying: {}",
                        operation, current, max_attempts, e
                    );
                    backoff::Error::Transient(e)
                } else {
                    backoff::Error::Permanent(e)
                }
            })
        }
    })
    .await
    .map_err(|e| BotError::Transport {
        operation: operation.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Flaky,
        Fatal,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn flaky_only(e: &TestError) -> bool {
        matches!(e, TestError::Flaky)
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_elapsed: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(3), "fetch roles", flaky_only, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(TestError::Flaky)
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast_policy(2), "send", flaky_only, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError::Flaky) }
        })
        .await;

        assert!(matches!(result, Err(BotError::Transport { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast_policy(5), "send", flaky_only, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError::Fatal) }
        })
        .await;

        match result {
            Err(BotError::Transport { operation, message }) => {
                assert_eq!(operation, "send");
                assert_eq!(message, "Fatal");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
