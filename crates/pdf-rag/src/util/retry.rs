//! Bounded exponential backoff for model calls

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::LimitsConfig;
use crate::error::Error;

/// Retry settings shared by embedding and generation calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

/// The last error once retries are exhausted, or the first non-transient one
#[derive(Debug)]
pub struct RetryFailure {
    pub attempts: u32,
    pub error: Error,
}

impl RetryPolicy {
    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self {
            max_retries: limits.max_retries,
            base_delay: Duration::from_millis(limits.retry_base_delay_ms),
            max_delay: Duration::from_millis(limits.retry_max_delay_ms),
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails permanently, or runs out of retries
    pub async fn run<F, Fut, T>(&self, what: &str, operation: F) -> Result<T, RetryFailure>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        let total = self.max_retries + 1;
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    attempt += 1;
                    if attempt >= total || !error.is_transient() {
                        return Err(RetryFailure {
                            attempts: attempt,
                            error,
                        });
                    }

                    let delay = self.delay(attempt - 1);
                    tracing::warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        what,
                        attempt,
                        total,
                        delay,
                        error
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_limits(&LimitsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_millis(1000));
        assert_eq!(policy.delay(10), Duration::from_millis(8000));
        assert_eq!(policy.delay(40), Duration::from_millis(8000));
    }

    #[tokio::test]
    async fn test_recovers_from_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = fast()
            .run("llm", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::llm("connection refused"))
                } else {
                    Ok("answer")
                }
            })
            .await;
        assert_eq!(result.unwrap(), "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts() {
        let failure = fast()
            .run("llm", || async { Err::<(), _>(Error::llm("down")) })
            .await
            .unwrap_err();
        assert_eq!(failure.attempts, 4);
        assert!(matches!(failure.error, Error::Llm(_)));
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let failure = fast()
            .run("llm", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Config("bad model".into()))
            })
            .await
            .unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
