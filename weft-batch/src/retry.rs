//! Retry wrapper for remote calls
//!
//! Every call to a backend goes through here. Transient failures (rate
//! limiting, connectivity) are retried with doubling backoff up to a bounded
//! attempt count; anything else propagates immediately. Exhausting the
//! attempts surfaces the backend as unavailable.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{BatchError, Result};

/// Bounded-retry policy applied to individual backend calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: usize,
    /// Delay before the first retry; doubles each retry after that.
    pub base_delay: Duration,
    /// Backoff never exceeds this.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 6,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(16),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries, for tests and tight call sites.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Runs `call`, retrying while it fails transiently.
    ///
    /// `op` names the operation for the log line only.
    pub async fn run<T, F, Fut>(&self, op: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = self.base_delay;
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.attempts => {
                    warn!(
                        "transient failure in {} (attempt {}/{}), retrying in {:?}: {}",
                        op, attempt, self.attempts, delay, err
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.max_delay);
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    return Err(BatchError::Unavailable {
                        attempts: self.attempts,
                        source: Box::new(err),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(attempts: usize) -> RetryPolicy {
        RetryPolicy {
            attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_transient_errors_retried_until_success() {
        let calls = AtomicUsize::new(0);
        let result = fast_policy(5)
            .run("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(BatchError::Transient("hiccup".into()))
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
    async fn test_fatal_error_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = fast_policy(5)
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(BatchError::Configuration("bad".into())) }
            })
            .await;
        assert!(matches!(result, Err(BatchError::Configuration(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_unavailable() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = fast_policy(3)
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(BatchError::RateLimited {
                        status: 429,
                        message: "slow down".into(),
                    })
                }
            })
            .await;
        match result {
            Err(BatchError::Unavailable { attempts, source }) => {
                assert_eq!(attempts, 3);
                assert!(source.is_transient());
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
