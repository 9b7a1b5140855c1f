//! Bounded retries for store operations.
//!
//! Every store call the engine makes goes through [`RetryPolicy::run`]. Each
//! attempt runs under a deadline; transient failures and timeouts are
//! retried with doubling backoff until the attempt budget is spent, at which
//! point the caller gets [`CoreError::StoreUnavailable`]. Permanent failures
//! (missing rows, corrupt data) are returned immediately.

use std::future::Future;
use std::time::Duration;

use twissandra_db::DbError;

use crate::error::CoreError;

/// Retry and timeout settings for a single store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Sleep before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound on the doubling backoff.
    pub max_backoff: Duration,
    /// Deadline for each attempt.
    pub write_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(25),
            max_backoff: Duration::from_secs(1),
            write_timeout: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub const fn no_retry(write_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            write_timeout,
        }
    }

    /// Backoff to sleep after the given (1-based) failed attempt.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `op`, retrying transient failures.
    ///
    /// `what` names the operation in log lines and in the final error.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreUnavailable`] once every attempt has failed
    /// transiently or timed out, or the converted [`DbError`] of the first
    /// permanent failure.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DbError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt: u32 = 1;
        loop {
            let reason = match tokio::time::timeout(self.write_timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) if !err.is_transient() => return Err(err.into()),
                Ok(Err(err)) => err.to_string(),
                Err(_elapsed) => format!("timed out after {:?}", self.write_timeout),
            };

            if attempt >= max_attempts {
                tracing::warn!(
                    operation = what,
                    attempts = attempt,
                    error = %reason,
                    "Store operation failed, giving up"
                );
                return Err(CoreError::StoreUnavailable(format!(
                    "{what}: {reason} (after {attempt} attempts)"
                )));
            }

            let backoff = self.backoff_after(attempt);
            tracing::warn!(
                operation = what,
                attempt,
                backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                error = %reason,
                "Store operation failed, retrying"
            );
            tokio::time::sleep(backoff).await;
            attempt = attempt.saturating_add(1);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use twissandra_db::Table;

    use super::*;

    fn quick() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            write_timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            write_timeout: Duration::from_secs(1),
        };
        assert_eq!(policy.backoff_after(1), Duration::from_millis(10));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(20));
        assert_eq!(policy.backoff_after(3), Duration::from_millis(40));
        assert_eq!(policy.backoff_after(4), Duration::from_millis(50));
        assert_eq!(policy.backoff_after(u32::MAX), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let calls = AtomicU32::new(0);
        let result = quick()
            .run("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(DbError::Unavailable("flaky".to_owned()))
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
    async fn exhausted_attempts_are_unavailable() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = quick()
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DbError::Unavailable("down".to_owned())) }
            })
            .await;
        assert!(matches!(result, Err(CoreError::StoreUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = quick()
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(DbError::RowNotFound {
                        table: Table::Users,
                        row: "quagmire".to_owned(),
                    })
                }
            })
            .await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_time_out() {
        let result: Result<(), _> = quick()
            .run("test", || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(CoreError::StoreUnavailable(_))));
    }
}
