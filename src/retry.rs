//! Bounded retry with fixed backoff for flaky filesystem operations.
//!
//! Deployment stores are frequently network-backed and exhibit transient
//! failures (file locks, momentary unavailability). Every filesystem
//! mutation in this crate runs through [`RetryPolicy::run`], which retries
//! a fixed number of times with a constant delay. Wrapped operations must
//! be idempotent (create-if-missing, delete-if-present) so that a retry
//! after a partially applied attempt is safe.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Default number of additional attempts after the first failure.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Fixed-delay retry policy.
///
/// No exponential backoff, no jitter: the delay between attempts is
/// constant. Concurrent retrying operations are independent of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of retries after the initial attempt.
    pub retries: u32,
    /// Delay before each retry.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with an explicit retry count and delay.
    #[must_use]
    pub const fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Run `operation`, retrying on failure.
    ///
    /// The operation is invoked up to `retries + 1` times. Only the final
    /// error is surfaced; intermediate failures are absorbed after the
    /// configured delay.
    ///
    /// # Errors
    ///
    /// Returns the last error produced by `operation` once the retry
    /// budget is exhausted.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut current_try = 1u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(_) if current_try <= self.retries => {
                    tokio::time::sleep(self.delay).await;
                    current_try += 1;
                }
                Err(err) => {
                    if self.retries > 0 {
                        warn!(retries = self.retries, error = %err, "operation failed after retries");
                    }
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test]
    async fn succeeds_first_try() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<u32, std::io::Error> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(42) }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<&str, std::io::Error> = policy
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(std::io::Error::other("transient"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_budget_and_surfaces_final_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(250));

        let result: Result<(), std::io::Error> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(std::io::Error::other("still locked")) }
            })
            .await;

        assert_eq!(result.unwrap_err().to_string(), "still locked");
        // Initial attempt plus three retries.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_constant_between_attempts() {
        let policy = RetryPolicy::new(2, Duration::from_millis(250));
        let start = Instant::now();

        let _: Result<(), std::io::Error> = policy
            .run(|| async { Err(std::io::Error::other("nope")) })
            .await;

        // Two retries, 250 ms before each.
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn zero_retries_fails_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(0, Duration::from_millis(250));

        let result: Result<(), std::io::Error> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(std::io::Error::other("fatal")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
