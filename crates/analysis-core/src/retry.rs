use std::future::Future;
use std::time::Duration;

use crate::AnalysisError;

/// Bounded retry with exponential backoff, wrapped around external calls.
///
/// Only errors `AnalysisError::is_retryable` approves are retried; a
/// `NotFound` or malformed document comes straight back on the first attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts, base_delay }
    }

    /// Run `op` until it succeeds, fails non-retryably, or attempts run out.
    /// The delay doubles after every failed attempt.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, AnalysisError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AnalysisError>>,
    {
        let mut delay = self.base_delay;
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    tracing::warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        what,
                        attempt,
                        self.max_attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_unavailable_until_attempts_exhausted() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("test op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AnalysisError::Unavailable("down".into())) }
            })
            .await;

        assert!(matches!(result, Err(AnalysisError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_is_never_retried() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("lookup", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AnalysisError::NotFound("ZZZZ1".into())) }
            })
            .await;

        assert!(matches!(result, Err(AnalysisError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(3, Duration::from_millis(50));
        let calls = AtomicU32::new(0);

        let result = policy
            .run("flaky", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AnalysisError::Unavailable("transient".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
