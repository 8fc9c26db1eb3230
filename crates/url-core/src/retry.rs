//! Retry scheduling for transient fetch failures.
//!
//! The backoff schedule is a pure function of the attempt index so it can be
//! asserted without waiting; the sleeps themselves go through `tokio::time`
//! and tests run under a paused clock.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::fetch::{ContentFetcher, FetchError};

/// Terminal outcome of an exhausted retry schedule.
#[derive(Debug, Error)]
#[error("{url} unreachable after {attempts} attempts: {last_error}")]
pub struct Unreachable {
    pub url: String,
    pub attempts: u32,
    pub last_error: FetchError,
}

/// Fixed exponential backoff: `initial_delay * 2^attempt` between attempts,
/// `max_retries` retries after the initial attempt.
///
/// The defaults (5s initial, 3 retries) bound total wait to 5+10+20 = 35s
/// before a URL is declared unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    pub fn new(initial_delay: Duration, max_retries: u32) -> Self {
        Self {
            initial_delay,
            max_retries,
        }
    }

    /// Delay to sleep after failed attempt `attempt` (0-based), or `None`
    /// when the schedule is exhausted.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt < self.max_retries {
            Some(self.initial_delay * 2u32.saturating_pow(attempt))
        } else {
            None
        }
    }

    /// Total attempts made before giving up (initial + retries).
    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Fetch with retries per `policy`. A success at any attempt short-circuits;
/// exhausting the schedule yields [`Unreachable`] carrying the last error.
pub async fn fetch_with_retry(
    fetcher: &dyn ContentFetcher,
    url: &str,
    policy: RetryPolicy,
) -> Result<String, Unreachable> {
    let mut attempt = 0;
    loop {
        match fetcher.fetch(url).await {
            Ok(content) => return Ok(content),
            Err(e) => match policy.delay_for_attempt(attempt) {
                Some(delay) => {
                    warn!(
                        url,
                        attempt = attempt + 1,
                        total = policy.total_attempts(),
                        error = %e,
                        "Fetch attempt failed"
                    );
                    debug!(url, delay_secs = delay.as_secs(), "Backing off before retry");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    return Err(Unreachable {
                        url: url.to_string(),
                        attempts: policy.total_attempts(),
                        last_error: e,
                    });
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FailNTimes {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ContentFetcher for FailNTimes {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(FetchError::Network {
                    url: url.to_string(),
                    reason: "connection refused".into(),
                })
            } else {
                Ok("content".to_string())
            }
        }
    }

    #[test]
    fn default_schedule_is_5_10_20() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_secs(5)));
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_secs(10)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_secs(20)));
        assert_eq!(policy.delay_for_attempt(3), None);
        assert_eq!(policy.total_attempts(), 4);
    }

    #[test]
    fn zero_retries_never_sleeps() {
        let policy = RetryPolicy::new(Duration::from_secs(5), 0);
        assert_eq!(policy.delay_for_attempt(0), None);
        assert_eq!(policy.total_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_first_attempt_short_circuits() {
        let fetcher = FailNTimes {
            failures: 0,
            calls: AtomicU32::new(0),
        };
        let start = tokio::time::Instant::now();
        let result = fetch_with_retry(&fetcher, "http://a", RetryPolicy::default()).await;
        assert_eq!(result.unwrap(), "content");
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let fetcher = FailNTimes {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let start = tokio::time::Instant::now();
        let result = fetch_with_retry(&fetcher, "http://a", RetryPolicy::default()).await;
        assert!(result.is_ok());
        // Slept 5s then 10s before the third attempt succeeded.
        assert_eq!(start.elapsed(), Duration::from_secs(15));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_takes_full_schedule() {
        let fetcher = FailNTimes {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        };
        let start = tokio::time::Instant::now();
        let err = fetch_with_retry(&fetcher, "http://a", RetryPolicy::default())
            .await
            .unwrap_err();
        assert_eq!(start.elapsed(), Duration::from_secs(35));
        assert_eq!(err.attempts, 4);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 4);
        assert!(matches!(err.last_error, FetchError::Network { .. }));
    }
}
