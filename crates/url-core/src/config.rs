use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Configuration for a watcher instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// HTTP request timeout for content fetches (default: 10s).
    pub fetch_timeout: Duration,
    /// Backoff schedule applied within a single check.
    pub retry_initial_delay: Duration,
    /// Retries after the initial attempt (default: 3, delays 5s/10s/20s).
    pub retry_max_retries: u32,
    /// Cadence of the due-URL scan; far finer than any per-URL interval.
    pub tick_interval: Duration,
    /// Maximum number of simultaneously in-flight checks.
    pub max_concurrent_checks: usize,
    /// Fraction of each interval randomized away (0.2 = ±20%); 0.0 disables.
    pub interval_jitter: f64,
    /// Maximum number of events retained (ring buffer capacity).
    pub event_limit: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            retry_initial_delay: Duration::from_secs(5),
            retry_max_retries: 3,
            tick_interval: Duration::from_secs(1),
            max_concurrent_checks: 5,
            interval_jitter: 0.2,
            event_limit: 200,
        }
    }
}

impl WatcherConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_initial_delay, self.retry_max_retries)
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, initial_delay: Duration, max_retries: u32) -> Self {
        self.retry_initial_delay = initial_delay;
        self.retry_max_retries = max_retries;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_max_concurrent_checks(mut self, max: usize) -> Self {
        self.max_concurrent_checks = max.max(1);
        self
    }

    pub fn with_interval_jitter(mut self, jitter: f64) -> Self {
        self.interval_jitter = jitter.clamp(0.0, 0.5);
        self
    }

    pub fn with_event_limit(mut self, limit: usize) -> Self {
        self.event_limit = limit;
        self
    }
}
