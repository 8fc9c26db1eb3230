use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Lifecycle of the scheduling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatcherState {
    Idle,
    Active,
    Stopping,
    Stopped,
}

impl WatcherState {
    pub fn can_transition_to(self, target: WatcherState) -> bool {
        matches!(
            (self, target),
            (WatcherState::Idle, WatcherState::Active)
                | (WatcherState::Active, WatcherState::Stopping)
                | (WatcherState::Stopping, WatcherState::Stopped)
                | (WatcherState::Stopped, WatcherState::Active)
        )
    }
}

impl std::fmt::Display for WatcherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Per-URL check state machine.
///
/// `Pending` is pre-first-check; `Checking` guards against overlapping
/// dispatch while a check (including its retries) is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlState {
    Pending,
    Checking,
    Reachable,
    Unreachable,
}

impl std::fmt::Display for UrlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Checking => write!(f, "checking"),
            Self::Reachable => write!(f, "reachable"),
            Self::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// A URL to monitor with its check interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchItem {
    pub url: String,
    pub interval: Duration,
}

impl WatchItem {
    pub fn new(url: impl Into<String>, interval: Duration) -> Self {
        Self {
            url: url.into(),
            interval,
        }
    }
}

/// Live scheduling state for one monitored URL. Persisted content lives in
/// the snapshot records, keyed by the same url.
#[derive(Debug, Clone)]
pub struct UrlEntry {
    pub url: String,
    pub interval: Duration,
    pub next_due: Instant,
    pub state: UrlState,
    pub consecutive_failures: u32,
    pub unreachable_since: Option<Instant>,
    pub total_checks: u64,
    pub last_change_at: Option<DateTime<Utc>>,
}

impl UrlEntry {
    /// New entries are due immediately.
    pub fn new(item: &WatchItem) -> Self {
        Self {
            url: item.url.clone(),
            interval: item.interval,
            next_due: Instant::now(),
            state: UrlState::Pending,
            consecutive_failures: 0,
            unreachable_since: None,
            total_checks: 0,
            last_change_at: None,
        }
    }
}

/// Point-in-time status snapshot for one URL, for display and inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlStatus {
    pub url: String,
    pub state: UrlState,
    pub interval_secs: u64,
    pub total_checks: u64,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_change_at: Option<DateTime<Utc>>,
}
