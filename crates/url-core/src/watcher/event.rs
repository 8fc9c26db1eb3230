use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Changed,
    Unreachable,
    Recovered,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Changed => write!(f, "CHANGED"),
            Self::Unreachable => write!(f, "UNREACHABLE"),
            Self::Recovered => write!(f, "RECOVERED"),
        }
    }
}

/// A reachability or content transition for a single URL.
///
/// Emitted at most once per transition: the engine debounces repeated
/// failures and unchanged re-fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub url: String,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downtime_secs: Option<u64>,
}

impl WatchEvent {
    pub fn changed(url: impl Into<String>, diff: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind: EventKind::Changed,
            url: url.into(),
            details: "Content changed".to_string(),
            diff: Some(diff.into()),
            downtime_secs: None,
        }
    }

    pub fn unreachable(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind: EventKind::Unreachable,
            url: url.into(),
            details: reason.into(),
            diff: None,
            downtime_secs: None,
        }
    }

    pub fn recovered(url: impl Into<String>, downtime_secs: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind: EventKind::Recovered,
            url: url.into(),
            details: format!("Back online after {}s of downtime", downtime_secs),
            diff: None,
            downtime_secs: Some(downtime_secs),
        }
    }
}

/// Fixed-capacity circular buffer for recent events. O(1) insert, evicts
/// oldest when full.
#[derive(Debug, Clone)]
pub struct EventRing {
    buffer: VecDeque<WatchEvent>,
    capacity: usize,
}

impl EventRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, event: WatchEvent) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(event);
    }

    /// Newest first.
    pub fn list(&self) -> Vec<WatchEvent> {
        self.buffer.iter().rev().cloned().collect()
    }

    pub fn list_chronological(&self) -> Vec<WatchEvent> {
        self.buffer.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_push_and_list() {
        let mut ring = EventRing::new(5);
        ring.push(WatchEvent::changed("http://a", "-v1\n+v2"));
        ring.push(WatchEvent::unreachable("http://a", "timeout"));
        assert_eq!(ring.len(), 2);

        let events = ring.list();
        assert_eq!(events[0].kind, EventKind::Unreachable);
        assert_eq!(events[1].kind, EventKind::Changed);
    }

    #[test]
    fn ring_evicts_oldest() {
        let mut ring = EventRing::new(2);
        ring.push(WatchEvent::changed("http://a", "d1"));
        ring.push(WatchEvent::unreachable("http://a", "e"));
        ring.push(WatchEvent::recovered("http://a", 60));
        assert_eq!(ring.len(), 2);
        let events = ring.list_chronological();
        assert_eq!(events[0].kind, EventKind::Unreachable);
        assert_eq!(events[1].kind, EventKind::Recovered);
    }

    #[test]
    fn recovered_carries_downtime() {
        let ev = WatchEvent::recovered("http://a", 90);
        assert_eq!(ev.downtime_secs, Some(90));
        assert!(ev.details.contains("90s"));
    }

    #[test]
    fn kind_display() {
        assert_eq!(format!("{}", EventKind::Changed), "CHANGED");
        assert_eq!(format!("{}", EventKind::Unreachable), "UNREACHABLE");
        assert_eq!(format!("{}", EventKind::Recovered), "RECOVERED");
    }
}
