//! Notification dispatch.
//!
//! The engine pushes [`Notification`]s through an mpsc channel; the
//! [`Dispatcher`] reads from that channel, formats a transport-safe message,
//! and fans it out to all configured sinks. Delivery failures are logged and
//! never affect scheduling or state transitions.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::watcher::event::{EventKind, WatchEvent};

/// Diff payloads are truncated to fit in an SMS.
pub const MAX_DIFF_LEN: usize = 500;

const TEXTBELT_API_URL: &str = "https://textbelt.com/text";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error {status} from notification API: {message}")]
    Http { status: u16, message: String },
    #[error("Network error sending notification: {0}")]
    Network(String),
    #[error("Notification API rejected the message: {0}")]
    Api(String),
}

/// A transition event queued for delivery.
#[derive(Debug, Clone)]
pub struct Notification {
    pub watcher_id: String,
    pub event: WatchEvent,
}

pub fn notification_channel() -> (
    mpsc::UnboundedSender<Notification>,
    mpsc::UnboundedReceiver<Notification>,
) {
    mpsc::unbounded_channel()
}

/// A delivery transport for transition events.
///
/// Implementations are selected by configuration; the engine only ever sees
/// this trait.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;
    async fn send(&self, message: &str) -> Result<(), NotifyError>;
}

/// Render an event as an SMS-sized message body.
pub fn format_message(event: &WatchEvent) -> String {
    let timestamp = event.timestamp.format("%Y-%m-%d %H:%M:%S");
    match event.kind {
        EventKind::Changed => {
            let mut msg = format!(
                "WEBSITE CHANGE DETECTED\nTime: {}\nURL: {}\n\n",
                timestamp, event.url
            );
            match event.diff.as_deref().filter(|d| !d.trim().is_empty()) {
                Some(diff) if diff.len() > MAX_DIFF_LEN => {
                    let mut end = MAX_DIFF_LEN;
                    while !diff.is_char_boundary(end) {
                        end -= 1;
                    }
                    msg.push_str("Changes:\n");
                    msg.push_str(&diff[..end]);
                    msg.push_str("...\n[truncated]");
                }
                Some(diff) => {
                    msg.push_str("Changes:\n");
                    msg.push_str(diff);
                }
                None => msg.push_str("Content changes detected."),
            }
            msg
        }
        EventKind::Unreachable => format!(
            "SITE UNREACHABLE\n\nURL: {}\nError: {}\nTime: {}",
            event.url, event.details, timestamp
        ),
        EventKind::Recovered => format!(
            "SITE RECOVERED\n\nURL: {}\nDowntime: {}\nTime: {}",
            event.url,
            format_downtime(event.downtime_secs.unwrap_or(0)),
            timestamp
        ),
    }
}

fn format_downtime(secs: u64) -> String {
    let (hours, rem) = (secs / 3600, secs % 3600);
    format!("{}:{:02}:{:02}", hours, rem / 60, rem % 60)
}

#[derive(Debug, Deserialize)]
struct TextBeltResponse {
    success: bool,
    #[serde(rename = "textId")]
    text_id: Option<serde_json::Value>,
    error: Option<String>,
}

/// SMS delivery via the TextBelt HTTP API.
pub struct TextBeltSink {
    client: Client,
    api_url: String,
    phone: String,
    api_key: String,
}

impl TextBeltSink {
    pub fn new(phone: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            api_url: TEXTBELT_API_URL.to_string(),
            phone: phone.into(),
            api_key: api_key.into(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Build from `SMS_PHONE_NUMBER` and `TEXTBELT_API_KEY`; `None` when
    /// either is unset.
    pub fn from_env() -> Option<Self> {
        let phone = std::env::var("SMS_PHONE_NUMBER").ok()?;
        let api_key = std::env::var("TEXTBELT_API_KEY").ok()?;
        Some(Self::new(phone, api_key))
    }
}

#[async_trait]
impl NotificationSink for TextBeltSink {
    fn name(&self) -> &str {
        "textbelt"
    }

    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        let params = [
            ("phone", self.phone.as_str()),
            ("message", message),
            ("key", self.api_key.as_str()),
        ];

        let response = self
            .client
            .post(&self.api_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Http {
                status: response.status().as_u16(),
                message: response
                    .status()
                    .canonical_reason()
                    .unwrap_or("Unknown")
                    .to_string(),
            });
        }

        let body: TextBeltResponse = response
            .json()
            .await
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        if body.success {
            debug!(phone = %self.phone, text_id = ?body.text_id, "SMS sent");
            Ok(())
        } else {
            Err(NotifyError::Api(
                body.error.unwrap_or_else(|| "Unknown error".to_string()),
            ))
        }
    }
}

/// Asynchronous notification dispatcher.
///
/// Spawned as a background tokio task, it reads from the notification
/// channel and delivers to every configured sink. Returns when all senders
/// are dropped.
pub struct Dispatcher {
    rx: mpsc::UnboundedReceiver<Notification>,
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl Dispatcher {
    pub fn new(
        rx: mpsc::UnboundedReceiver<Notification>,
        sinks: Vec<Box<dyn NotificationSink>>,
    ) -> Self {
        Self { rx, sinks }
    }

    pub async fn run(mut self) {
        debug!(sink_count = self.sinks.len(), "Notification dispatcher started");

        while let Some(notification) = self.rx.recv().await {
            let message = format_message(&notification.event);

            for sink in &self.sinks {
                match sink.send(&message).await {
                    Ok(()) => debug!(
                        sink = sink.name(),
                        url = %notification.event.url,
                        kind = %notification.event.kind,
                        "Notification delivered"
                    ),
                    Err(e) => warn!(
                        sink = sink.name(),
                        url = %notification.event.url,
                        error = %e,
                        "Notification delivery failed"
                    ),
                }
            }
        }

        debug!("Notification dispatcher shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn changed_message_includes_diff() {
        let msg = format_message(&WatchEvent::changed("http://a", "-v1\n+v2"));
        assert!(msg.starts_with("WEBSITE CHANGE DETECTED"));
        assert!(msg.contains("URL: http://a"));
        assert!(msg.contains("-v1\n+v2"));
        assert!(!msg.contains("[truncated]"));
    }

    #[test]
    fn changed_message_truncates_long_diff() {
        let diff = "x".repeat(2000);
        let msg = format_message(&WatchEvent::changed("http://a", diff));
        assert!(msg.contains("[truncated]"));
        assert!(msg.len() < 700);
    }

    #[test]
    fn changed_message_without_diff_has_fallback() {
        let mut ev = WatchEvent::changed("http://a", "");
        ev.diff = None;
        let msg = format_message(&ev);
        assert!(msg.contains("Content changes detected."));
    }

    #[test]
    fn unreachable_message_carries_reason() {
        let msg = format_message(&WatchEvent::unreachable("http://a", "Timeout fetching http://a"));
        assert!(msg.starts_with("SITE UNREACHABLE"));
        assert!(msg.contains("Error: Timeout fetching http://a"));
    }

    #[test]
    fn recovered_message_formats_downtime() {
        let msg = format_message(&WatchEvent::recovered("http://a", 3725));
        assert!(msg.starts_with("SITE RECOVERED"));
        assert!(msg.contains("Downtime: 1:02:05"));
    }

    #[tokio::test]
    async fn textbelt_sink_sends_form_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/text"))
            .and(body_string_contains("phone=%2B1234567890"))
            .and(body_string_contains("key=secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"success": true, "textId": 42})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let sink = TextBeltSink::new("+1234567890", "secret")
            .with_api_url(format!("{}/text", server.uri()));
        sink.send("hello").await.unwrap();
    }

    #[tokio::test]
    async fn textbelt_sink_surfaces_api_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/text"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"success": false, "error": "Out of quota"}),
            ))
            .mount(&server)
            .await;

        let sink = TextBeltSink::new("+1", "k").with_api_url(format!("{}/text", server.uri()));
        let err = sink.send("hello").await.unwrap_err();
        assert!(matches!(err, NotifyError::Api(ref m) if m == "Out of quota"));
    }

    #[tokio::test]
    async fn textbelt_sink_surfaces_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/text"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let sink = TextBeltSink::new("+1", "k").with_api_url(format!("{}/text", server.uri()));
        let err = sink.send("hello").await.unwrap_err();
        assert!(matches!(err, NotifyError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn dispatcher_processes_and_shuts_down() {
        let (tx, rx) = notification_channel();
        let dispatcher = Dispatcher::new(rx, vec![]);

        tx.send(Notification {
            watcher_id: "w1".into(),
            event: WatchEvent::changed("http://a", "-v1\n+v2"),
        })
        .unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(2), dispatcher.run())
            .await
            .expect("Dispatcher should exit after sender is dropped");
    }
}
