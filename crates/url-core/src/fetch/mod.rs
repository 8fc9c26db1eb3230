mod http;

pub use http::HttpFetcher;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("HTTP error {status} fetching {url}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },
    #[error("Network error fetching {url}: {reason}")]
    Network { url: String, reason: String },
    #[error("Timeout fetching {url}")]
    Timeout { url: String },
}

impl FetchError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Trait for fetching raw text content from a URL.
///
/// Implementations perform a single bounded-timeout request and classify the
/// outcome; retry scheduling lives in [`crate::retry`]. The trait is
/// object-safe and Send + Sync for use across async tasks.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}
