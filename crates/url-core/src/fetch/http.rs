use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::warn;

use super::{ContentFetcher, FetchError};

/// HTTP-based content fetcher with connection pooling.
///
/// Performs exactly one GET per call; a non-2xx status is an error. Retries
/// are the caller's concern.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Self::build_client(timeout),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &crate::config::WatcherConfig) -> Self {
        Self::new(config.fetch_timeout)
    }

    pub fn build_client(timeout: Duration) -> Client {
        Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(20)
            .gzip(true)
            .build()
            .expect("Failed to build HTTP client")
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        match self.client.get(url).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    response.text().await.map_err(|e| FetchError::Network {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })
                } else {
                    let status = response.status().as_u16();
                    let message = response
                        .status()
                        .canonical_reason()
                        .unwrap_or("Unknown")
                        .to_string();
                    warn!(url, status, "Fetch returned error status");
                    Err(FetchError::Status {
                        url: url.to_string(),
                        status,
                        message,
                    })
                }
            }
            Err(e) => {
                if e.is_timeout() {
                    warn!(url, "Fetch timed out");
                    Err(FetchError::Timeout {
                        url: url.to_string(),
                    })
                } else {
                    warn!(url, error = %e, "Fetch network error");
                    Err(FetchError::Network {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        }
    }
}
