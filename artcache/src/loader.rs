//! HTTP transport for image bytes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::error::FetchError;

/// Transport capability: fetch raw image bytes for a URL.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// `reqwest`-backed loader with connection pooling and a request timeout.
#[derive(Debug, Clone)]
pub struct HttpImageLoader {
    client: Client,
}

impl HttpImageLoader {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }
}

impl Default for HttpImageLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = Url::parse(url).map_err(|err| FetchError::MalformedUrl {
            url: url.to_string(),
            reason: err.to_string(),
        })?;

        debug!("fetching image from {parsed}");

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|err| FetchError::Transport {
                url: url.to_string(),
                source: Box::new(err),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| FetchError::Transport {
                url: url.to_string(),
                source: Box::new(err),
            })?;

        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn malformed_url_is_rejected_before_any_io() {
        let loader = HttpImageLoader::new();
        let err = loader.load("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::MalformedUrl { .. }));
    }
}
