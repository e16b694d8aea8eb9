//! Fetching remote image bytes.
//!
//! The [`Fetcher`] trait is the seam between the exporters and the network:
//! production code uses [`HttpFetcher`], tests substitute a recording mock.
//! Fetchers are shared across tasks, hence `Send + Sync` and a `Send` future.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("{url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },
}

impl TransportError {
    pub fn url(&self) -> &str {
        match self {
            TransportError::Request { url, .. }
            | TransportError::Status { url, .. }
            | TransportError::Timeout { url, .. } => url,
        }
    }
}

/// Retrieves the bytes behind a URL.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;
}

/// [`Fetcher`] over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        trace!(url, "GET");
        let request_error = |source| TransportError::Request {
            url: url.to_string(),
            source,
        };
        let response = self.client.get(url).send().await.map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await.map_err(request_error)?;
        Ok(body.to_vec())
    }
}
