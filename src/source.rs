//! Source Collaborators
//!
//! The cache never talks to the network or interprets bytes itself. A
//! [`Fetcher`] retrieves raw bytes for a source identifier and a [`Codec`]
//! turns those bytes into the object kept in memory.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{DecodeError, FetchError};

// == Fetcher ==
/// Retrieves the raw bytes behind a source identifier (usually a URL).
///
/// Called at most once per outstanding fetch for a key; the cache adds no
/// timeout of its own, so implementations should bound their own requests.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

// == Codec ==
/// Converts between encoded bytes and decoded objects. Pure, no I/O.
pub trait Codec: Send + Sync + 'static {
    /// The decoded in-memory form.
    type Object: Send + Sync + 'static;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Object, DecodeError>;

    fn encode(&self, object: &Self::Object) -> Vec<u8>;
}

// == Raw Codec ==
/// Identity codec: the object is the byte buffer itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Codec for RawCodec {
    type Object = Vec<u8>;

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
        Ok(bytes.to_vec())
    }

    fn encode(&self, object: &Vec<u8>) -> Vec<u8> {
        object.clone()
    }
}

/// Upper bound on one HTTP request, connect to last body byte.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

// == HTTP Fetcher ==
/// [`Fetcher`] backed by a shared `reqwest` client. Every request is bounded
/// by a timeout, [`DEFAULT_FETCH_TIMEOUT`] unless set otherwise.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::with_client(reqwest::Client::new())
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a preconfigured client (proxies, headers). The per-request
    /// timeout still applies.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        debug!(url = %url, bytes = body.len(), "Fetched source");
        Ok(body.to_vec())
    }
}
