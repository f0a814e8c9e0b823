//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use std::path::PathBuf;

use thiserror::Error;

// == Fetch Error ==
/// Failure reported by a [`Fetcher`](crate::source::Fetcher).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The transport could not reach the source
    #[error("transport error: {0}")]
    Transport(String),

    /// The source answered with a non-success status
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    /// The source is known but currently unavailable
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

// == Decode Error ==
/// The bytes handed to a [`Codec`](crate::source::Codec) are not a valid encoded object.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid encoded object: {0}")]
pub struct DecodeError(pub String);

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Remote fetch failed
    #[error("fetch failed for {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    /// Fetched or stored bytes could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Disk read or write failed
    #[error("disk I/O failed at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The serialized disk writer is no longer running
    #[error("disk writer stopped")]
    WriterClosed,

    /// The task resolving a key went away before completing
    #[error("resolution of {0} was abandoned")]
    Abandoned(String),

    /// No tokio runtime was available to drive background work
    #[error("no async runtime available: {0}")]
    Runtime(String),
}

impl CacheError {
    /// Wraps an I/O error with the path it happened at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let err = CacheError::Fetch {
            url: "http://x/a.bin".to_string(),
            source: FetchError::Status {
                url: "http://x/a.bin".to_string(),
                status: 404,
            },
        };
        let message = err.to_string();
        assert!(message.contains("http://x/a.bin"));
        assert!(message.contains("404"));
    }

    #[test]
    fn test_decode_error_converts() {
        let err: CacheError = DecodeError("truncated".to_string()).into();
        assert!(matches!(err, CacheError::Decode(_)));
        assert_eq!(err.to_string(), "invalid encoded object: truncated");
    }
}
