//! Error types for the ingest pipeline.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while ingesting archive data.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level HTTP failure (connect, timeout, body read).
    #[error("archive request to {url} failed: {source}")]
    Http {
        /// Endpoint the request was sent to.
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The archive answered with a non-success HTTP status.
    #[error("archive responded with HTTP {status} at {url}")]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
        /// Endpoint the request was sent to.
        url: String,
    },

    /// The archive returned a response body that is not valid JSON, or not
    /// the shape we asked for.
    #[error("malformed archive response: {0}")]
    Json(#[from] serde_json::Error),

    /// The archive reported an error in its response envelope.
    #[error("archive error: {message}")]
    Archive {
        /// First message of the response's `errors` array.
        message: String,
    },

    /// The archive reported a height below one it reported earlier.
    #[error("archive height went backwards: had {observed}, response reports {received}")]
    HeightRegression { observed: i64, received: i64 },

    /// A block could not be decoded into typed entities.
    #[error("failed to decode block {block_height} ({block_hash}): {reason}")]
    Decode {
        block_height: i64,
        block_hash: String,
        reason: String,
    },

    /// Invalid processor configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The checkpoint database failed.
    #[error("database error: {0:#}")]
    Database(anyhow::Error),

    /// The user handler (or the transaction wrapping it) failed.
    #[error("handler error: {0:#}")]
    Handler(anyhow::Error),
}

impl Error {
    /// Whether a fresh attempt may succeed: HTTP 429/502/503 and
    /// connect/timeout classes of transport errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::HttpStatus { status, .. } => matches!(status, 429 | 502 | 503),
            Error::Http { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        for status in [429u16, 502, 503] {
            let err = Error::HttpStatus {
                status,
                url: "http://archive".into(),
            };
            assert!(err.is_retryable(), "{status} must be retryable");
        }
        for status in [400u16, 404, 500] {
            let err = Error::HttpStatus {
                status,
                url: "http://archive".into(),
            };
            assert!(!err.is_retryable(), "{status} must be fatal");
        }
    }

    #[test]
    fn test_protocol_and_decode_errors_are_fatal() {
        assert!(!Error::Archive {
            message: "bad query".into()
        }
        .is_retryable());
        assert!(!Error::Decode {
            block_height: 7,
            block_hash: "0xabc".into(),
            reason: "missing field".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_decode_error_carries_block_context() {
        let err = Error::Decode {
            block_height: 123,
            block_hash: "0xdeadbeef".into(),
            reason: "bad quantity".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("123"));
        assert!(msg.contains("0xdeadbeef"));
        assert!(msg.contains("bad quantity"));
    }
}
