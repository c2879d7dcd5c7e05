//! Error types for the HTTP boundary

use reqwest::StatusCode;

/// Errors produced by a transport or while interpreting a response.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No response: connect failure, reset, unreadable body.
    #[error("network error: {0}")]
    Network(String),

    /// The transport's own deadline elapsed before a response arrived.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// A response arrived with a non-success status.
    #[error("backend returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The response body did not match the expected shape.
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl Error {
    /// Whether the request never produced a response.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout(_))
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::Network(e.to_string())
        }
    }
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;
