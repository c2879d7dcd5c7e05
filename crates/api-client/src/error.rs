//! Errors surfaced by the authenticated request pipeline
//!
//! Authorization failures never appear here: the pipeline absorbs every 401
//! and turns it into either a transparent replay or `SessionExpired`.

use transport::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No response from the backend (transport failure or timeout).
    #[error("network error: {0}")]
    Network(String),

    /// Refresh failed or the single retry was also rejected. Terminal: the
    /// credential store has been cleared and the login surface signalled.
    #[error("session expired")]
    SessionExpired,

    /// Non-success status, produced only by the JSON helpers.
    #[error("backend returned {status}: {body}")]
    Http { status: StatusCode, body: String },

    /// Response or request body had an unexpected shape.
    #[error("invalid body: {0}")]
    Decode(String),
}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        match e {
            transport::Error::Network(msg) => Error::Network(msg),
            transport::Error::Timeout(msg) => Error::Network(format!("timed out: {msg}")),
            transport::Error::Status { status, body } => Error::Http { status, body },
            transport::Error::Decode(msg) => Error::Decode(msg),
        }
    }
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
