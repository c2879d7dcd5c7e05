//! Error types for payment status lookups and outcomes

/// Errors from the payment pipeline.
///
/// `Network`, `SessionExpired` and `Backend` come from individual status
/// polls and are absorbed by the session driver. `PaymentFailed` and
/// `PaymentTimeout` only appear when a caller converts a terminal status
/// into a `Result`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(String),

    #[error("session expired")]
    SessionExpired,

    #[error("status lookup failed: {0}")]
    Backend(String),

    #[error("payment failed for order {0}")]
    PaymentFailed(String),

    #[error("payment for order {0} not confirmed before the deadline")]
    PaymentTimeout(String),
}

impl From<api_client::Error> for Error {
    fn from(e: api_client::Error) -> Self {
        match e {
            api_client::Error::Network(msg) => Error::Network(msg),
            api_client::Error::SessionExpired => Error::SessionExpired,
            other => Error::Backend(other.to_string()),
        }
    }
}

/// Result alias for payment operations.
pub type Result<T> = std::result::Result<T, Error>;
