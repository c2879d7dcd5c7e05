//! HTTP boundary between the session layer and the LearnHub backend
//!
//! Defines the `Transport` trait that decouples the request pipeline from the
//! HTTP client. `HttpTransport` is the reqwest implementation; tests plug in
//! scripted transports to drive the pipeline deterministically.

pub mod error;
pub mod http;
pub mod request;
pub mod response;

pub use error::{Error, Result};
pub use http::HttpTransport;
pub use request::{OutboundRequest, RequestDescriptor};
pub use response::ApiResponse;

pub use reqwest::header;
pub use reqwest::{Method, StatusCode};

use std::future::Future;
use std::pin::Pin;

/// Coarse classification of a backend response.
///
/// Only `Unauthorized` gets special treatment from the request pipeline; all
/// other classes are handed back to the caller untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx/3xx
    Success,
    /// 401: the credential is missing, expired or revoked
    Unauthorized,
    /// Any other 4xx, 403 included (valid credential, insufficient rights)
    ClientError,
    /// 5xx
    ServerError,
}

/// Classify a response status.
pub fn classify_status(status: StatusCode) -> ResponseClass {
    match status.as_u16() {
        401 => ResponseClass::Unauthorized,
        400..=499 => ResponseClass::ClientError,
        500..=599 => ResponseClass::ServerError,
        _ => ResponseClass::Success,
    }
}

/// Sends one outbound request and buffers the response.
///
/// Implementations must return `Ok` for every HTTP response regardless of
/// status, and `Err` only when no response was obtained. Uses
/// `Pin<Box<dyn Future>>` so the pipeline can hold an `Arc<dyn Transport>`.
pub trait Transport: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: &'a OutboundRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>>;
}
