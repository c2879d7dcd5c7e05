//! Request descriptors and the outbound request handed to a transport

use common::Secret;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use tracing::warn;

use crate::error::{Error, Result};

/// What a call site wants sent: method, path, headers and an optional JSON
/// body. Never carries credentials; the request pipeline attaches those.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path relative to the transport's base URL, query string included.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| Error::Decode(format!("serializing request body: {e}")))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Add a header. `Authorization` is refused: credentials belong to the
    /// pipeline, not the call site.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        if name == AUTHORIZATION {
            warn!(path = %self.path, "refusing caller-supplied authorization header");
            return self;
        }
        self.headers.insert(name, value);
        self
    }
}

/// A descriptor plus the bearer token it should be sent with.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub descriptor: RequestDescriptor,
    pub bearer: Option<Secret<String>>,
}

impl OutboundRequest {
    /// Build the outbound request, dropping any authorization header that
    /// slipped into the descriptor's header map directly.
    pub fn new(mut descriptor: RequestDescriptor, bearer: Option<Secret<String>>) -> Self {
        if descriptor.headers.remove(AUTHORIZATION).is_some() {
            warn!(path = %descriptor.path, "stripped authorization header from descriptor");
        }
        Self { descriptor, bearer }
    }

    /// Token this request carries, for logging-free comparisons.
    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer.as_ref().map(|s| s.expose().as_str())
    }
}
