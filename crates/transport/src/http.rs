//! reqwest-backed transport

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::request::OutboundRequest;
use crate::response::ApiResponse;
use crate::Transport;

/// Sends requests to `base_url` with a per-request timeout.
///
/// Every failure to obtain a response (connect error, timeout, body read
/// error) is reported as a network-level error; HTTP statuses, 401 included,
/// always come back as an `ApiResponse`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self {
            client,
            base_url,
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join the base URL and a request path.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

impl Transport for HttpTransport {
    fn execute<'a>(
        &'a self,
        request: &'a OutboundRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>> {
        Box::pin(async move {
            let descriptor = &request.descriptor;
            let url = self.url_for(&descriptor.path);
            trace!(method = %descriptor.method, url = %url, "sending request");

            let mut builder = self
                .client
                .request(descriptor.method.clone(), &url)
                .timeout(self.timeout)
                .headers(descriptor.headers.clone());
            if let Some(token) = request.bearer_token() {
                builder = builder.bearer_auth(token);
            }
            if let Some(body) = &descriptor.body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(Error::from_reqwest)?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(Error::from_reqwest)?;

            debug!(method = %descriptor.method, path = %descriptor.path, %status, "response received");
            Ok(ApiResponse {
                status,
                headers,
                body,
            })
        })
    }
}
