//! Where payment status comes from

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;

use api_client::ApiClient;

use crate::error::Result;
use crate::status::PaymentStatus;

/// Default status endpoint; `{order_code}` is substituted per session.
pub const DEFAULT_STATUS_PATH: &str = "/payments/{order_code}/status";

/// Looks up the current status of one order.
pub trait StatusSource: Send + Sync {
    fn fetch_status<'a>(
        &'a self,
        order_code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<PaymentStatus>> + Send + 'a>>;
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: PaymentStatus,
}

/// Status lookups through the authenticated request pipeline.
#[derive(Clone)]
pub struct ApiStatusSource {
    client: ApiClient,
    path_template: String,
}

impl ApiStatusSource {
    pub fn new(client: ApiClient, path_template: impl Into<String>) -> Self {
        Self {
            client,
            path_template: path_template.into(),
        }
    }

    /// The order code is percent-encoded as a single path segment.
    pub fn path_for(&self, order_code: &str) -> String {
        self.path_template.replace("{order_code}", &urlencoding::encode(order_code))
    }
}

impl StatusSource for ApiStatusSource {
    fn fetch_status<'a>(
        &'a self,
        order_code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<PaymentStatus>> + Send + 'a>> {
        Box::pin(async move {
            let body: StatusBody = self.client.get_json(&self.path_for(order_code)).await?;
            Ok(body.status)
        })
    }
}
