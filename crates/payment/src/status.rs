//! Payment status as reported by the backend

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifecycle of a pending payment. Every state except `Awaiting` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[serde(alias = "PENDING")]
    Awaiting,
    Paid,
    #[serde(alias = "CANCELLED")]
    Failed,
    Expired,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Awaiting)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentStatus::Awaiting => "AWAITING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Expired => "EXPIRED",
        }
    }

    /// Error-shaped view of a settled status for callers that prefer `?`.
    /// `Awaiting` maps to `PaymentTimeout`: the caller stopped waiting first.
    pub fn into_result(self, order_code: &str) -> Result<()> {
        match self {
            PaymentStatus::Paid => Ok(()),
            PaymentStatus::Failed => Err(Error::PaymentFailed(order_code.to_string())),
            PaymentStatus::Expired | PaymentStatus::Awaiting => {
                Err(Error::PaymentTimeout(order_code.to_string()))
            }
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
