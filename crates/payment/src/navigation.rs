//! Navigation collaborator for settled payments

use parking_lot::Mutex;
use tracing::info;

use crate::status::PaymentStatus;

/// Routes the user to the result page once a payment settles. Called once
/// per session, by whichever source performed the terminal transition.
pub trait PaymentNavigator: Send + Sync {
    fn to_result(&self, order_code: &str, status: PaymentStatus);
}

/// Logs the redirect and does nothing else.
#[derive(Debug, Default)]
pub struct LogPaymentNavigator;

impl PaymentNavigator for LogPaymentNavigator {
    fn to_result(&self, order_code: &str, status: PaymentStatus) {
        info!(order_code, %status, "navigating to payment result");
    }
}

/// Records every redirect in order.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visits: Mutex<Vec<(String, PaymentStatus)>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visits(&self) -> Vec<(String, PaymentStatus)> {
        self.visits.lock().clone()
    }
}

impl PaymentNavigator for RecordingNavigator {
    fn to_result(&self, order_code: &str, status: PaymentStatus) {
        self.visits.lock().push((order_code.to_string(), status));
    }
}
