//! Terminal stand-ins for the login and payment result screens

use api_client::Navigator;
use payment::{PaymentNavigator, PaymentStatus};
use tracing::{info, warn};

/// Tells the operator to sign in again.
pub struct ConsoleLoginNavigator;

impl Navigator for ConsoleLoginNavigator {
    fn to_login(&self) {
        warn!("session expired, credentials cleared");
        eprintln!("Session expired. Sign in again with `learnhub login --token <TOKEN>`.");
    }
}

/// Prints the settled payment outcome.
pub struct ConsoleResultNavigator;

impl PaymentNavigator for ConsoleResultNavigator {
    fn to_result(&self, order_code: &str, status: PaymentStatus) {
        info!(order_code, %status, "payment result");
        println!("order {order_code}: {}", result_message(status));
    }
}

fn result_message(status: PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Paid => "payment confirmed",
        PaymentStatus::Failed => "payment failed",
        PaymentStatus::Expired => "payment window expired",
        PaymentStatus::Awaiting => "still awaiting payment",
    }
}
