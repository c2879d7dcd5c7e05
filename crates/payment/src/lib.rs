//! Payment confirmation sessions
//!
//! A session watches one order until the backend reports it settled or a
//! local countdown runs out, whichever comes first. Two independent timers
//! drive it and both are cancelled as soon as the outcome is known or the
//! consumer closes the session.

pub mod error;
pub mod machine;
pub mod metrics;
pub mod navigation;
pub mod session;
pub mod source;
pub mod status;
pub mod timer;

pub use error::{Error, Result};
pub use navigation::{LogPaymentNavigator, PaymentNavigator, RecordingNavigator};
pub use session::{
    DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT, PaymentConfig, PaymentPipeline, PaymentSessionHandle,
    PaymentSnapshot,
};
pub use source::{ApiStatusSource, DEFAULT_STATUS_PATH, StatusSource};
pub use status::PaymentStatus;
