//! Authenticated request pipeline for the LearnHub backend
//!
//! Wraps every outbound call, attaches the current credential and, when the
//! backend answers 401, performs one shared credential refresh for all
//! requests that failed around the same moment before replaying each of them
//! exactly once.
//!
//! Request flow:
//! 1. Call site builds a `RequestDescriptor` (no auth header)
//! 2. `ApiClient::send()` reads the `CredentialStore` and dispatches
//! 3. 401 on a first attempt → join or start the single-flight refresh
//! 4. Refresh success → replay once; failure → store cleared, `Navigator::to_login()`
//! 5. Caller sees the backend response, `Network` or `SessionExpired`

pub mod envelope;
pub mod error;
pub mod metrics;
pub mod navigation;
pub mod pipeline;
pub mod refresh;

pub use envelope::RequestEnvelope;
pub use error::{Error, Result};
pub use navigation::{CountingNavigator, LogNavigator, Navigator};
pub use pipeline::{ApiClient, ApiClientConfig, DEFAULT_REFRESH_PATH};
pub use refresh::RefreshOutcome;
