//! Credential storage for the LearnHub session layer
//!
//! Holds the current access token in exactly one of two persistence scopes:
//! durable (survives restarts, backed by a JSON file) or ephemeral (lives
//! only as long as the process). Writing to one scope clears the other.
//!
//! Credential lifecycle:
//! 1. Login flow calls `CredentialStore::write()` with the scope the user chose
//! 2. Request pipeline calls `CredentialStore::read()` before every dispatch
//! 3. A successful refresh writes the new token back into the same scope
//! 4. Logout, failed refresh or session expiry call `CredentialStore::clear()`

pub mod backend;
pub mod credentials;
pub mod error;

pub use backend::{FileBackend, MemoryBackend, ScopeBackend};
pub use credentials::{Credential, CredentialStore, Scope};
pub use error::{Error, Result};
