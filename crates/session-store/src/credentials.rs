//! Two-scope credential store
//!
//! The store owns one durable and one ephemeral backend and enforces that at
//! most one of them holds a token. A single lock serializes every operation,
//! so a reader never observes the moment between "write the new scope" and
//! "clear the old scope".
//!
//! Persistence failures are logged and swallowed: the backends update their
//! in-memory view before touching disk, so the running process always sees
//! the last write even if the file could not be rewritten.

use std::fmt;
use std::path::PathBuf;

use common::Secret;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{FileBackend, MemoryBackend, ScopeBackend};

/// Persistence scope chosen at login time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Survives restarts ("remember me").
    Durable,
    /// Lives only as long as the current process.
    Ephemeral,
}

impl Scope {
    pub fn label(&self) -> &'static str {
        match self {
            Scope::Durable => "durable",
            Scope::Ephemeral => "ephemeral",
        }
    }

    fn other(self) -> Scope {
        match self {
            Scope::Durable => Scope::Ephemeral,
            Scope::Ephemeral => Scope::Durable,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The current access credential and the scope it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: Secret<String>,
    pub scope: Scope,
}

/// Credential store with durable/ephemeral mutual exclusion.
pub struct CredentialStore {
    durable: Box<dyn ScopeBackend>,
    ephemeral: Box<dyn ScopeBackend>,
    lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(durable: Box<dyn ScopeBackend>, ephemeral: Box<dyn ScopeBackend>) -> Self {
        Self {
            durable,
            ephemeral,
            lock: Mutex::new(()),
        }
    }

    /// Both scopes held in memory. Used by tests and by consumers that never
    /// persist a session.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackend::new()), Box::new(MemoryBackend::new()))
    }

    /// Durable scope backed by the JSON file at `path`, ephemeral scope in memory.
    pub fn with_durable_file(path: PathBuf) -> Self {
        Self::new(
            Box::new(FileBackend::open(path)),
            Box::new(MemoryBackend::new()),
        )
    }

    /// Store `token` under `scope` and clear the other scope.
    ///
    /// An empty token is equivalent to `clear()`.
    pub fn write(&self, token: &str, scope: Scope) {
        if token.is_empty() {
            debug!(%scope, "empty token written, clearing store");
            self.clear();
            return;
        }

        let _guard = self.lock.lock();
        if let Err(e) = self.backend(scope).save(token) {
            warn!(%scope, error = %e, "failed to persist credential");
        }
        let other = scope.other();
        if let Err(e) = self.backend(other).clear() {
            warn!(scope = %other, error = %e, "failed to clear credential scope");
        }
        debug!(%scope, "credential written");
    }

    /// Current credential: durable first, then ephemeral, else `None`.
    pub fn read(&self) -> Option<Credential> {
        let _guard = self.lock.lock();
        [Scope::Durable, Scope::Ephemeral]
            .into_iter()
            .find_map(|scope| {
                self.backend(scope)
                    .load()
                    .filter(|token| !token.is_empty())
                    .map(|token| Credential {
                        access_token: Secret::new(token),
                        scope,
                    })
            })
    }

    /// Empty both scopes. Idempotent.
    pub fn clear(&self) {
        let _guard = self.lock.lock();
        for scope in [Scope::Durable, Scope::Ephemeral] {
            if let Err(e) = self.backend(scope).clear() {
                warn!(%scope, error = %e, "failed to clear credential scope");
            }
        }
        debug!("credential store cleared");
    }

    /// Token currently held by one specific scope.
    pub fn scope_token(&self, scope: Scope) -> Option<String> {
        let _guard = self.lock.lock();
        self.backend(scope).load()
    }

    fn backend(&self, scope: Scope) -> &dyn ScopeBackend {
        match scope {
            Scope::Durable => self.durable.as_ref(),
            Scope::Ephemeral => self.ephemeral.as_ref(),
        }
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("durable", &self.durable.name())
            .field("ephemeral", &self.ephemeral.name())
            .finish()
    }
}
