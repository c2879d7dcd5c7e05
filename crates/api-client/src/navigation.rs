//! Navigation collaborator signalled when the session ends

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

/// Redirect target for an expired session. The UI layer decides what
/// "login surface" means; the pipeline only signals it.
pub trait Navigator: Send + Sync {
    fn to_login(&self);
}

/// Logs the redirect and does nothing else.
#[derive(Debug, Default)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn to_login(&self) {
        info!("session expired, redirecting to login");
    }
}

/// Counts login redirects. Handy for consumers that poll instead of
/// reacting to the callback.
#[derive(Debug, Default)]
pub struct CountingNavigator {
    logins: AtomicUsize,
}

impl CountingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login_redirects(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }
}

impl Navigator for CountingNavigator {
    fn to_login(&self) {
        self.logins.fetch_add(1, Ordering::SeqCst);
    }
}
