//! Payment session driver
//!
//! Opening a session spawns two tasks that race to mutate it: a poll timer
//! querying the status source at a fixed cadence, and a one-second countdown.
//! Both feed events through `SessionShared::apply`, which runs the pure state
//! machine under a lock, so the first terminal event wins and every later
//! event (stale poll response, queued countdown tick, repeated close) is a
//! no-op. A terminal transition or a close cancels both timers through one
//! shared cancellation token.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::machine::{SessionAction, SessionEvent, SessionState, handle_event};
use crate::metrics;
use crate::navigation::PaymentNavigator;
use crate::source::StatusSource;
use crate::status::PaymentStatus;
use crate::timer::Ticker;

/// Default time allowed for a payment to settle.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// Default status polling cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

const COUNTDOWN_STEP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Observable view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentSnapshot {
    pub order_code: String,
    pub status: PaymentStatus,
    pub remaining_secs: u64,
    pub closed: bool,
}

impl PaymentSnapshot {
    fn of(order_code: &str, state: &SessionState) -> Self {
        Self {
            order_code: order_code.to_string(),
            status: state.status,
            remaining_secs: state.remaining_secs,
            closed: state.closed,
        }
    }

    /// The session will not change any more.
    pub fn is_settled(&self) -> bool {
        self.closed || self.status.is_terminal()
    }
}

/// The single authoritative session reference shared by both timers and
/// the consumer handle.
struct SessionShared {
    order_code: String,
    state: Mutex<SessionState>,
    snapshots: watch::Sender<PaymentSnapshot>,
    cancel: CancellationToken,
    navigator: Arc<dyn PaymentNavigator>,
}

impl SessionShared {
    fn apply(&self, event: SessionEvent) -> SessionAction {
        let action = {
            let mut state = self.state.lock();
            let (next, action) = handle_event(*state, event);
            *state = next;
            let snapshot = PaymentSnapshot::of(&self.order_code, &next);
            self.snapshots.send_if_modified(|current| {
                if *current == snapshot {
                    false
                } else {
                    *current = snapshot;
                    true
                }
            });
            action
        };

        match action {
            SessionAction::Finish(status) => {
                self.cancel.cancel();
                metrics::record_session_outcome(status.label());
                info!(order_code = %self.order_code, %status, "payment session settled");
                self.navigator.to_result(&self.order_code, status);
            }
            SessionAction::Stop => {
                self.cancel.cancel();
                metrics::record_session_outcome("closed");
                debug!(order_code = %self.order_code, "payment session closed");
            }
            SessionAction::Dispatch | SessionAction::None => {}
        }
        action
    }

    fn remaining_secs(&self) -> u64 {
        self.state.lock().remaining_secs
    }
}

/// Opens payment sessions against one status source.
pub struct PaymentPipeline {
    source: Arc<dyn StatusSource>,
    navigator: Arc<dyn PaymentNavigator>,
    config: PaymentConfig,
}

impl PaymentPipeline {
    pub fn new(
        source: Arc<dyn StatusSource>,
        navigator: Arc<dyn PaymentNavigator>,
        config: PaymentConfig,
    ) -> Self {
        Self {
            source,
            navigator,
            config,
        }
    }

    /// Start watching `order_code`. `timeout` overrides the configured
    /// deadline for this session. Must be called inside a tokio runtime.
    pub fn open(&self, order_code: impl Into<String>, timeout: Option<Duration>) -> PaymentSessionHandle {
        let order_code = order_code.into();
        let timeout = timeout.unwrap_or(self.config.timeout);
        let timeout_secs = timeout.as_secs().max(1);
        let state = SessionState::new(timeout_secs);
        let (snapshots, _) = watch::channel(PaymentSnapshot::of(&order_code, &state));

        let shared = Arc::new(SessionShared {
            order_code,
            state: Mutex::new(state),
            snapshots,
            cancel: CancellationToken::new(),
            navigator: self.navigator.clone(),
        });

        info!(
            order_code = %shared.order_code,
            timeout_secs,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "payment session opened"
        );

        let poll = tokio::spawn(poll_loop(
            shared.clone(),
            self.source.clone(),
            self.config.poll_interval,
        ));
        let countdown = tokio::spawn(countdown_loop(shared.clone()));

        PaymentSessionHandle {
            shared,
            deadline: Instant::now() + Duration::from_secs(timeout_secs),
            tasks: Mutex::new(vec![poll, countdown]),
        }
    }
}

async fn poll_loop(shared: Arc<SessionShared>, source: Arc<dyn StatusSource>, period: Duration) {
    let mut ticker = Ticker::new(period, shared.cancel.clone());
    while ticker.tick().await.is_some() {
        if shared.apply(SessionEvent::PollStarted) != SessionAction::Dispatch {
            continue;
        }

        // Not raced against cancellation: an in-flight lookup completes and
        // its result is discarded by the state machine if the session moved on.
        let event = match source.fetch_status(&shared.order_code).await {
            Ok(status) => {
                metrics::record_poll(if status.is_terminal() { "terminal" } else { "awaiting" });
                debug!(order_code = %shared.order_code, %status, "status polled");
                SessionEvent::PollResult(status)
            }
            Err(Error::SessionExpired) => {
                metrics::record_poll("session_lost");
                warn!(order_code = %shared.order_code, "login session expired while polling payment");
                SessionEvent::SessionLost
            }
            Err(e) => {
                metrics::record_poll("error");
                warn!(order_code = %shared.order_code, error = %e, "status poll failed, retrying next tick");
                SessionEvent::PollError
            }
        };
        shared.apply(event);
    }
    debug!(order_code = %shared.order_code, "poll timer stopped");
}

async fn countdown_loop(shared: Arc<SessionShared>) {
    let mut ticker = Ticker::new(COUNTDOWN_STEP, shared.cancel.clone());
    while ticker.tick().await.is_some() {
        if shared.remaining_secs() <= 1 {
            // A poll tick due at the same instant registers first, so the
            // backend's answer takes priority over the local clock.
            tokio::task::yield_now().await;
        }
        shared.apply(SessionEvent::Tick);
    }
    debug!(order_code = %shared.order_code, "countdown timer stopped");
}

/// Consumer side of an open session. Dropping the handle closes the session.
pub struct PaymentSessionHandle {
    shared: Arc<SessionShared>,
    deadline: Instant,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PaymentSessionHandle {
    pub fn order_code(&self) -> &str {
        &self.shared.order_code
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Stream of snapshots; a new value is published on every visible change.
    pub fn subscribe(&self) -> watch::Receiver<PaymentSnapshot> {
        self.shared.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> PaymentSnapshot {
        self.shared.snapshots.borrow().clone()
    }

    pub fn status(&self) -> PaymentStatus {
        self.snapshot().status
    }

    /// Whether either timer may still fire.
    pub fn timers_active(&self) -> bool {
        !self.shared.cancel.is_cancelled()
    }

    /// Cancel both timers. Safe from any state, any number of times.
    pub fn close(&self) {
        self.shared.apply(SessionEvent::Close);
    }

    /// Wait until the session reaches a terminal status or is closed.
    pub async fn wait(&self) -> PaymentSnapshot {
        let mut rx = self.subscribe();
        match rx.wait_for(PaymentSnapshot::is_settled).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        }
    }

    /// Close the session and wait for both timer tasks to exit, including a
    /// poll that was already in flight.
    pub async fn shutdown(&self) {
        self.close();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(order_code = %self.shared.order_code, error = %e, "payment timer task failed");
            }
        }
    }
}

impl Drop for PaymentSessionHandle {
    fn drop(&mut self) {
        self.close();
    }
}
