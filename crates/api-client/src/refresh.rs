//! Single-flight credential refresh
//!
//! At most one refresh operation exists at a time. The first authorization
//! failure of an episode installs the operation in a shared slot; every
//! failure observed while it is in flight clones the same shared future and
//! waits on it. The operation removes itself from the slot when it finishes,
//! so the next failure starts a fresh episode.
//!
//! The refresh call goes straight to the transport, never through the
//! pipeline's `send`, so a 401 from the refresh endpoint cannot recurse.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

use common::Secret;
use transport::{OutboundRequest, RequestDescriptor, Transport};

use crate::error::{Error, Result};

/// What waiting requests should do once the refresh settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New credential written; replay with it.
    Proceed,
    /// Refresh failed; store cleared, reject with `SessionExpired`.
    Abort,
}

pub(crate) type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

struct InFlight {
    epoch: u64,
    outcome: SharedRefresh,
}

/// Why a caller does not need to wait on a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Skip {
    /// The credential changed since the request was sent; resend with it.
    Replay,
    /// The credential was cleared since the request was sent.
    Expired,
}

/// How a caller got attached to a refresh.
pub(crate) enum Attachment {
    /// Joined the operation already in flight.
    Joined { epoch: u64, outcome: SharedRefresh },
    /// Installed a new operation.
    Started { epoch: u64, outcome: SharedRefresh },
    /// No refresh needed.
    Skipped(Skip),
}

/// Shared pending-operation slot.
///
/// The slot lock also orders credential changes made by the refresh against
/// the checks callers make before attaching: a refresh writes its result
/// and leaves the slot in one critical section, so a caller sees either
/// "still in flight" or "new credential, slot empty", never a mix.
#[derive(Default)]
pub(crate) struct RefreshSlot {
    state: Mutex<SlotState>,
}

#[derive(Default)]
struct SlotState {
    in_flight: Option<InFlight>,
    next_epoch: u64,
}

impl RefreshSlot {
    /// Join the in-flight refresh or install a new one built by `start`.
    ///
    /// With nothing in flight, `skip` runs first and may answer without a
    /// refresh. Check and set happen under one lock, before `start`'s future
    /// makes any network call.
    pub(crate) fn attach(
        &self,
        skip: impl FnOnce() -> Option<Skip>,
        start: impl FnOnce(u64) -> BoxFuture<'static, RefreshOutcome>,
    ) -> Attachment {
        let mut state = self.state.lock();
        if let Some(flight) = state.in_flight.as_ref() {
            return Attachment::Joined {
                epoch: flight.epoch,
                outcome: flight.outcome.clone(),
            };
        }
        if let Some(reason) = skip() {
            return Attachment::Skipped(reason);
        }

        state.next_epoch += 1;
        let epoch = state.next_epoch;
        let outcome = start(epoch).shared();
        state.in_flight = Some(InFlight {
            epoch,
            outcome: outcome.clone(),
        });
        Attachment::Started { epoch, outcome }
    }

    /// Apply the result of operation `epoch` and drop its slot entry in one
    /// critical section. A newer operation is left alone.
    pub(crate) fn settle(&self, epoch: u64, apply: impl FnOnce()) {
        let mut state = self.state.lock();
        apply();
        if state.in_flight.as_ref().is_some_and(|f| f.epoch == epoch) {
            state.in_flight = None;
            debug!(epoch, "refresh slot released");
        }
    }

    /// Drop the slot entry for `epoch`.
    #[cfg(test)]
    pub(crate) fn release(&self, epoch: u64) {
        self.settle(epoch, || {});
    }

    /// Run `f` while no refresh can settle.
    pub(crate) fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let _state = self.state.lock();
        f()
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.state.lock().in_flight.is_some()
    }
}

/// Body returned by the refresh endpoint.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(alias = "accessToken")]
    access_token: String,
}

/// Ask the backend for a new access token.
///
/// Any non-success status, 401 included, and any undecodable or empty body
/// is a failed refresh.
pub(crate) async fn request_new_token(
    transport: &dyn Transport,
    refresh_path: &str,
    current: Option<Secret<String>>,
) -> Result<Secret<String>> {
    let request = OutboundRequest::new(RequestDescriptor::post(refresh_path), current);
    let response = transport.execute(&request).await?.error_for_status()?;
    let body: RefreshResponse = response.json()?;
    if body.access_token.is_empty() {
        return Err(Error::Decode("refresh returned an empty access token".into()));
    }
    Ok(Secret::new(body.access_token))
}
