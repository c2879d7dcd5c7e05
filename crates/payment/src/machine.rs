//! Payment session state machine
//!
//! Pure state machine: receives events, returns (new_state, action). The
//! session driver applies every event under one lock, so exactly one event
//! can move the session out of `Awaiting`; everything after that is a no-op.
//!
//! Transitions:
//! - Awaiting → Paid | Failed (poll result)
//! - Awaiting → Expired (countdown reaches zero with no poll in flight, or the
//!   in-flight poll resolves non-terminal after the deadline)
//! - any → closed (consumer close, or the poll lost its session)
//! - terminal and closed states are absorbing

use crate::status::PaymentStatus;

/// Mutable state of one payment session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionState {
    pub status: PaymentStatus,
    pub remaining_secs: u64,
    pub poll_in_flight: bool,
    /// Countdown hit zero while a poll was outstanding; expiry waits on it.
    pub deadline_reached: bool,
    pub closed: bool,
}

impl SessionState {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            status: PaymentStatus::Awaiting,
            remaining_secs: timeout_secs,
            poll_in_flight: false,
            deadline_reached: false,
            closed: false,
        }
    }

    /// No further transition can happen.
    pub fn is_settled(&self) -> bool {
        self.closed || self.status.is_terminal()
    }
}

/// Events delivered by the poll timer, the countdown timer and the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Poll timer fired and wants to query the backend.
    PollStarted,
    /// Status lookup returned.
    PollResult(PaymentStatus),
    /// Status lookup failed transiently (network, backend error).
    PollError,
    /// Status lookup hit an expired login session.
    SessionLost,
    /// One second of countdown elapsed.
    Tick,
    /// Consumer navigated away or unmounted.
    Close,
}

/// What the driver must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Go ahead with the status lookup.
    Dispatch,
    /// Terminal transition: cancel both timers and navigate to the result.
    Finish(PaymentStatus),
    /// Cancel both timers without navigating.
    Stop,
    None,
}

/// Handle a session event. Pure function: no I/O.
pub fn handle_event(state: SessionState, event: SessionEvent) -> (SessionState, SessionAction) {
    if state.closed {
        return (state, SessionAction::None);
    }

    if state.status.is_terminal() {
        return match event {
            SessionEvent::Close => (
                SessionState {
                    closed: true,
                    ..state
                },
                SessionAction::Stop,
            ),
            _ => (state, SessionAction::None),
        };
    }

    match event {
        SessionEvent::Close | SessionEvent::SessionLost => (
            SessionState {
                closed: true,
                poll_in_flight: false,
                ..state
            },
            SessionAction::Stop,
        ),

        SessionEvent::PollStarted if state.deadline_reached || state.poll_in_flight => {
            (state, SessionAction::None)
        }
        SessionEvent::PollStarted => (
            SessionState {
                poll_in_flight: true,
                ..state
            },
            SessionAction::Dispatch,
        ),

        SessionEvent::PollResult(status) if status.is_terminal() => finish(state, status),
        SessionEvent::PollResult(_) | SessionEvent::PollError => {
            let state = SessionState {
                poll_in_flight: false,
                ..state
            };
            if state.deadline_reached {
                finish(state, PaymentStatus::Expired)
            } else {
                (state, SessionAction::None)
            }
        }

        SessionEvent::Tick if state.deadline_reached => (state, SessionAction::None),
        SessionEvent::Tick => {
            let remaining_secs = state.remaining_secs.saturating_sub(1);
            let state = SessionState {
                remaining_secs,
                ..state
            };
            if remaining_secs > 0 {
                (state, SessionAction::None)
            } else if state.poll_in_flight {
                // Payment-service truth beats the client clock: let the
                // outstanding poll decide.
                (
                    SessionState {
                        deadline_reached: true,
                        ..state
                    },
                    SessionAction::None,
                )
            } else {
                finish(state, PaymentStatus::Expired)
            }
        }
    }
}

fn finish(state: SessionState, status: PaymentStatus) -> (SessionState, SessionAction) {
    (
        SessionState {
            status,
            poll_in_flight: false,
            deadline_reached: false,
            ..state
        },
        SessionAction::Finish(status),
    )
}
