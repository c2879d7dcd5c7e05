//! Cancellable fixed-cadence timers
//!
//! A `Ticker` yields once per period until its cancellation token fires.
//! Cancellation is cooperative: it stops future ticks but never interrupts
//! work a tick already started, so every tick handler re-checks session
//! state before mutating anything.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

pub struct Ticker {
    interval: Interval,
    cancel: CancellationToken,
}

impl Ticker {
    /// First tick one full `period` from now, then every `period`. Ticks
    /// missed while a handler was busy are delayed, not bunched.
    pub fn new(period: Duration, cancel: CancellationToken) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, cancel }
    }

    /// Wait for the next tick. `None` once cancelled; cancellation wins when
    /// both are ready.
    pub async fn tick(&mut self) -> Option<Instant> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            at = self.interval.tick() => Some(at),
        }
    }
}
