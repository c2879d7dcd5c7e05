//! Payment pipeline counters
//!
//! - `payment_sessions_total` (counter): label `outcome` = terminal status or `closed`
//! - `payment_polls_total` (counter): label `result` = `awaiting` | `terminal` | `error` | `session_lost`

pub fn record_session_outcome(outcome: &'static str) {
    metrics::counter!("payment_sessions_total", "outcome" => outcome).increment(1);
}

pub fn record_poll(result: &'static str) {
    metrics::counter!("payment_polls_total", "result" => result).increment(1);
}
