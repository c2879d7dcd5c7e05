//! Pipeline counters
//!
//! - `api_refresh_total` (counter): label `outcome` = `success` | `failure`
//! - `api_replays_total` (counter): requests resent after a refresh
//! - `api_session_expired_total` (counter): label `reason`

pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("api_refresh_total", "outcome" => outcome).increment(1);
}

pub fn record_replay() {
    metrics::counter!("api_replays_total").increment(1);
}

pub fn record_session_expired(reason: &'static str) {
    metrics::counter!("api_session_expired_total", "reason" => reason).increment(1);
}
