//! Prometheus recorder for the counters the library crates emit
//!
//! - `api_refresh_total` (counter): label `outcome`
//! - `api_replays_total` (counter)
//! - `api_session_expired_total` (counter): label `reason`
//! - `payment_sessions_total` (counter): label `outcome`
//! - `payment_polls_total` (counter): label `result`
//!
//! The CLI has no scrape endpoint; the rendered exposition is logged at
//! debug level when a command finishes.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}
