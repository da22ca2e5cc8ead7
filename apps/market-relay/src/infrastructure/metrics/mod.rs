//! Prometheus Metrics Module
//!
//! Exposes relay metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Upstream**: venue frames by kind, session state, reconnects,
//!   heartbeat timeouts, stale episodes, snapshot latency
//! - **Clients**: connected clients, frames sent and dropped by kind
//! - **Subscriptions**: symbols held upstream
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::streaming::SessionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            #[allow(clippy::expect_used)]
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Upstream
    describe_counter!(
        "relay_upstream_messages_total",
        "Venue frames received by kind"
    );
    describe_counter!(
        "relay_upstream_transitions_total",
        "Venue session state transitions by target state"
    );
    describe_gauge!(
        "relay_upstream_ready",
        "1 while the venue session is ready, 0 otherwise"
    );
    describe_counter!(
        "relay_reconnects_total",
        "Venue reconnection attempts"
    );
    describe_counter!(
        "relay_heartbeat_timeouts_total",
        "Venue connections dropped for a missing heartbeat acknowledgement"
    );
    describe_counter!(
        "relay_stale_episodes_total",
        "Symbols flagged stale"
    );
    describe_histogram!(
        "relay_snapshot_seconds",
        "Snapshot request latency by outcome"
    );

    // Clients
    describe_gauge!("relay_clients", "Connected downstream clients");
    describe_counter!(
        "relay_frames_sent_total",
        "Frames queued to clients by kind"
    );
    describe_counter!(
        "relay_frames_dropped_total",
        "Frames dropped on full client queues by kind"
    );

    // Subscriptions
    describe_gauge!(
        "relay_upstream_subscriptions",
        "Symbols subscribed at the venue"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a frame received from the venue.
pub fn record_upstream_message(kind: &'static str) {
    counter!("relay_upstream_messages_total", "kind" => kind).increment(1);
}

/// Record a venue session state transition.
pub fn set_session_state(state: SessionState) {
    counter!("relay_upstream_transitions_total", "state" => state.as_str()).increment(1);
    gauge!("relay_upstream_ready").set(if state == SessionState::Ready {
        1.0
    } else {
        0.0
    });
}

/// Record a venue reconnection attempt.
pub fn record_reconnect_attempt() {
    counter!("relay_reconnects_total").increment(1);
}

/// Record a heartbeat timeout.
pub fn record_heartbeat_timeout() {
    counter!("relay_heartbeat_timeouts_total").increment(1);
}

/// Record a symbol flagged stale.
pub fn record_stale_episode() {
    counter!("relay_stale_episodes_total").increment(1);
}

/// Record a snapshot request.
pub fn record_snapshot(duration: Duration, outcome: &'static str) {
    histogram!("relay_snapshot_seconds", "outcome" => outcome).record(duration.as_secs_f64());
}

/// Update the connected client count.
#[allow(clippy::cast_precision_loss)]
pub fn set_connected_clients(count: usize) {
    gauge!("relay_clients").set(count as f64);
}

/// Record a frame queued to a client.
pub fn record_frame_sent(kind: &'static str) {
    counter!("relay_frames_sent_total", "kind" => kind).increment(1);
}

/// Record a frame dropped for a slow client.
pub fn record_frame_dropped(kind: &'static str) {
    counter!("relay_frames_dropped_total", "kind" => kind).increment(1);
}

/// Update the number of symbols held upstream.
#[allow(clippy::cast_precision_loss)]
pub fn set_upstream_subscriptions(count: usize) {
    gauge!("relay_upstream_subscriptions").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================
