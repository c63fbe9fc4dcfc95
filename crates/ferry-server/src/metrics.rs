//! Prometheus metrics recorder and metric name constants.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics`
/// endpoint. Must be called once at server startup before any metrics
/// are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// Sessions opened total (counter).
pub const SESSIONS_OPENED_TOTAL: &str = "sessions_opened_total";
/// Sessions closed total (counter).
pub const SESSIONS_CLOSED_TOTAL: &str = "sessions_closed_total";
/// Receiver rejections total, close code 2010 (counter).
pub const RECEIVER_REJECTIONS_TOTAL: &str = "receiver_rejections_total";
/// Idle-timeout closes total (counter).
pub const IDLE_TIMEOUTS_TOTAL: &str = "idle_timeouts_total";
/// Sessions reaped after the close grace period (counter).
pub const SESSIONS_REAPED_TOTAL: &str = "sessions_reaped_total";
/// Send-path requests for unknown session ids (counter).
pub const SEND_UNKNOWN_SESSION_TOTAL: &str = "send_unknown_session_total";
/// Send-path payload decode failures (counter).
pub const SEND_DECODE_ERRORS_TOTAL: &str = "send_decode_errors_total";
/// Frames written to transports (counter, labels: transport).
pub const FRAMES_SENT_TOTAL: &str = "frames_sent_total";
