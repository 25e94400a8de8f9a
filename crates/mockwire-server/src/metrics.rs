//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Returns the handle that renders `/metrics`. Fails if a recorder is already
/// installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Prometheus text for `handle`, or an empty page without a recorder.
pub fn render(handle: Option<&PrometheusHandle>) -> String {
    handle.map(PrometheusHandle::render).unwrap_or_default()
}

/// Persistent sessions opened (counter, labels: scope).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Persistent sessions currently open (gauge, labels: scope).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Session lifetime in seconds (histogram, labels: scope).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Malformed or unsupported frames rejected (counter, labels: kind).
pub const WS_PARSE_ERRORS_TOTAL: &str = "ws_parse_errors_total";
/// Successful per-recipient fan-out writes (counter).
pub const BROADCAST_DELIVERIES_TOTAL: &str = "broadcast_deliveries_total";
/// Failed or timed-out per-recipient fan-out writes (counter).
pub const BROADCAST_FAILURES_TOTAL: &str = "broadcast_failures_total";
/// Streaming calls started (counter, labels: method).
pub const STREAM_CALLS_TOTAL: &str = "stream_calls_total";
/// Streaming calls that ended with a non-ok status (counter, labels: method, code).
pub const STREAM_CALL_ERRORS_TOTAL: &str = "stream_call_errors_total";
/// Streaming call duration in seconds (histogram, labels: method).
pub const STREAM_CALL_DURATION_SECONDS: &str = "stream_call_duration_seconds";
