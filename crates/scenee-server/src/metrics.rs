//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Call once at startup, before anything is recorded. The returned handle
/// renders the `/metrics` body.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render the Prometheus text exposition.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Sessions opened (counter).
pub const REALTIME_SESSIONS_OPENED_TOTAL: &str = "realtime_sessions_opened_total";
/// Sessions closed (counter, labels: reason).
pub const REALTIME_SESSIONS_CLOSED_TOTAL: &str = "realtime_sessions_closed_total";
/// Sessions currently running a delivery loop (gauge).
pub const REALTIME_SESSIONS_ACTIVE: &str = "realtime_sessions_active";
/// Sessions replaced by a newer one for the same user (counter).
pub const REALTIME_SESSIONS_SUPERSEDED_TOTAL: &str = "realtime_sessions_superseded_total";
/// Events accepted into a session queue (counter, labels: type).
pub const REALTIME_EVENTS_PUBLISHED_TOTAL: &str = "realtime_events_published_total";
/// Events dropped on a full queue (counter, labels: type).
pub const REALTIME_EVENTS_DROPPED_TOTAL: &str = "realtime_events_dropped_total";
/// Session lifetime in seconds (histogram).
pub const REALTIME_SESSION_DURATION_SECONDS: &str = "realtime_session_duration_seconds";
