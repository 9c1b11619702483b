//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// Worker connections opened total (counter).
pub const WORKER_CONNECTIONS_TOTAL: &str = "relay_worker_connections_total";
/// Worker disconnections total (counter).
pub const WORKER_DISCONNECTIONS_TOTAL: &str = "relay_worker_disconnections_total";
/// Live worker connections (gauge).
pub const WORKER_CONNECTIONS_ACTIVE: &str = "relay_worker_connections_active";
/// Invocations dispatched total (counter).
pub const INVOCATIONS_TOTAL: &str = "relay_invocations_total";
/// Failed invocations total (counter, labels: code).
pub const INVOCATION_FAILURES_TOTAL: &str = "relay_invocation_failures_total";
/// Invocation round-trip duration seconds (histogram).
pub const INVOCATION_DURATION_SECONDS: &str = "relay_invocation_duration_seconds";
/// Results for unknown connections or correlation IDs (counter).
pub const STALE_RESULTS_TOTAL: &str = "relay_stale_results_total";
