//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::error::ServerError;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render the `/metrics` endpoint. Call once at
/// startup, before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    describe();
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Build a handle without installing it globally (tests, embedding).
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

fn describe() {
    use hive_broadcast::metrics::{
        BROADCAST_DELIVERIES_TOTAL, BROADCAST_DROPS_TOTAL, READINGS_ACCEPTED_TOTAL,
        READINGS_REJECTED_TOTAL, SUBSCRIBERS_ACTIVE, SUBSCRIBERS_REMOVED_TOTAL,
        WS_CONNECTIONS_TOTAL,
    };

    metrics::describe_counter!(READINGS_ACCEPTED_TOTAL, "Readings accepted into the store");
    metrics::describe_counter!(READINGS_REJECTED_TOTAL, "Readings rejected at ingestion");
    metrics::describe_counter!(BROADCAST_DELIVERIES_TOTAL, "Readings queued to subscribers");
    metrics::describe_counter!(BROADCAST_DROPS_TOTAL, "Readings dropped on full queues");
    metrics::describe_counter!(SUBSCRIBERS_REMOVED_TOTAL, "Subscribers removed");
    metrics::describe_gauge!(SUBSCRIBERS_ACTIVE, "Currently registered subscribers");
    metrics::describe_counter!(WS_CONNECTIONS_TOTAL, "WebSocket connections opened");
}
