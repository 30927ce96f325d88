//! Metric names recorded by the hub.
//!
//! Recorded through the `metrics` facade; the binary decides whether a
//! recorder (Prometheus) is installed.

/// Readings accepted into the store (counter).
pub const READINGS_ACCEPTED_TOTAL: &str = "readings_accepted_total";
/// Readings rejected at ingestion (counter, labels: reason).
pub const READINGS_REJECTED_TOTAL: &str = "readings_rejected_total";
/// Readings queued to a subscriber (counter).
pub const BROADCAST_DELIVERIES_TOTAL: &str = "broadcast_deliveries_total";
/// Readings dropped on a full subscriber queue (counter).
pub const BROADCAST_DROPS_TOTAL: &str = "broadcast_drops_total";
/// Subscribers removed from the registry (counter, labels: reason).
pub const SUBSCRIBERS_REMOVED_TOTAL: &str = "subscribers_removed_total";
/// Currently registered subscribers (gauge).
pub const SUBSCRIBERS_ACTIVE: &str = "subscribers_active";
/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
