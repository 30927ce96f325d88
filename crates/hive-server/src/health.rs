//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered subscribers.
    pub subscribers: usize,
    /// Readings accepted since startup.
    pub readings_accepted: u64,
    /// Whether a current reading exists.
    pub has_reading: bool,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    subscribers: usize,
    readings_accepted: u64,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        subscribers,
        readings_accepted,
        has_reading: readings_accepted > 0,
    }
}
