//! `/api/data` handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use hive_broadcast::IngestAck;
use serde::Serialize;

use crate::error::ApiError;
use crate::server::AppState;

/// Body of a successful `POST /api/data`.
#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    /// Always `"success"`.
    pub status: &'static str,
    /// Store sequence of the accepted reading.
    pub sequence: u64,
    /// Subscribers the reading was queued for.
    pub delivered: usize,
}

impl From<IngestAck> for IngestResponse {
    fn from(ack: IngestAck) -> Self {
        Self {
            status: "success",
            sequence: ack.sequence,
            delivered: ack.delivered,
        }
    }
}

/// POST /api/data
///
/// The raw body is taken as-is; content type is not enforced.
pub async fn post_data(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<IngestResponse>, ApiError> {
    let ack = state.hub.ingest(&body).await?;
    Ok(Json(ack.into()))
}

/// GET /api/data
///
/// The current reading exactly as submitted, or `{}` before the first one.
pub async fn get_data(State(state): State<AppState>) -> Response {
    let body = state
        .hub
        .current()
        .map_or_else(|| "{}".to_string(), |latest| latest.reading.wire().to_string());
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}
