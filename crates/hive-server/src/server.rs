//! `HiveServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use hive_broadcast::{RemovalReason, TelemetryHub};
use hive_broadcast::metrics::WS_CONNECTIONS_TOTAL;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::api;
use crate::config::ServerConfig;
use crate::error::{self, ApiError, ServerError};
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::{self, SessionConfig};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Store, registry and fan-out.
    pub hub: Arc<TelemetryHub>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
    /// Heartbeat timing for WebSocket sessions.
    pub session: SessionConfig,
}

/// The telemetry hub server.
pub struct HiveServer {
    config: ServerConfig,
    hub: Arc<TelemetryHub>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: PrometheusHandle,
    start_time: Instant,
}

impl HiveServer {
    /// Create a new server around an existing hub.
    pub fn new(config: ServerConfig, hub: Arc<TelemetryHub>, metrics: PrometheusHandle) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new(Arc::clone(&hub)));
        Self {
            config,
            hub,
            shutdown,
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: Arc::clone(&self.hub),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            session: SessionConfig {
                heartbeat_interval: self.config.heartbeat_interval(),
                heartbeat_timeout: self.config.heartbeat_timeout(),
            },
        };

        Router::new()
            .route("/api/data", get(api::get_data).post(api::post_data))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(CatchPanicLayer::custom(error::panic_response))
            .layer(DefaultBodyLimit::max(self.config.max_payload_bytes))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind the listener and serve in a background task.
    ///
    /// The task ends after [`ShutdownCoordinator::shutdown`] once in-flight
    /// requests finish and open sessions have been drained.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();
        let shutdown = Arc::clone(&self.shutdown);

        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "server error");
            }
            let _ = shutdown.drain().await;
            info!("server stopped");
        });

        info!(%addr, "hive server listening");
        Ok((addr, handle))
    }

    /// Get the hub.
    pub fn hub(&self) -> &Arc<TelemetryHub> {
        &self.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /ws
///
/// Registers the subscriber before upgrading so a full registry answers 503.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    if state.shutdown.is_shutting_down() {
        return Err(ApiError::new(
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            "server shutting down",
        ));
    }
    let subscription = state.hub.subscribe().await.inspect_err(|e| {
        warn!(error = %e, "rejecting websocket subscriber");
    })?;
    metrics::counter!(WS_CONNECTIONS_TOTAL).increment(1);
    info!(subscriber_id = %subscription.subscriber.id(), "websocket client connected");

    let hub = Arc::clone(&state.hub);
    let failed_hub = Arc::clone(&state.hub);
    let failed_id = subscription.subscriber.id().clone();
    let shutdown = Arc::clone(&state.shutdown);
    let config = state.session;
    Ok(ws
        .on_failed_upgrade(move |e| {
            warn!(subscriber_id = %failed_id, error = %e, "websocket upgrade failed");
            let _ = tokio::spawn(async move {
                let _ = failed_hub
                    .unsubscribe(&failed_id, RemovalReason::Disconnected)
                    .await;
            });
        })
        .on_upgrade(move |socket| {
            let session =
                session::run_session(socket, subscription, hub, config, shutdown.token());
            let tracked = shutdown.track_session(session);
            async move {
                let _ = tracked.await;
            }
        }))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let subscribers = state.hub.subscriber_count().await;
    Json(health::health_check(
        state.start_time,
        subscribers,
        state.hub.readings_accepted(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::render(&state.metrics),
    )
}
