//! # hive-server
//!
//! Axum HTTP + `WebSocket` front end for the telemetry hub.
//!
//! - `POST /api/data`: ingest a reading
//! - `GET /api/data`: current reading
//! - `GET /ws`: live subscription (replay, then every new reading)
//! - `GET /health`, `GET /metrics`: liveness and Prometheus text
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use error::{ApiError, ServerError};
pub use server::{AppState, HiveServer};
