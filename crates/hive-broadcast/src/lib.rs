//! # hive-broadcast
//!
//! The ingestion-and-broadcast core of the telemetry hub.
//!
//! - [`ReadingStore`]: single last-known-value slot with sequence stamping
//! - [`Subscriber`]: one live delivery channel with a bounded outbound queue
//! - [`SubscriberRegistry`]: the dynamic set of live subscribers
//! - [`TelemetryHub`]: validates readings, updates the store, fans out
//!
//! Transport concerns (HTTP, WebSocket framing, heartbeats) live in
//! `hive-server`; this crate only moves [`Latest`] values between tasks.

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod hub;
pub mod metrics;
pub mod registry;
pub mod store;
pub mod subscriber;

pub use config::HubConfig;
pub use errors::{IngestError, SubscribeError};
pub use hub::{BroadcastReport, IngestAck, Subscription, TelemetryHub};
pub use registry::SubscriberRegistry;
pub use store::{Latest, ReadingStore};
pub use subscriber::{Delivery, RemovalReason, Subscriber, SubscriberState};
