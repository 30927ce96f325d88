//! # hive-core
//!
//! Foundation types shared by every hive crate:
//!
//! - **Readings**: [`Reading`], an opaque JSON object submitted by a sensor
//!   client, validated on parse and kept alongside its verbatim wire text
//! - **Branded IDs**: [`SubscriberId`] as a newtype for type safety
//! - **Errors**: [`ReadingError`] via `thiserror`

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod reading;

pub use errors::ReadingError;
pub use ids::SubscriberId;
pub use reading::Reading;
