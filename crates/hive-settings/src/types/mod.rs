//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so a partial JSON file only needs to name the values it changes.

mod hub;
mod server;

pub use hub::*;
pub use server::*;

pub use hive_logging::{LogFormat, LogLevel};

use serde::{Deserialize, Serialize};

/// Root settings type for the hub.
///
/// ```json
/// {
///   "server": { "port": 8080 },
///   "hub": { "requiredFields": ["temperature", "humidity"] },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HiveSettings {
    /// Network listener and liveness settings.
    pub server: ServerSettings,
    /// Ingestion and fan-out settings.
    pub hub: HubSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl HiveSettings {
    /// Reject combinations that cannot run.
    pub fn validate(&self) -> crate::Result<()> {
        self.server.validate()?;
        self.hub.validate()
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level written to stderr.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
}
