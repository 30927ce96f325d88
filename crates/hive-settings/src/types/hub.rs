//! Ingestion and fan-out settings.

use serde::{Deserialize, Serialize};

use crate::errors::SettingsError;

/// Hub capacity and validation settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Maximum number of concurrently registered subscribers.
    pub max_subscribers: usize,
    /// Outbound queue depth per subscriber.
    pub queue_capacity: usize,
    /// Drops tolerated before a slow subscriber is disconnected.
    pub max_dropped_readings: u64,
    /// Fields every reading must carry (non-null). Empty accepts any object.
    pub required_fields: Vec<String>,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            max_subscribers: 1024,
            queue_capacity: 64,
            max_dropped_readings: 32,
            required_fields: Vec::new(),
        }
    }
}

impl HubSettings {
    pub(crate) fn validate(&self) -> crate::Result<()> {
        if self.queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "queueCapacity must be positive".into(),
            ));
        }
        if self.max_subscribers == 0 {
            return Err(SettingsError::InvalidValue(
                "maxSubscribers must be positive".into(),
            ));
        }
        if self.max_dropped_readings == 0 {
            return Err(SettingsError::InvalidValue(
                "maxDroppedReadings must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Split a comma separated field list, dropping blanks.
pub fn parse_field_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
