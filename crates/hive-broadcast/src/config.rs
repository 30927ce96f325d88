//! Hub configuration.

use hive_settings::HubSettings;

/// Runtime limits of a [`TelemetryHub`](crate::TelemetryHub).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubConfig {
    /// Maximum number of registered subscribers.
    pub max_subscribers: usize,
    /// Outbound queue depth per subscriber.
    pub queue_capacity: usize,
    /// Full-queue drops after which a subscriber is disconnected.
    pub max_dropped_readings: u64,
    /// Fields that must be present and non-null in every reading.
    pub required_fields: Vec<String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::from(&HubSettings::default())
    }
}

impl From<&HubSettings> for HubConfig {
    fn from(settings: &HubSettings) -> Self {
        Self {
            max_subscribers: settings.max_subscribers.max(1),
            queue_capacity: settings.queue_capacity.max(1),
            max_dropped_readings: settings.max_dropped_readings.max(1),
            required_fields: settings.required_fields.clone(),
        }
    }
}
