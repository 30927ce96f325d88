//! Listener and liveness settings.

use serde::{Deserialize, Serialize};

use crate::errors::SettingsError;

/// Server network and heartbeat settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP/WebSocket port.
    pub port: u16,
    /// Largest accepted `POST /api/data` body in bytes.
    pub max_payload_bytes: usize,
    /// Seconds between WebSocket pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds without a pong before a subscriber is dropped.
    pub heartbeat_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_payload_bytes: 64 * 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
        }
    }
}

impl ServerSettings {
    pub(crate) fn validate(&self) -> crate::Result<()> {
        if self.max_payload_bytes == 0 {
            return Err(SettingsError::InvalidValue(
                "maxPayloadBytes must be positive".into(),
            ));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "heartbeatIntervalSecs must be positive".into(),
            ));
        }
        if self.heartbeat_timeout_secs < self.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(format!(
                "heartbeatTimeoutSecs ({}) is shorter than heartbeatIntervalSecs ({})",
                self.heartbeat_timeout_secs, self.heartbeat_interval_secs
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = ServerSettings::default();
        assert_eq!(s.host, "0.0.0.0");
        assert_eq!(s.port, 3000);
        assert_eq!(s.max_payload_bytes, 65_536);
        assert_eq!(s.heartbeat_interval_secs, 30);
        assert_eq!(s.heartbeat_timeout_secs, 90);
    }

    #[test]
    fn timeout_shorter_than_interval_is_invalid() {
        let s = ServerSettings {
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 10,
            ..ServerSettings::default()
        };
        assert!(matches!(s.validate(), Err(SettingsError::InvalidValue(_))));
    }

    #[test]
    fn zero_payload_limit_is_invalid() {
        let s = ServerSettings {
            max_payload_bytes: 0,
            ..ServerSettings::default()
        };
        assert!(s.validate().is_err());
    }
}
