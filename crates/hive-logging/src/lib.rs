//! # hive-logging
//!
//! Structured logging with `tracing` for the telemetry hub.
//!
//! Every crate logs through `tracing` macros with structured fields
//! (`subscriber_id`, `sequence`, ...). The binary calls [`init_subscriber`]
//! once at startup; `RUST_LOG` takes precedence over the configured level.

#![deny(unsafe_code)]

pub mod types;

pub use types::{LogFormat, LogLevel};

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at application startup. Subsequent calls are no-ops.
pub fn init_subscriber(level: LogLevel, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init fails if a global subscriber is already set
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_subscriber_does_not_panic() {
        init_subscriber(LogLevel::Warn, LogFormat::Compact);
        init_subscriber(LogLevel::Debug, LogFormat::Json);
    }
}
