//! # hive-settings
//!
//! Layered configuration for the telemetry hub.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** ([`HiveSettings::default()`])
//! 2. **User file** `~/.hive/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** `HIVE_*` overrides (highest priority)
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;
