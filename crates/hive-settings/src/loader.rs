//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`HiveSettings::default()`]
//! 2. If `~/.hive/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `HIVE_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{HiveSettings, LogFormat, LogLevel, parse_field_list};

/// Resolve the path to the settings file (`~/.hive/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".hive").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HiveSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON or the result fails validation, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<HiveSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<HiveSettings> {
    let defaults = serde_json::to_value(HiveSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `HIVE_*` environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut HiveSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable source.
pub fn apply_overrides<F>(settings: &mut HiveSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("HIVE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("HIVE_PORT", |s| parse_u16_range(s, 1, 65535)) {
        settings.server.port = v;
    }
    if let Some(v) = env.parsed("HIVE_MAX_PAYLOAD_BYTES", |s| {
        parse_usize_range(s, 1, 64 * 1024 * 1024)
    }) {
        settings.server.max_payload_bytes = v;
    }
    if let Some(v) = env.parsed("HIVE_HEARTBEAT_INTERVAL_SECS", |s| {
        parse_u64_range(s, 1, 3600)
    }) {
        settings.server.heartbeat_interval_secs = v;
    }
    if let Some(v) = env.parsed("HIVE_HEARTBEAT_TIMEOUT_SECS", |s| {
        parse_u64_range(s, 1, 86_400)
    }) {
        settings.server.heartbeat_timeout_secs = v;
    }

    // ── Hub ─────────────────────────────────────────────────────────
    if let Some(v) = env.parsed("HIVE_MAX_SUBSCRIBERS", |s| {
        parse_usize_range(s, 1, 1_000_000)
    }) {
        settings.hub.max_subscribers = v;
    }
    if let Some(v) = env.parsed("HIVE_QUEUE_CAPACITY", |s| parse_usize_range(s, 1, 65_536)) {
        settings.hub.queue_capacity = v;
    }
    if let Some(v) = env.parsed("HIVE_MAX_DROPS", |s| parse_u64_range(s, 1, 1_000_000)) {
        settings.hub.max_dropped_readings = v;
    }
    if let Some(v) = env.raw("HIVE_REQUIRED_FIELDS") {
        settings.hub.required_fields = parse_field_list(&v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("HIVE_LOG_LEVEL") {
        settings.logging.level = LogLevel::from_str_lossy(&v);
    }
    if let Some(v) = env.parsed("HIVE_LOG_FORMAT", LogFormat::parse) {
        settings.logging.format = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Variable readers ────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    /// Set, possibly empty.
    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
    }

    /// Set and non-empty.
    fn string(&self, name: &str) -> Option<String> {
        self.raw(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}
