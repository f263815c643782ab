//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RippleSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `RIPPLE_*` environment overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::RippleSettings;

/// Resolve the path to the settings file (`~/.ripple/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".ripple").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RippleSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or an invalid combination of
/// values is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RippleSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<RippleSettings> {
    let defaults = serde_json::to_value(RippleSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
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

/// Apply `RIPPLE_*` environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut RippleSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Empty strings count as unset; unparseable or out-of-range values are
/// ignored with a warning.
pub fn apply_overrides_from<F>(settings: &mut RippleSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("RIPPLE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("RIPPLE_PORT") {
        if let Some(port) = checked("RIPPLE_PORT", &v, |s| parse_u16_range(s, 0, 65535)) {
            settings.server.port = port;
        }
    }
    if let Some(v) = read("RIPPLE_DB_PATH") {
        settings.store.db_path = v;
    }
    if let Some(v) = read("RIPPLE_HEARTBEAT_ENABLED") {
        if let Some(enabled) = checked("RIPPLE_HEARTBEAT_ENABLED", &v, parse_bool) {
            settings.heartbeat.enabled = enabled;
        }
    }
    if let Some(v) = read("RIPPLE_HEARTBEAT_DELAY") {
        if let Some(secs) = checked("RIPPLE_HEARTBEAT_DELAY", &v, |s| {
            parse_u64_range(s, 1, 86_400)
        }) {
            settings.heartbeat.delay_secs = secs;
        }
    }
    if let Some(v) = read("RIPPLE_HEARTBEAT_TIMEOUT") {
        if let Some(secs) = checked("RIPPLE_HEARTBEAT_TIMEOUT", &v, |s| {
            parse_u64_range(s, 1, 86_400)
        }) {
            settings.heartbeat.timeout_secs = secs;
        }
    }
    if let Some(v) = read("RIPPLE_DELIVERY_RETRIES") {
        if let Some(n) = checked("RIPPLE_DELIVERY_RETRIES", &v, |s| parse_u32_range(s, 0, 20)) {
            settings.delivery.max_retries = n;
        }
    }
    if let Some(v) = read("RIPPLE_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

fn checked<T>(key: &str, val: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let result = parse(val);
    if result.is_none() {
        warn!(key, value = %val, "invalid env var, ignoring");
    }
    result
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
