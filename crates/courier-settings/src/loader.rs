//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`CourierSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Reject values the runtime cannot use

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::CourierSettings;

/// Directory holding settings and databases (`~/.courier`).
pub fn courier_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".courier")
}

/// Resolve the path to the settings file (`~/.courier/settings.json`).
pub fn settings_path() -> PathBuf {
    courier_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<CourierSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<CourierSettings> {
    let defaults = serde_json::to_value(CourierSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: CourierSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Smallest accepted send timeout, shared with `COURIER_SEND_TIMEOUT_MS`.
pub const MIN_SEND_TIMEOUT_MS: u64 = 100;

/// Check merged settings for values that would break the runtime.
pub fn validate(settings: &CourierSettings) -> Result<()> {
    if settings.server.heartbeat_interval_secs == 0 {
        return Err(SettingsError::Invalid {
            key: "server.heartbeatIntervalSecs",
            reason: "must be at least 1".into(),
        });
    }
    if settings.session.send_timeout_ms < MIN_SEND_TIMEOUT_MS {
        return Err(SettingsError::Invalid {
            key: "session.sendTimeoutMs",
            reason: format!("must be at least {MIN_SEND_TIMEOUT_MS}"),
        });
    }
    if settings.session.address_suffix.is_empty() {
        return Err(SettingsError::Invalid {
            key: "session.addressSuffix",
            reason: "must not be empty".into(),
        });
    }
    Ok(())
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored (fall back to file/default).
pub fn apply_env_overrides(settings: &mut CourierSettings) {
    if let Some(v) = read_env_string("COURIER_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("COURIER_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_string("COURIER_DB") {
        settings.store.database_path = v;
    }
    if let Some(v) = read_env_u64("COURIER_RECONNECT_DELAY_MS", 0, 600_000) {
        settings.session.reconnect_delay_ms = v;
    }
    if let Some(v) = read_env_u64("COURIER_SEND_TIMEOUT_MS", MIN_SEND_TIMEOUT_MS, 3_600_000) {
        settings.session.send_timeout_ms = v;
    }
    if let Some(v) = read_env_string("COURIER_ADDRESS_SUFFIX") {
        settings.session.address_suffix = v;
    }
    if let Some(v) = read_env_usize("COURIER_HISTORY_LIMIT", 0, 10_000) {
        settings.session.history_replay_limit = v;
    }
    if let Some(v) = read_env_string("COURIER_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("COURIER_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

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

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}
