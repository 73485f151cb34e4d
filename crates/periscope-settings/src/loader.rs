//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`PeriscopeSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{LogFormatSetting, PeriscopeSettings};

/// Env var naming an explicit settings file.
pub const CONFIG_PATH_ENV: &str = "PERISCOPE_CONFIG";

/// Resolve the settings file path.
///
/// `PERISCOPE_CONFIG` wins; otherwise `~/.periscope/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(explicit) = read_env_string(CONFIG_PATH_ENV) {
        return PathBuf::from(explicit);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".periscope").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<PeriscopeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<PeriscopeSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults deep-merged with the file at `path`, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<PeriscopeSettings> {
    let defaults = serde_json::to_value(PeriscopeSettings::default())?;

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

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut PeriscopeSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// - Integers must parse and fall within the documented range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are ignored with a warning (file/default value stays)
pub fn apply_overrides_from<F>(settings: &mut PeriscopeSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let number = |name: &str, min: u64, max: u64| {
        let val = lookup(name)?;
        let parsed = parse_u64_range(&val, min, max);
        if parsed.is_none() {
            tracing::warn!(key = name, value = %val, "invalid integer env var, ignoring");
        }
        parsed
    };

    if let Some(v) = string("OPENCODE_URL") {
        settings.opencode_url = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = string("PERISCOPE_METRICS_ADDR") {
        settings.metrics_addr = v;
    }
    if let Some(v) = number("PERISCOPE_EXPORT_INTERVAL_MS", 100, 3_600_000) {
        settings.export_interval_ms = v;
    }
    if let Some(v) = number("PERISCOPE_POLL_INTERVAL_MS", 100, 3_600_000) {
        settings.poll_interval_ms = v;
    }
    if let Some(v) = string("PERISCOPE_INSTANCE") {
        settings.instance = v;
    }
    if let Some(val) = lookup("PERISCOPE_VERBOSE") {
        match parse_bool(&val) {
            Some(v) => settings.verbose = v,
            None => tracing::warn!(key = "PERISCOPE_VERBOSE", value = %val, "invalid boolean env var, ignoring"),
        }
    }
    if let Some(v) = number("PERISCOPE_RECONNECT_BASE_MS", 1, 3_600_000) {
        settings.reconnect.base_delay_ms = v;
    }
    if let Some(v) = number("PERISCOPE_RECONNECT_MAX_MS", 1, 86_400_000) {
        settings.reconnect.max_delay_ms = v;
    }
    if let Some(v) = string("PERISCOPE_LOG_FORMAT") {
        match v.to_lowercase().as_str() {
            "json" => settings.logging.format = LogFormatSetting::Json,
            "compact" => settings.logging.format = LogFormatSetting::Compact,
            _ => tracing::warn!(key = "PERISCOPE_LOG_FORMAT", value = %v, "unknown log format, ignoring"),
        }
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

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
