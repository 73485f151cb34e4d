//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may specify any subset of fields. Missing fields get the compiled
//! default.

use periscope_core::BackoffConfig;
use periscope_core::errors_buffer::{DEFAULT_ERROR_CAPACITY, DEFAULT_ERROR_RETENTION_SECS};
use periscope_core::ledger::DEFAULT_LEDGER_CAPACITY;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the periscope sidecar.
///
/// ```json
/// {
///   "opencodeUrl": "http://127.0.0.1:4096",
///   "pollIntervalMs": 10000,
///   "reconnect": { "maxDelayMs": 30000 }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PeriscopeSettings {
    /// Base URL of the observed server.
    pub opencode_url: String,
    /// Bind address of the Prometheus `/metrics` endpoint.
    pub metrics_addr: String,
    /// How often snapshot gauges are published and the recorder runs upkeep.
    pub export_interval_ms: u64,
    /// How often sessions and messages are re-polled.
    pub poll_interval_ms: u64,
    /// Instance identifier attached to liveness and error metrics.
    pub instance: String,
    /// Verbose logging (also surfaces swallowed poll failures).
    pub verbose: bool,
    /// Reconnect backoff.
    pub reconnect: BackoffConfig,
    /// Bounds on in-memory state.
    pub limits: LimitSettings,
    /// Logging output.
    pub logging: LoggingSettings,
    /// How long the exporter may drain on shutdown, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for PeriscopeSettings {
    fn default() -> Self {
        Self {
            opencode_url: "http://127.0.0.1:4096".to_string(),
            metrics_addr: "0.0.0.0:9464".to_string(),
            export_interval_ms: 15_000,
            poll_interval_ms: 30_000,
            instance: "opencode".to_string(),
            verbose: false,
            reconnect: BackoffConfig::default(),
            limits: LimitSettings::default(),
            logging: LoggingSettings::default(),
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl PeriscopeSettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if !(self.opencode_url.starts_with("http://") || self.opencode_url.starts_with("https://")) {
            return Err(SettingsError::InvalidValue(format!(
                "opencodeUrl must start with http:// or https://, got {:?}",
                self.opencode_url
            )));
        }
        if self.poll_interval_ms == 0 || self.export_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "pollIntervalMs and exportIntervalMs must be non-zero".to_string(),
            ));
        }
        if self.reconnect.base_delay_ms > self.reconnect.max_delay_ms {
            return Err(SettingsError::InvalidValue(format!(
                "reconnect.baseDelayMs ({}) exceeds reconnect.maxDelayMs ({})",
                self.reconnect.base_delay_ms, self.reconnect.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Bounds on the engine's in-memory containers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LimitSettings {
    /// Maximum dedup keys before the oldest half is evicted.
    pub ledger_capacity: usize,
    /// Maximum retained error observations.
    pub error_capacity: usize,
    /// Error retention window in seconds.
    pub error_retention_secs: i64,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
            error_capacity: DEFAULT_ERROR_CAPACITY,
            error_retention_secs: DEFAULT_ERROR_RETENTION_SECS,
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatSetting {
    /// Compact human-readable lines.
    #[default]
    Compact,
    /// JSON lines.
    Json,
}

/// Logging configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Output format.
    pub format: LogFormatSetting,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let s = PeriscopeSettings::default();
        assert_eq!(s.opencode_url, "http://127.0.0.1:4096");
        assert_eq!(s.metrics_addr, "0.0.0.0:9464");
        assert_eq!(s.export_interval_ms, 15_000);
        assert_eq!(s.poll_interval_ms, 30_000);
        assert_eq!(s.instance, "opencode");
        assert!(!s.verbose);
        assert_eq!(s.limits.ledger_capacity, 10_000);
        assert_eq!(s.limits.error_capacity, 100);
        assert_eq!(s.limits.error_retention_secs, 3600);
        assert_eq!(s.logging.format, LogFormatSetting::Compact);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: PeriscopeSettings =
            serde_json::from_str(r#"{"instance": "laptop", "limits": {"errorCapacity": 10}}"#).unwrap();
        assert_eq!(s.instance, "laptop");
        assert_eq!(s.limits.error_capacity, 10);
        assert_eq!(s.limits.ledger_capacity, 10_000);
        assert_eq!(s.poll_interval_ms, 30_000);
    }

    #[test]
    fn rejects_non_http_url() {
        let s = PeriscopeSettings {
            opencode_url: "localhost:4096".into(),
            ..PeriscopeSettings::default()
        };
        assert!(matches!(s.validate(), Err(SettingsError::InvalidValue(_))));
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let s = PeriscopeSettings {
            poll_interval_ms: 0,
            ..PeriscopeSettings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn rejects_base_above_cap() {
        let s = PeriscopeSettings {
            reconnect: BackoffConfig {
                base_delay_ms: 10_000,
                max_delay_ms: 1_000,
            },
            ..PeriscopeSettings::default()
        };
        assert!(s.validate().is_err());
    }
}
