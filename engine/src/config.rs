//! Configuration management for the Vigil monitoring engine
//!
//! This module handles loading, parsing, and validating configuration
//! from TOML files and environment variables, with sensible defaults
//! for every field.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::SourceClass;

/// Main configuration structure for the monitoring engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rolling history configuration
    pub history: HistoryConfig,

    /// Sampling configuration
    pub sampling: SamplingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Rolling history and alert log bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum retained readings per subject
    pub per_subject_cap: usize,

    /// Maximum retained alerts in the global log
    pub alert_cap: usize,

    /// Number of readings returned as the trend window in a status snapshot
    pub trend_window: usize,

    /// Number of unresolved alerts returned in a status snapshot
    pub recent_alerts: usize,
}

/// Sampling loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Per-class sampling cadence table
    pub cadence: CadenceConfig,

    /// Wait after a failed poll before retrying, in milliseconds
    pub failure_backoff_ms: u64,

    /// Bounded wait for a sampling task to exit on stop, in milliseconds
    pub stop_wait_ms: u64,
}

/// Sampling interval per source class, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub pulse_oximeter_ms: u64,
    pub blood_pressure_ms: u64,
    pub temperature_ms: u64,
    pub respiratory_ms: u64,
    pub glucose_ms: u64,
}

/// Logging configuration for the service binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter
    pub level: String,

    /// Enable console logging
    pub console: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history: HistoryConfig::default(),
            sampling: SamplingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            per_subject_cap: 1000,
            alert_cap: 500,
            trend_window: 20,
            recent_alerts: 5,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            cadence: CadenceConfig::default(),
            failure_backoff_ms: 5000, // 5 seconds
            stop_wait_ms: 5000,       // 5 seconds
        }
    }
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            pulse_oximeter_ms: 2_000,   // every 2 seconds
            blood_pressure_ms: 300_000, // every 5 minutes
            temperature_ms: 60_000,     // every minute
            respiratory_ms: 30_000,
            glucose_ms: 30_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
        }
    }
}

impl CadenceConfig {
    /// Sampling interval for a source class
    pub fn interval(&self, class: SourceClass) -> Duration {
        let millis = match class {
            SourceClass::PulseOximeter => self.pulse_oximeter_ms,
            SourceClass::BloodPressure => self.blood_pressure_ms,
            SourceClass::Temperature => self.temperature_ms,
            SourceClass::Respiratory => self.respiratory_ms,
            SourceClass::Glucose => self.glucose_ms,
        };
        Duration::from_millis(millis)
    }

    fn validate(&self) -> ConfigResult<()> {
        for class in SourceClass::ALL {
            if self.interval(class).is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: format!("sampling.cadence.{}_ms", class),
                    value: "0".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl SamplingConfig {
    pub fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }

    pub fn stop_wait(&self) -> Duration {
        Duration::from_millis(self.stop_wait_ms)
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.to_string_lossy().to_string(),
        })?;

        let config: EngineConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError { reason: e.to_string() })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables over defaults
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = EngineConfig::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with fallback order: defaults -> file -> env
    pub fn load_with_fallback<P: AsRef<Path>>(config_path: Option<P>) -> ConfigResult<Self> {
        let mut config = match config_path {
            Some(path) if path.as_ref().exists() => EngineConfig::from_file(path)?,
            _ => EngineConfig::default(),
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `VIGIL_*` environment variables onto this configuration
    fn apply_env(&mut self) -> ConfigResult<()> {
        if let Ok(cap) = std::env::var("VIGIL_HISTORY_CAP") {
            self.history.per_subject_cap = parse_env("VIGIL_HISTORY_CAP", &cap)?;
        }

        if let Ok(cap) = std::env::var("VIGIL_ALERT_CAP") {
            self.history.alert_cap = parse_env("VIGIL_ALERT_CAP", &cap)?;
        }

        if let Ok(ms) = std::env::var("VIGIL_FAILURE_BACKOFF_MS") {
            self.sampling.failure_backoff_ms = parse_env("VIGIL_FAILURE_BACKOFF_MS", &ms)?;
        }

        if let Ok(ms) = std::env::var("VIGIL_STOP_WAIT_MS") {
            self.sampling.stop_wait_ms = parse_env("VIGIL_STOP_WAIT_MS", &ms)?;
        }

        if let Ok(level) = std::env::var("VIGIL_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.history.per_subject_cap == 0 {
            return Err(ConfigError::InvalidValue {
                field: "history.per_subject_cap".to_string(),
                value: "0".to_string(),
            });
        }

        if self.history.alert_cap == 0 {
            return Err(ConfigError::InvalidValue {
                field: "history.alert_cap".to_string(),
                value: "0".to_string(),
            });
        }

        if self.history.trend_window > self.history.per_subject_cap {
            return Err(ConfigError::ValidationFailed {
                reason: format!(
                    "history.trend_window ({}) exceeds history.per_subject_cap ({})",
                    self.history.trend_window, self.history.per_subject_cap
                ),
            });
        }

        self.sampling.cadence.validate()?;

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, value: &str) -> ConfigResult<T> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    })
}
