//! Configuration module for signal-fusion
//!
//! [`PipelineConfig`] carries every option the runtime consumes: buffer
//! sizing, startup countdown, close timeout, watchdog intervals, sensor
//! backoff, network synchronisation and logging. Every field has a default,
//! so a config file only needs the keys it changes.
//!
//! # Files
//!
//! Config files are TOML (`.toml`) or JSON (`.json`), chosen by extension.
//!
//! # Example
//!
//! ```ignore
//! use signal_fusion::config::PipelineConfig;
//!
//! let mut config = PipelineConfig::load("pipeline.toml")?;
//! config.countdown_seconds = 3;
//! config.save("pipeline.toml")?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{FusionError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default capacity of each time buffer in seconds
pub const DEFAULT_BUFFER_SECONDS: f64 = 2.0;

/// Default per-component close timeout in milliseconds
pub const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 5000;

/// Default number of events retained per channel
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Complete runtime configuration of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Capacity of every time buffer, in seconds of its stream
    pub buffer_seconds: f64,

    /// Seconds to count down between spawning threads and going live
    pub countdown_seconds: u32,

    /// How long `stop()` waits for each component before detaching it
    pub close_timeout_ms: u64,

    /// How long a channel waits for its sensor to connect
    pub sensor_connect_timeout_ms: u64,

    /// Reaction to fatal component errors
    pub error_policy: ErrorPolicy,

    /// Maximum events retained per event channel
    pub event_channel_capacity: usize,

    pub watchdog: WatchdogSettings,

    pub sensor: SensorSettings,

    pub sync: SyncSettings,

    pub logging: LoggingSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_seconds: DEFAULT_BUFFER_SECONDS,
            countdown_seconds: 0,
            close_timeout_ms: DEFAULT_CLOSE_TIMEOUT_MS,
            sensor_connect_timeout_ms: 30_000,
            error_policy: ErrorPolicy::default(),
            event_channel_capacity: DEFAULT_EVENT_CAPACITY,
            watchdog: WatchdogSettings::default(),
            sensor: SensorSettings::default(),
            sync: SyncSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a config file, TOML or JSON by extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FusionError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config: Self = if is_json(path) {
            serde_json::from_str(&content).map_err(|e| {
                FusionError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        } else {
            toml::from_str(&content).map_err(|e| {
                FusionError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        };

        config.validate()?;
        Ok(config)
    }

    /// Load a config file, returning defaults if any error occurs
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Save the config, JSON for `.json` paths and TOML otherwise
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    FusionError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = if is_json(path) {
            serde_json::to_string_pretty(self)
                .map_err(|e| FusionError::Serialization(e.to_string()))?
        } else {
            toml::to_string_pretty(self).map_err(|e| FusionError::Serialization(e.to_string()))?
        };

        std::fs::write(path, content).map_err(|e| {
            FusionError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Reject settings the runtime cannot operate with
    pub fn validate(&self) -> Result<()> {
        if !(self.buffer_seconds > 0.0) {
            return Err(FusionError::Config(
                "buffer_seconds must be positive".to_string(),
            ));
        }
        if self.close_timeout_ms == 0 {
            return Err(FusionError::Config(
                "close_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.watchdog.watch_interval_ms == 0 {
            return Err(FusionError::Config(
                "watchdog.watch_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(FusionError::Config(
                "event_channel_capacity must be non-zero".to_string(),
            ));
        }
        if !(self.sensor.retry_factor >= 1.0) {
            return Err(FusionError::Config(
                "sensor.retry_factor must be at least 1.0".to_string(),
            ));
        }
        if self.sync.mode == SyncMode::Continuous
            && (self.sync.interval_ms == 0 || self.sync.requests_per_interval == 0)
        {
            return Err(FusionError::Config(
                "continuous sync needs a non-zero interval and request count".to_string(),
            ));
        }
        Ok(())
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn sensor_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_connect_timeout_ms)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig {
            buffer_seconds: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.buffer_seconds = 1.0;
        config.sync.mode = SyncMode::Continuous;
        config.sync.requests_per_interval = 0;
        assert!(config.validate().is_err());

        config.sync.requests_per_interval = 3;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            buffer_seconds = 5.0

            [sync]
            mode = "Continuous"
            role = "Slave"
            "#,
        )
        .unwrap();
        assert_eq!(config.buffer_seconds, 5.0);
        assert_eq!(config.sync.role, SyncRole::Slave);
        assert_eq!(config.sync.clock_port, 55101);
        assert_eq!(config.close_timeout_ms, DEFAULT_CLOSE_TIMEOUT_MS);
    }

    #[test]
    fn test_json_serialization() {
        let config = PipelineConfig {
            countdown_seconds: 3,
            error_policy: ErrorPolicy::StopPipeline,
            ..Default::default()
        };
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
