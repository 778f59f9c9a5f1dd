//! Probe configuration file

use super::ConfigError;
use crate::core::protocol::DeviceAddress;
use crate::core::session::ExchangeTiming;
use crate::core::transport::SerialConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Name of the configuration file inside the config directory
pub const CONFIG_FILE: &str = "probe.toml";

/// Probe configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Serial line settings
    pub serial: SerialConfig,
    /// Exchange timing
    pub timing: TimingConfig,
    /// Known probe
    pub probe: ProbeSettings,
    /// Log output
    pub logging: LoggingConfig,
}

/// Exchange timing in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay between releasing the bus and reading
    pub settle_ms: u64,
    /// Read timeout
    pub read_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        let timing = ExchangeTiming::default();
        Self {
            settle_ms: u64::try_from(timing.settle.as_millis()).unwrap_or(50),
            read_timeout_ms: u64::try_from(timing.read_timeout.as_millis()).unwrap_or(1000),
        }
    }
}

impl From<TimingConfig> for ExchangeTiming {
    fn from(config: TimingConfig) -> Self {
        Self {
            settle: Duration::from_millis(config.settle_ms),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
        }
    }
}

/// Known probe settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Address of the probe, if already assigned
    pub address: Option<u8>,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (e.g. "info", "sywa_probe=debug")
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl ProbeConfig {
    /// Load config from the default location, falling back to defaults when
    /// the file does not exist
    pub fn load() -> Result<Self, ConfigError> {
        let path = super::config_path().ok_or(ConfigError::NoConfigDir)?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load config from a file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = super::config_path().ok_or(ConfigError::NoConfigDir)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        self.save_to(&path)
    }

    /// Save config to a file
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.serial
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.probe.address == Some(0) {
            return Err(ConfigError::Invalid(
                "probe address 0 is the broadcast address".into(),
            ));
        }
        if self.timing.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid("read timeout must be non-zero".into()));
        }
        Ok(())
    }

    /// Configured probe address, if any
    pub fn probe_address(&self) -> Option<DeviceAddress> {
        self.probe.address.and_then(DeviceAddress::unicast)
    }

    /// Exchange timing
    pub fn timing(&self) -> ExchangeTiming {
        self.timing.into()
    }
}
