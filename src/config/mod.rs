//! Configuration module
//!
//! Handles the probe configuration file

mod settings;

pub use settings::{LogFormat, LoggingConfig, ProbeConfig, ProbeSettings, TimingConfig, CONFIG_FILE};

use directories::ProjectDirs;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid TOML for this schema
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be serialized
    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// No home directory to derive a config location from
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "sywa", "sywa-probe").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Path of the default configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILE))
}
