//! Configuration module
//!
//! Scan settings stored as TOML in the platform configuration directory

mod settings;

pub use settings::{ScanConfig, TimingConfig};

use directories::ProjectDirs;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration file name
pub const CONFIG_FILE: &str = "serialprobe.toml";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid TOML for this schema
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Settings could not be rendered as TOML
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Settings are well-formed but unusable
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// No home directory to look in
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "serialprobe", "serialprobe")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default configuration file path
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    config_dir()
        .map(|d| d.join(CONFIG_FILE))
        .ok_or(ConfigError::NoConfigDir)
}
