//! Configuration for the failure-handling core
//!
//! Plain serde-backed settings with filesystem persistence. The host
//! application loads this at startup and hands the relevant sections to
//! `LogCore`, `DiagnosticsRegistry`, and `CrashReporter`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorSeverity;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error while reading or writing the config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed config file
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Structurally valid but unusable values
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Logging sink and rotation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// Minimum severity recorded at all
    pub level: ErrorSeverity,

    /// Write records to the rotating log file
    pub file_enabled: bool,

    /// Mirror records to stderr
    pub console_enabled: bool,

    /// Active log file path
    pub file_path: PathBuf,

    /// Rotate when the active file reaches this many bytes
    pub rotation_threshold: u64,

    /// Rotated files retained beyond the active one
    pub backup_count: usize,

    /// In-memory ring buffer capacity for the log viewer
    pub buffer_capacity: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: ErrorSeverity::Debug,
            file_enabled: true,
            console_enabled: false,
            file_path: data_dir().join("logs").join("voxelscope.log"),
            rotation_threshold: 10 * 1024 * 1024,
            backup_count: 5,
            buffer_capacity: 1000,
        }
    }
}

/// Device diagnostics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsSettings {
    /// Per-test execution deadline; a test still running past it is
    /// recorded as failed ("timed out")
    pub test_timeout: Duration,

    /// Connection/diagnostic history ring capacity per device type
    pub history_capacity: usize,
}

impl Default for DiagnosticsSettings {
    fn default() -> Self {
        Self {
            test_timeout: Duration::from_secs(5),
            history_capacity: 200,
        }
    }
}

/// Crash report persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSettings {
    /// Directory crash reports are written to
    pub directory: PathBuf,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            directory: data_dir().join("reports"),
        }
    }
}

/// Top-level configuration for the failure-handling core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub logging: LogSettings,
    pub diagnostics: DiagnosticsSettings,
    pub reports: ReportSettings,
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file, creating parent directories
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }

    /// Check that the values are usable before wiring them into the core
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.logging.rotation_threshold == 0 {
            return Err(ConfigError::Invalid(
                "rotation_threshold must be non-zero".to_string(),
            ));
        }
        if self.logging.buffer_capacity == 0 {
            return Err(ConfigError::Invalid(
                "buffer_capacity must be non-zero".to_string(),
            ));
        }
        if self.diagnostics.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "history_capacity must be non-zero".to_string(),
            ));
        }
        if self.diagnostics.test_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "test_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default configuration file location
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .map(|dir| dir.join("voxelscope").join("diagnostics.json"))
        .unwrap_or_else(|| PathBuf::from("diagnostics.json"))
}

/// Per-user data directory for logs and reports
fn data_dir() -> PathBuf {
    dirs_next::data_local_dir()
        .map(|dir| dir.join("voxelscope"))
        .unwrap_or_else(|| PathBuf::from("."))
}
