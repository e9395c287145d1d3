//! Crate settings for the control plane.
//!
//! Loading, parsing and validating the TOML settings file that tunes the
//! query layer and notification plumbing. Tunnel configurations themselves
//! live in the config store, not here.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Error reading the settings file
    #[error("Failed to read settings file: {0}")]
    Io(#[from] io::Error),

    /// Error parsing TOML
    #[error("Failed to parse TOML settings: {0}")]
    Toml(#[from] toml::de::Error),

    /// Error serializing settings to TOML
    #[error("Failed to serialize settings to TOML: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Invalid settings value
    #[error("Invalid settings value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Settings file not found
    #[error("Settings file not found at {0}")]
    FileNotFound(PathBuf),
}

/// Query-layer settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuerySettings {
    /// Rows per page for the in-memory mapping store (default: 30)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Whether substring filters ignore case (default: true)
    #[serde(default = "default_true")]
    pub case_insensitive_filter: bool,
}

/// Notification-stream settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifySettings {
    /// Buffer size of the change-notification channels (default: 64)
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_page_size() -> usize {
    30
}

fn default_true() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for QuerySettings {
    fn default() -> Self {
        QuerySettings {
            page_size: default_page_size(),
            case_insensitive_filter: default_true(),
        }
    }
}

impl Default for NotifySettings {
    fn default() -> Self {
        NotifySettings {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Top-level settings for the control plane.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Log level: trace, debug, info, warn, error (default: "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Query-layer settings
    #[serde(default)]
    pub query: QuerySettings,

    /// Notification-stream settings
    #[serde(default)]
    pub notify: NotifySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            log_level: default_log_level(),
            query: QuerySettings::default(),
            notify: NotifySettings::default(),
        }
    }
}

impl Settings {
    /// Create default settings.
    pub fn new() -> Self {
        Settings::default()
    }

    /// Load settings from a TOML file and validate them.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse settings from a TOML string and validate them.
    pub fn from_str(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SettingsError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.query.page_size == 0 {
            return Err(SettingsError::InvalidValue {
                key: "query.page_size".to_string(),
                message: "page size must be greater than zero".to_string(),
            });
        }

        if self.notify.channel_capacity == 0 {
            return Err(SettingsError::InvalidValue {
                key: "notify.channel_capacity".to_string(),
                message: "channel capacity must be greater than zero".to_string(),
            });
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(SettingsError::InvalidValue {
                key: "log_level".to_string(),
                message: format!("unknown log level: {other}"),
            }),
        }
    }
}
