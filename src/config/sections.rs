//! Config sections: logging, page pool, forms, links
//!
//! Each section comes in two shapes: the effective settings used at runtime,
//! and an all-`Option` `File*` struct as parsed from the config file. The
//! `from_file()` helpers fill in defaults for whatever the file leaves out.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::page::PoolSettings;

// ─────────────────────────────────────────────────────────────────────────────
// Log Rotation
// ─────────────────────────────────────────────────────────────────────────────

/// Log file rotation strategy
#[derive(Debug, Clone, Default, PartialEq)]
pub enum LogRotation {
    /// Rotate log files hourly
    Hourly,
    /// Rotate log files daily (default)
    #[default]
    Daily,
    /// Never rotate - single log file
    Never,
}

impl LogRotation {
    /// Parse rotation string from config
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "hourly" => Self::Hourly,
            "never" => Self::Never,
            _ => Self::Daily,
        }
    }

    /// Convert to string for TOML serialization
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Never => "never",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Enable JSON file logging in addition to stdout
    pub file_enabled: bool,
    /// Directory for log files
    pub file_dir: PathBuf,
    /// Log file rotation strategy
    pub file_rotation: LogRotation,
    /// Prefix for log file names (e.g., "trellis" -> "trellis.2024-01-15")
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_enabled: false,
            file_dir: PathBuf::from("./logs"),
            file_rotation: LogRotation::Daily,
            file_prefix: "trellis".to_string(),
        }
    }
}

/// Logging settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileLogging {
    pub level: Option<String>,
    pub file_enabled: Option<bool>,
    pub file_dir: Option<String>,
    pub file_rotation: Option<String>,
    pub file_prefix: Option<String>,
}

impl LoggingConfig {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileLogging>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            level: file.level.unwrap_or(defaults.level),
            file_enabled: file.file_enabled.unwrap_or(defaults.file_enabled),
            file_dir: file
                .file_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.file_dir),
            file_rotation: file
                .file_rotation
                .map(|s| LogRotation::from_str(&s))
                .unwrap_or(defaults.file_rotation),
            file_prefix: file.file_prefix.unwrap_or(defaults.file_prefix),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Page Pool Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Page pool limits and eviction schedule
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Idle instances kept per page and locale after cleanup
    pub soft_limit: usize,
    /// Instances checked out at once per page and locale
    pub hard_limit: usize,
    /// Idle instances older than this are evicted
    pub active_window_secs: u64,
    /// How often the server runs pool cleanup
    pub cleanup_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let settings = PoolSettings::default();
        Self {
            soft_limit: settings.soft_limit,
            hard_limit: settings.hard_limit,
            active_window_secs: settings.active_window.as_secs(),
            cleanup_interval_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FilePool {
    pub soft_limit: Option<usize>,
    pub hard_limit: Option<usize>,
    pub active_window_secs: Option<u64>,
    pub cleanup_interval_secs: Option<u64>,
}

impl PoolConfig {
    pub fn from_file(file: Option<FilePool>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        let soft_limit = file.soft_limit.unwrap_or(defaults.soft_limit);
        // A hard limit below the soft limit would never let the soft limit fill
        let hard_limit = file.hard_limit.unwrap_or(defaults.hard_limit).max(soft_limit).max(1);

        Self {
            soft_limit,
            hard_limit,
            active_window_secs: file
                .active_window_secs
                .unwrap_or(defaults.active_window_secs),
            cleanup_interval_secs: file
                .cleanup_interval_secs
                .unwrap_or(defaults.cleanup_interval_secs)
                .max(1),
        }
    }

    pub fn settings(&self) -> PoolSettings {
        PoolSettings {
            soft_limit: self.soft_limit,
            hard_limit: self.hard_limit,
            active_window: Duration::from_secs(self.active_window_secs),
        }
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Forms Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Form submission settings
#[derive(Debug, Clone, PartialEq)]
pub struct FormsConfig {
    /// Fields write validation attributes for client-side script
    pub client_validation: bool,
    /// Key for signing `t:formdata`; unsigned when absent
    pub hmac_passphrase: Option<String>,
    /// Form data larger than this many bytes is compressed
    pub compress_threshold: usize,
}

impl Default for FormsConfig {
    fn default() -> Self {
        Self {
            client_validation: true,
            hmac_passphrase: None,
            compress_threshold: 512,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileForms {
    pub client_validation: Option<bool>,
    pub hmac_passphrase: Option<String>,
    pub compress_threshold: Option<usize>,
}

impl FormsConfig {
    /// `env_passphrase` overrides the file's passphrase
    pub fn from_file(file: Option<FileForms>, env_passphrase: Option<String>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            client_validation: file.client_validation.unwrap_or(defaults.client_validation),
            hmac_passphrase: env_passphrase
                .or(file.hmac_passphrase)
                .filter(|p| !p.is_empty()),
            compress_threshold: file.compress_threshold.unwrap_or(defaults.compress_threshold),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Links Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Link generation settings
#[derive(Debug, Clone, PartialEq)]
pub struct LinksConfig {
    /// Never shorten links into paths relative to the current request
    pub force_absolute_uris: bool,
    /// Page rendered for `/`
    pub index_page_name: String,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            force_absolute_uris: false,
            index_page_name: "Index".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileLinks {
    pub force_absolute_uris: Option<bool>,
    pub index_page_name: Option<String>,
}

impl LinksConfig {
    pub fn from_file(file: Option<FileLinks>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            force_absolute_uris: file
                .force_absolute_uris
                .unwrap_or(defaults.force_absolute_uris),
            index_page_name: file
                .index_page_name
                .filter(|n| !n.is_empty())
                .unwrap_or(defaults.index_page_name),
        }
    }
}
