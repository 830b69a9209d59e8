//! Configuration for the trellis server
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/trellis/config.toml)
//! 3. Built-in defaults (lowest priority)

use anyhow::Context;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod sections;
mod serialization;


// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (maintain public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use sections::{
    FileForms, FileLinks, FileLogging, FilePool, FormsConfig, LinksConfig, LogRotation,
    LoggingConfig, PoolConfig,
};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_LOCALE: &str = "en";

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_addr: SocketAddr,

    /// Path prefix of every application URL, e.g. `/app`; empty at the root
    pub context_path: String,

    /// Locale used when a request does not name one
    pub default_locale: String,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Page pool limits and eviction
    pub pool: PoolConfig,

    /// Form submission and client data settings
    pub forms: FormsConfig,

    /// Link generation settings
    pub links: LinksConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            context_path: String::new(),
            default_locale: DEFAULT_LOCALE.to_string(),
            logging: LoggingConfig::default(),
            pool: PoolConfig::default(),
            forms: FormsConfig::default(),
            links: LinksConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure; every value is optional
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub bind_addr: Option<String>,
    pub context_path: Option<String>,
    pub default_locale: Option<String>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,

    /// Optional [pool] section
    pub pool: Option<FilePool>,

    /// Optional [forms] section
    pub forms: Option<FileForms>,

    /// Optional [links] section
    pub links: Option<FileLinks>,
}

/// `/app/` and `app` both become `/app`; `/` becomes empty
fn normalize_context_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: ~/.config/trellis/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("trellis").join("config.toml"))
    }

    /// Create config file with defaults if it doesn't exist
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };

        if path.exists() {
            return;
        }

        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return; // Config is optional
            }
        }

        let _ = std::fs::write(&path, Self::default().to_toml());
    }

    /// Parse a config file; a missing file is an empty one
    pub(crate) fn load_file_config(path: &Path) -> anyhow::Result<FileConfig> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
            Err(e) => Err(e).with_context(|| format!("Cannot read config file {}", path.display())),
        }
    }

    /// Load configuration: env vars > file > defaults
    ///
    /// A config file that exists but does not parse is an error rather than
    /// a silent fallback to defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let file = match Self::config_path() {
            Some(path) => Self::load_file_config(&path)?,
            None => FileConfig::default(),
        };
        Self::from_sources(file, |name| std::env::var(name).ok())
    }

    /// Merge a parsed file with environment lookups
    pub(crate) fn from_sources(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        // Bind address: env > file > default
        let bind = env("TRELLIS_BIND")
            .or(file.bind_addr)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr = bind
            .parse()
            .with_context(|| format!("Invalid bind address '{}'", bind))?;

        // Context path: env > file > default (root)
        let context_path = env("TRELLIS_CONTEXT_PATH")
            .or(file.context_path)
            .map(|p| normalize_context_path(&p))
            .unwrap_or_default();

        let default_locale = file
            .default_locale
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string());

        let logging = LoggingConfig::from_file(file.logging);
        let pool = PoolConfig::from_file(file.pool);

        // HMAC passphrase: env takes precedence so secrets can stay out of the file
        let forms = FormsConfig::from_file(file.forms, env("TRELLIS_HMAC_PASSPHRASE"));

        let mut links = LinksConfig::from_file(file.links);
        if let Some(value) = env("TRELLIS_FORCE_ABSOLUTE_URIS") {
            links.force_absolute_uris = parse_flag(&value);
        }

        Ok(Self {
            bind_addr,
            context_path,
            default_locale,
            logging,
            pool,
            forms,
            links,
        })
    }
}
