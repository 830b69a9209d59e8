//! Config serialization to TOML
//!
//! Single source of truth for config file format.

use super::Config;

impl Config {
    /// Passphrase line, commented out when none is configured
    fn passphrase_to_toml(&self) -> String {
        match &self.forms.hmac_passphrase {
            Some(passphrase) => format!("hmac_passphrase = {:?}\n", passphrase),
            None => "# hmac_passphrase = \"change-me\"  # or set TRELLIS_HMAC_PASSPHRASE\n".to_string(),
        }
    }

    /// Serialize config to TOML string (single source of truth for format)
    pub fn to_toml(&self) -> String {
        format!(
            r#"# trellis configuration

# Server bind address
bind_addr = "{bind}"

# Path prefix of every application URL, e.g. "/app" (empty = served at the root)
context_path = {context_path:?}

# Locale for requests that do not name one
default_locale = {locale:?}

# Logging configuration (RUST_LOG env var overrides)
[logging]
level = {log_level:?}
# JSON file logging (in addition to stdout)
file_enabled = {log_file_enabled}
file_dir = {log_file_dir:?}
file_rotation = "{log_file_rotation}"  # hourly, daily, never
file_prefix = {log_file_prefix:?}

# ─────────────────────────────────────────────────────────────────────────────
# PAGE POOL
# ─────────────────────────────────────────────────────────────────────────────
# Every request checks out its own page instances. Idle instances beyond
# soft_limit, or unused for active_window_secs, are evicted on cleanup.
[pool]
soft_limit = {soft_limit}
hard_limit = {hard_limit}
active_window_secs = {active_window}
cleanup_interval_secs = {cleanup_interval}

# ─────────────────────────────────────────────────────────────────────────────
# FORMS
# ─────────────────────────────────────────────────────────────────────────────
# Forms send a log of actions to the client in the t:formdata field.
# Without a passphrase that data is unsigned and a client could forge it.
[forms]
client_validation = {client_validation}
compress_threshold = {compress_threshold}
{passphrase}
[links]
index_page_name = {index_page:?}
force_absolute_uris = {force_absolute}
"#,
            bind = self.bind_addr,
            context_path = self.context_path,
            locale = self.default_locale,
            log_level = self.logging.level,
            log_file_enabled = self.logging.file_enabled,
            log_file_dir = self.logging.file_dir.display().to_string(),
            log_file_rotation = self.logging.file_rotation.as_str(),
            log_file_prefix = self.logging.file_prefix,
            soft_limit = self.pool.soft_limit,
            hard_limit = self.pool.hard_limit,
            active_window = self.pool.active_window_secs,
            cleanup_interval = self.pool.cleanup_interval_secs,
            client_validation = self.forms.client_validation,
            compress_threshold = self.forms.compress_threshold,
            passphrase = self.passphrase_to_toml(),
            index_page = self.links.index_page_name,
            force_absolute = self.links.force_absolute_uris,
        )
    }
}
