//! Configuration settings for the bd daemon.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::DaemonError;
use crate::federation::PEERS_FILE_NAME;

/// Name of the keyring marker file inside the database directory.
pub const KEYRING_FILE_NAME: &str = ".keyring";

/// Main configuration structure for the daemon.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub federation: FederationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Socket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SocketConfig {
    /// Path to the Unix socket file. The auth token and secret live beside it.
    #[serde(default = "default_socket_path")]
    pub path: PathBuf,
    /// Socket file permissions (e.g., "0600").
    #[serde(default = "default_socket_permissions")]
    pub permissions: String,
}

/// Security configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// UIDs allowed to connect. Empty means the daemon's own UID only.
    #[serde(default)]
    pub allowed_peer_uids: Vec<u32>,
    /// Maximum requests per client per window.
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: usize,
    /// Rate limit window in seconds.
    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window_seconds: u64,
    /// How often idle clients are evicted, and how long they must be idle.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

/// Federation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// Whether the federation operations are served.
    #[serde(default = "default_federation_enabled")]
    pub enabled: bool,
    /// Database directory. Keys are derived from this path.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Keyring marker file; defaults to `.keyring` inside `db_path`.
    #[serde(default)]
    pub keyring_path: Option<PathBuf>,
    /// Peer document; defaults to `federation_peers.json` inside `db_path`.
    #[serde(default)]
    pub peers_path: Option<PathBuf>,
    /// Sync tool executable.
    #[serde(default = "default_dolt_binary")]
    pub dolt_binary: String,
    /// Branch pushed and pulled.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Timeout for one push or pull, in seconds.
    #[serde(default = "default_sync_timeout")]
    pub sync_timeout_seconds: u64,
}

impl SecurityConfig {
    /// UIDs admitted by the listener: the configured list, or the daemon's
    /// own UID when none is configured.
    pub fn effective_peer_uids(&self) -> Vec<u32> {
        if self.allowed_peer_uids.is_empty() {
            vec![nix::unistd::getuid().as_raw()]
        } else {
            self.allowed_peer_uids.clone()
        }
    }
}

impl FederationConfig {
    /// Effective keyring marker path.
    pub fn keyring_path(&self) -> PathBuf {
        self.keyring_path
            .clone()
            .unwrap_or_else(|| self.db_path.join(KEYRING_FILE_NAME))
    }

    /// Effective peer document path.
    pub fn peers_path(&self) -> PathBuf {
        self.peers_path
            .clone()
            .unwrap_or_else(|| self.db_path.join(PEERS_FILE_NAME))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Limits configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Socket read/write timeout in seconds.
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout_seconds: u64,
    /// Maximum concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// How long shutdown waits for connections to drain, in seconds.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_seconds: u64,
}

// Default value functions
fn default_socket_path() -> PathBuf {
    PathBuf::from(".beads/bd.sock")
}

fn default_socket_permissions() -> String {
    "0600".to_string()
}

fn default_rate_limit_requests() -> usize {
    100
}

fn default_rate_limit_window() -> u64 {
    60
}

fn default_cleanup_interval() -> u64 {
    300
}

fn default_federation_enabled() -> bool {
    true
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".beads/dolt")
}

fn default_dolt_binary() -> String {
    "dolt".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_sync_timeout() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_socket_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    100
}

fn default_drain_timeout() -> u64 {
    30
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            path: default_socket_path(),
            permissions: default_socket_permissions(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_peer_uids: Vec::new(),
            rate_limit_requests: default_rate_limit_requests(),
            rate_limit_window_seconds: default_rate_limit_window(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            enabled: default_federation_enabled(),
            db_path: default_db_path(),
            keyring_path: None,
            peers_path: None,
            dolt_binary: default_dolt_binary(),
            branch: default_branch(),
            sync_timeout_seconds: default_sync_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            socket_timeout_seconds: default_socket_timeout(),
            max_connections: default_max_connections(),
            drain_timeout_seconds: default_drain_timeout(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DaemonError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| DaemonError::Config {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        Self::from_toml(&content).map_err(|e| match e {
            DaemonError::Config { message } => DaemonError::Config {
                message: format!("{} ({})", message, path.display()),
            },
            other => other,
        })
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, DaemonError> {
        let settings: Settings = toml::from_str(content).map_err(|e| DaemonError::Config {
            message: format!("Failed to parse config: {}", e),
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), DaemonError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(config_error(format!(
                "Invalid log level '{}'. Valid levels: {:?}",
                self.logging.level, valid_levels
            )));
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(config_error(format!(
                "Invalid log format '{}'. Valid formats: {:?}",
                self.logging.format, valid_formats
            )));
        }

        if self.socket.permissions.is_empty()
            || !self.socket.permissions.chars().all(|c| ('0'..='7').contains(&c))
        {
            return Err(config_error(format!(
                "Invalid socket permissions '{}'. Must be octal (e.g., '0600')",
                self.socket.permissions
            )));
        }

        if self.security.rate_limit_requests == 0 {
            return Err(config_error("rate_limit_requests must be at least 1"));
        }
        if self.security.rate_limit_window_seconds == 0 {
            return Err(config_error("rate_limit_window_seconds must be at least 1"));
        }
        if self.security.cleanup_interval_seconds == 0 {
            return Err(config_error("cleanup_interval_seconds must be at least 1"));
        }

        if self.limits.max_connections == 0 {
            return Err(config_error("max_connections must be at least 1"));
        }
        if self.limits.socket_timeout_seconds == 0 {
            return Err(config_error("socket_timeout_seconds must be at least 1"));
        }

        if self.federation.enabled {
            if self.federation.dolt_binary.trim().is_empty() {
                return Err(config_error("federation.dolt_binary cannot be empty"));
            }
            if self.federation.branch.trim().is_empty() || self.federation.branch.starts_with('-') {
                return Err(config_error(format!(
                    "Invalid federation branch '{}'",
                    self.federation.branch
                )));
            }
            if self.federation.sync_timeout_seconds == 0 {
                return Err(config_error("federation.sync_timeout_seconds must be at least 1"));
            }
        }

        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> DaemonError {
    DaemonError::Config {
        message: message.into(),
    }
}
