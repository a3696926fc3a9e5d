//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/trackline/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/trackline/` (~/.config/trackline/)
//! - Data: `$XDG_DATA_HOME/trackline/` (~/.local/share/trackline/)
//! - State/Logs: `$XDG_STATE_HOME/trackline/` (~/.local/state/trackline/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Delivery pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Mirror log output to stderr
    #[serde(default)]
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            verbose: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Delivery pipeline configuration
///
/// These are the arguments of [`Pipeline::initialize`](crate::Pipeline::initialize).
/// `tenant` and `base_url` have no usable default; [`PipelineConfig::validate`]
/// rejects a config without them.
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Tenant identifier attached to every envelope
    pub tenant: Option<String>,

    /// Delivery endpoint base URL (e.g., `https://telemetry.example.com`)
    pub base_url: Option<String>,

    /// Platform tag recorded on every event
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Host application version recorded on every event
    #[serde(default = "default_app_version")]
    pub app_version: String,

    /// Queue events and deliver them on a fixed interval instead of sending each one
    #[serde(default = "default_auto_batching")]
    pub auto_batching: bool,

    /// Seconds between scheduled flushes in auto-batching mode
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Optional bearer token sent with every request
    pub api_key: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tenant: None,
            base_url: None,
            platform: default_platform(),
            app_version: default_app_version(),
            auto_batching: default_auto_batching(),
            flush_interval_secs: default_flush_interval(),
            request_timeout_secs: default_request_timeout(),
            api_key: None,
        }
    }
}

fn default_platform() -> String {
    std::env::consts::OS.to_string()
}

fn default_app_version() -> String {
    "unknown".to_string()
}

fn default_auto_batching() -> bool {
    true
}

fn default_flush_interval() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

/// Longest accepted flush interval (one day)
pub const MAX_FLUSH_INTERVAL_SECS: u64 = 24 * 60 * 60;

impl PipelineConfig {
    /// Build a config for the given tenant and base URL with default settings
    pub fn new(tenant: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            tenant: Some(tenant.into()),
            base_url: Some(base_url.into()),
            ..Default::default()
        }
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        match self.tenant.as_deref() {
            Some(tenant) if !tenant.trim().is_empty() => {}
            _ => {
                return Err(Error::Config("pipeline.tenant is required".to_string()));
            }
        }

        let base_url = self
            .base_url
            .as_deref()
            .ok_or_else(|| Error::Config("pipeline.base_url is required".to_string()))?;
        let url = reqwest::Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid pipeline.base_url: {}", e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::Config(format!(
                "pipeline.base_url must be http or https, got {}",
                url.scheme()
            )));
        }

        if self.flush_interval_secs == 0 {
            return Err(Error::Config(
                "pipeline.flush_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.flush_interval_secs > MAX_FLUSH_INTERVAL_SECS {
            return Err(Error::Config(format!(
                "pipeline.flush_interval_secs must be at most {}",
                MAX_FLUSH_INTERVAL_SECS
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "pipeline.request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Base URL with trailing slashes removed
    pub fn trimmed_base_url(&self) -> Option<&str> {
        self.base_url.as_deref().map(|url| url.trim_end_matches('/'))
    }

    /// Get the configured flush interval
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// Get the configured request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/trackline/config.toml` (~/.config/trackline/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("trackline").join("config.toml")
    }

    /// Returns the data directory path (for the install identity)
    ///
    /// `$XDG_DATA_HOME/trackline/` (~/.local/share/trackline/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("trackline")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/trackline/` (~/.local/state/trackline/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("trackline")
    }

    /// Returns the persistent install identity file path
    pub fn identity_path() -> PathBuf {
        Self::data_dir().join("identity")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("trackline.log")
    }
}
