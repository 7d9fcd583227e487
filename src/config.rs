//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub simulator: SimulatorConfig,

    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Simulator endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Topic bus configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Interval of the stats poll (stats event + machine events)
    #[serde(default = "default_poll_interval")]
    pub stats_interval_ms: u64,

    /// Interval of the machine-only poll
    #[serde(default = "default_poll_interval")]
    pub machine_interval_ms: u64,

    /// First segment of every machine topic
    #[serde(default = "default_topic_root")]
    pub topic_root: String,

    /// Prefix stripped from snapshot keys to get machine ids
    #[serde(default = "default_key_prefix")]
    pub machine_key_prefix: String,
}

fn default_poll_interval() -> u64 {
    30_000 // matches the simulator's publish interval
}

fn default_topic_root() -> String {
    crate::topic::DEFAULT_ROOT.to_string()
}

fn default_key_prefix() -> String {
    "Machine_".to_string()
}

impl BusConfig {
    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms.max(1))
    }

    pub fn machine_interval(&self) -> Duration {
        Duration::from_millis(self.machine_interval_ms.max(1))
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            stats_interval_ms: default_poll_interval(),
            machine_interval_ms: default_poll_interval(),
            topic_root: default_topic_root(),
            machine_key_prefix: default_key_prefix(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("brewbus").join("config.toml")),
            Some(PathBuf::from("/etc/brewbus/config.toml")),
            Some(PathBuf::from("./brewbus.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Simulator overrides
        if let Some(url) = var("BREWBUS_SIMULATOR_URL") {
            self.simulator.base_url = url;
        }
        if let Some(secs) = var("BREWBUS_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.simulator.request_timeout_secs = secs;
        }

        // Bus overrides
        if let Some(ms) = var("BREWBUS_STATS_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.bus.stats_interval_ms = ms;
        }
        if let Some(ms) = var("BREWBUS_MACHINE_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.bus.machine_interval_ms = ms;
        }
        if let Some(root) = var("BREWBUS_TOPIC_ROOT") {
            self.bus.topic_root = root;
        }

        // Logging overrides
        if let Some(level) = var("BREWBUS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("BREWBUS_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Brewbus Configuration
#
# Environment variables override these settings:
# - BREWBUS_SIMULATOR_URL
# - BREWBUS_REQUEST_TIMEOUT_SECS
# - BREWBUS_STATS_INTERVAL_MS
# - BREWBUS_MACHINE_INTERVAL_MS
# - BREWBUS_TOPIC_ROOT
# - BREWBUS_LOG_LEVEL
# - BREWBUS_LOG_FORMAT

[simulator]
# Base URL of the coffee-machine simulator
base_url = "http://localhost:8081"

# Per-request timeout in seconds
request_timeout_secs = 10

[bus]
# Stats poll interval (ms): emits simulator:stats and machine events
stats_interval_ms = 30000

# Machine poll interval (ms): emits machine events only
machine_interval_ms = 30000

# First segment of machine topics, e.g. coffeeMachine/7/temperature
topic_root = "coffeeMachine"

# Prefix stripped from snapshot keys to get machine ids
machine_key_prefix = "Machine_"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
