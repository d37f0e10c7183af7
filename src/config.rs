//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.
//! Everything is resolved once at start-up and passed down explicitly.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::classifier::{ClassifierConfig, DeviceSelection};
use crate::stats::MAX_ROLLUP_INTERVAL_SECS;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub rollup: RollupConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Record store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// `sqlite://<path>`, a bare path, or `memory`
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

fn default_database_url() -> String {
    dirs::data_local_dir()
        .map(|p| format!("sqlite://{}", p.join("sentiscope").join("sentiscope.db").display()))
        .unwrap_or_else(|| "sqlite://./sentiscope.db".to_string())
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,

    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_text_length() -> usize {
    5000
}

fn default_max_batch_size() -> usize {
    100
}

fn default_max_page_size() -> u32 {
    100
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            max_text_length: default_max_text_length(),
            max_batch_size: default_max_batch_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

/// Background rollup configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RollupConfig {
    #[serde(default = "default_rollup_enabled")]
    pub enabled: bool,

    #[serde(default = "default_rollup_interval")]
    pub interval_secs: u64,
}

fn default_rollup_enabled() -> bool {
    true
}

fn default_rollup_interval() -> u64 {
    3600
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            enabled: default_rollup_enabled(),
            interval_secs: default_rollup_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` or `json`
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

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Result<Self, ConfigError> {
        for path in default_config_paths() {
            if path.exists() {
                tracing::info!("Loading config from {:?}", path);
                return Self::load_with_env(&path);
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply `SENTISCOPE_*` overrides using `lookup` to read variables
    fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Classifier overrides
        if let Some(model) = lookup("SENTISCOPE_MODEL_NAME") {
            self.classifier.model_name = model;
        }
        if let Some(dir) = lookup("SENTISCOPE_CACHE_DIR") {
            self.classifier.cache_dir = PathBuf::from(dir);
        }
        if let Some(device) = lookup("SENTISCOPE_DEVICE") {
            self.classifier.device = device
                .parse::<DeviceSelection>()
                .map_err(|e| ConfigError::Env {
                    key: "SENTISCOPE_DEVICE".to_string(),
                    error: e,
                })?;
        }
        if let Some(size) = lookup("SENTISCOPE_BATCH_SIZE") {
            self.classifier.batch_size = parse_env("SENTISCOPE_BATCH_SIZE", &size)?;
        }

        // Storage overrides
        if let Some(url) = lookup("SENTISCOPE_DATABASE_URL") {
            self.storage.database_url = url;
        }

        // API overrides
        if let Some(host) = lookup("SENTISCOPE_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("SENTISCOPE_API_PORT") {
            self.api.port = parse_env("SENTISCOPE_API_PORT", &port)?;
        }
        if let Some(origins) = lookup("SENTISCOPE_CORS_ORIGINS") {
            self.api.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }

        // Rollup overrides
        if let Some(enabled) = lookup("SENTISCOPE_ROLLUP_ENABLED") {
            self.rollup.enabled = parse_env("SENTISCOPE_ROLLUP_ENABLED", &enabled)?;
        }
        if let Some(secs) = lookup("SENTISCOPE_ROLLUP_INTERVAL_SECS") {
            self.rollup.interval_secs = parse_env("SENTISCOPE_ROLLUP_INTERVAL_SECS", &secs)?;
        }

        // Logging overrides
        if let Some(level) = lookup("SENTISCOPE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("SENTISCOPE_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Reject values that would only fail later at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.classifier.batch_size == 0 {
            return invalid("classifier.batch_size must be at least 1");
        }
        if self.storage.database_url.trim().is_empty() {
            return invalid("storage.database_url cannot be empty");
        }
        if self.api.max_text_length == 0 {
            return invalid("api.max_text_length must be at least 1");
        }
        if self.api.max_batch_size == 0 {
            return invalid("api.max_batch_size must be at least 1");
        }
        if self.api.max_page_size == 0 || self.api.max_page_size > 100 {
            return invalid("api.max_page_size must be between 1 and 100");
        }
        if self.rollup.interval_secs == 0 || self.rollup.interval_secs > MAX_ROLLUP_INTERVAL_SECS {
            return Err(ConfigError::Invalid(format!(
                "rollup.interval_secs must be between 1 and {}",
                MAX_ROLLUP_INTERVAL_SECS
            )));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return invalid("logging.format must be \"pretty\" or \"json\"");
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        key: key.to_string(),
        error: e.to_string(),
    })
}

/// Config file locations, most specific first
pub fn default_config_paths() -> Vec<PathBuf> {
    [
        Some(PathBuf::from("./sentiscope.toml")),
        dirs::config_dir().map(|p| p.join("sentiscope").join("config.toml")),
        Some(PathBuf::from("/etc/sentiscope/config.toml")),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid value for {key}: {error}")]
    Env { key: String, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Sentiscope Configuration
#
# Environment variables override these settings:
# - SENTISCOPE_MODEL_NAME, SENTISCOPE_CACHE_DIR, SENTISCOPE_DEVICE, SENTISCOPE_BATCH_SIZE
# - SENTISCOPE_DATABASE_URL
# - SENTISCOPE_API_HOST, SENTISCOPE_API_PORT, SENTISCOPE_CORS_ORIGINS
# - SENTISCOPE_ROLLUP_ENABLED, SENTISCOPE_ROLLUP_INTERVAL_SECS
# - SENTISCOPE_LOG_LEVEL, SENTISCOPE_LOG_FORMAT

[classifier]
# Model identifier recorded with every analysis
model_name = "sentiscope-lexicon-v1"

# Where model resources live; an optional lexicon.toml here extends the word list
cache_dir = "./models"

# Device: auto, cpu or accelerator
device = "auto"

# Texts per classifier call in batch requests
batch_size = 8

[storage]
# sqlite://<path>, a bare file path, or "memory"
database_url = "sqlite://./sentiscope.db"

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 8000

# Allowed CORS origins (empty allows any)
cors_origins = []

# Request limits
max_text_length = 5000
max_batch_size = 100
max_page_size = 100

[rollup]
# Re-roll yesterday and today in the background
enabled = true

# Seconds between runs
interval_secs = 3600

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
