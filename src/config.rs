//! Configuration module for dropgate.
//!
//! Configuration is read once at process start from a TOML file, then
//! overridden from the environment that the SSH daemon passes to forced
//! commands. The resulting [`Config`] is handed to the gateway and the
//! reaper; nothing below this module reads the environment.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::Deserialize;

use crate::{GatewayError, Result};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "DROPGATE_CONFIG";

/// Configuration file used when `DROPGATE_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/dropgate/config.toml";

/// Longest accepted TTL (about a century).
pub const MAX_TTL_DAYS: u32 = 36_500;

/// File storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding stored files and in-flight temporary files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Time-to-live for new uploads, in days.
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u32,
}

fn default_data_dir() -> String {
    "/data".to_string()
}

fn default_ttl_days() -> u32 {
    7
}

impl StorageConfig {
    /// TTL as a duration.
    pub fn ttl(&self) -> Duration {
        Duration::days(i64::from(self.ttl_days))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ttl_days: default_ttl_days(),
        }
    }
}

/// Cleanup reaper configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    /// Seconds to sleep between scans.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    60
}

impl CleanupConfig {
    /// Scan interval as a duration.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL (`sqlite://...` or `postgres://...`).
    #[serde(default = "default_db_url")]
    pub url: String,
    /// Maximum pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_url() -> String {
    "sqlite:///data/dropgate.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warning, info, debug, verbose).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file to append to. Empty or `stderr` logs to standard error.
    #[serde(default)]
    pub sink: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            sink: String::new(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// File storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Cleanup reaper configuration.
    #[serde(default)]
    pub cleanup: CleanupConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(GatewayError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file, falling back to defaults if it does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(GatewayError::Io(e)),
        }
    }

    /// Load the process configuration: file named by `DROPGATE_CONFIG` (or the
    /// default path), then environment overrides, then validation.
    pub fn from_process_env() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load_or_default(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| GatewayError::Config(format!("config parse error: {e}")))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Supported variables:
    /// - `DATA_DIR`, `TTL_DAYS`, `CLEAN_INTERVAL_SECONDS`
    /// - `DATABASE_URL`, or `DB_HOST`/`DB_PORT`/`DB_NAME`/`DB_USER`/`DB_PASSWORD`
    /// - `LOG_LEVEL`, `LOG_SINK`
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("DATA_DIR") {
            self.storage.data_dir = dir;
        }
        if let Some(days) = get("TTL_DAYS") {
            self.storage.ttl_days = parse_number("TTL_DAYS", &days)?;
        }
        if let Some(secs) = get("CLEAN_INTERVAL_SECONDS") {
            self.cleanup.interval_secs = parse_number("CLEAN_INTERVAL_SECONDS", &secs)?;
        }

        if let Some(url) = get("DATABASE_URL") {
            self.database.url = url;
        } else if let (Some(host), Some(name), Some(user), Some(password)) = (
            get("DB_HOST"),
            get("DB_NAME"),
            get("DB_USER"),
            get("DB_PASSWORD"),
        ) {
            let port = get("DB_PORT").unwrap_or_else(|| "5432".to_string());
            self.database.url = format!(
                "postgres://{}:{}@{host}:{port}/{name}",
                urlencoding::encode(&user),
                urlencoding::encode(&password)
            );
        }

        if let Some(level) = get("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(sink) = lookup("LOG_SINK") {
            self.logging.sink = sink.trim().to_string();
        }

        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.storage.data_dir.trim().is_empty() {
            return Err(GatewayError::Config("storage.data_dir is empty".to_string()));
        }
        if self.storage.ttl_days == 0 {
            return Err(GatewayError::Config(
                "storage.ttl_days must be at least 1".to_string(),
            ));
        }
        if self.storage.ttl_days > MAX_TTL_DAYS {
            return Err(GatewayError::Config(format!(
                "storage.ttl_days must be at most {MAX_TTL_DAYS}"
            )));
        }
        if self.cleanup.interval_secs == 0 {
            return Err(GatewayError::Config(
                "cleanup.interval_secs must be at least 1".to_string(),
            ));
        }
        if self.database.url.trim().is_empty() {
            return Err(GatewayError::Config("database.url is empty".to_string()));
        }
        Ok(())
    }

    /// Storage directory as a path.
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.data_dir)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| GatewayError::Config(format!("{key} is not a valid number: {value:?}")))
}
