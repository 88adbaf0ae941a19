//! Server configuration loading from file and environment variables.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use leadline_qualify::ModelExtractorConfig;
use leadline_store::DbRuntimeSettings;
use leadline_voice::RealtimeConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::calendar::CalendarConfig;
use crate::evaluation::EvaluationConfig;
use crate::scripts::ScriptsConfig;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-call bridge tuning.
    #[serde(default)]
    pub call: CallConfig,

    /// Realtime AI session.
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Model-assisted slot extraction.
    #[serde(default)]
    pub extractor: ModelExtractorConfig,

    #[serde(default)]
    pub calendar: CalendarConfig,

    #[serde(default)]
    pub evaluation: EvaluationConfig,

    /// Conversation scripts by call type.
    #[serde(default)]
    pub scripts: ScriptsConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

impl DatabaseConfig {
    pub fn runtime_settings(&self) -> DbRuntimeSettings {
        DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "leadline_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallConfig {
    /// How long to wait for the provider's `start` message.
    #[serde(default = "default_context_timeout_ms")]
    pub context_timeout_ms: u64,

    /// Bound of each call's inbound event queue.
    #[serde(default = "default_inbound_queue_capacity")]
    pub inbound_queue_capacity: usize,
}

impl CallConfig {
    pub fn context_timeout(&self) -> Duration {
        Duration::from_millis(self.context_timeout_ms)
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "leadline.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_context_timeout_ms() -> u64 {
    2_000
}

fn default_inbound_queue_capacity() -> usize {
    256
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            context_timeout_ms: default_context_timeout_ms(),
            inbound_queue_capacity: default_inbound_queue_capacity(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies process environment overrides.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies `LEADLINE_*` overrides read through `lookup`.
///
/// - `LEADLINE_HOST` overrides `server.host`
/// - `LEADLINE_PORT` overrides `server.port`
/// - `LEADLINE_DB_PATH` overrides `database.path`
/// - `LEADLINE_LOG_LEVEL` overrides `logging.level`
/// - `LEADLINE_LOG_JSON` overrides `logging.json` ("true" or "1" enables)
/// - `LEADLINE_REALTIME_API_KEY`, `LEADLINE_EXTRACTOR_API_KEY` and
///   `LEADLINE_CALENDAR_API_KEY` set the matching secrets
///
/// Unparseable host or port values are ignored.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("LEADLINE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("LEADLINE_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(db_path) = lookup("LEADLINE_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = lookup("LEADLINE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("LEADLINE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(key) = lookup("LEADLINE_REALTIME_API_KEY") {
        config.realtime.api_key = key;
    }
    if let Some(key) = lookup("LEADLINE_EXTRACTOR_API_KEY") {
        config.extractor.api_key = key;
    }
    if let Some(key) = lookup("LEADLINE_CALENDAR_API_KEY") {
        config.calendar.api_key = key;
    }
}
