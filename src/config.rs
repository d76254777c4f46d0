use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // API settings
    pub api_host: String,
    pub api_port: u16,

    // Alerting
    pub thresholds_file: Option<PathBuf>,
    pub store_timeout_ms: u64,
    pub store_retry_max: u32,
    pub store_retry_delay_ms: u64,

    // Dispatch
    pub dispatch_shards: usize,
    pub dispatch_queue_capacity: usize,

    // Live updates
    pub subscriber_buffer: usize,
    pub ws_heartbeat_seconds: u64,

    // Caching
    pub sensor_cache_ttl_seconds: u64,
    pub sensor_cache_max_entries: u64,

    // Logging
    pub log_format: LogFormat,
}

/// Read `key`, falling back to `default` when unset or unparsable.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if required environment variables are not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,

            // API settings
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: env_or("API_PORT", 8000),

            // Alerting
            thresholds_file: env::var("THRESHOLDS_FILE")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            store_timeout_ms: env_or("STORE_TIMEOUT_MS", 2000),
            store_retry_max: env_or("STORE_RETRY_MAX", 3),
            store_retry_delay_ms: env_or("STORE_RETRY_DELAY_MS", 200),

            // Dispatch
            dispatch_shards: env_or("DISPATCH_SHARDS", 4),
            dispatch_queue_capacity: env_or("DISPATCH_QUEUE_CAPACITY", 1024),

            // Live updates
            subscriber_buffer: env_or("SUBSCRIBER_BUFFER", 64),
            ws_heartbeat_seconds: env_or("WS_HEARTBEAT_SECONDS", 30),

            // Caching
            sensor_cache_ttl_seconds: env_or("SENSOR_CACHE_TTL_SECONDS", 300),
            sensor_cache_max_entries: env_or("SENSOR_CACHE_MAX_ENTRIES", 10_000),

            // Logging
            log_format: LogFormat::from_str(
                &env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            ),
        })
    }

    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
