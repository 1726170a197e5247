//! Configuration management for the server.

use geolab_engine::WatermarkPolicy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Connection attempts before giving up on PostgreSQL
    pub db_connect_retries: u32,
    /// Delay before the first reconnect; doubles after each failure
    pub db_connect_delay: Duration,
    /// Elasticsearch base URL
    pub elasticsearch_url: String,
    /// Name of the person index
    pub index_name: String,
    /// Drop and recreate the index at startup
    pub recreate_index: bool,
    /// Maximum operations per `_bulk` request
    pub bulk_chunk_size: usize,
    /// File holding the sync watermark
    pub watermark_path: PathBuf,
    /// How the watermark moves after partial failures
    pub watermark_policy: WatermarkPolicy,
    /// How far the watermark trails the cycle start
    pub commit_lag: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let host = var("HOST", "0.0.0.0");

        let port = var("PORT", "5000")
            .parse()
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        // DATABASE_URL wins; otherwise assemble it from the POSTGRES_* variables.
        let database_url = match lookup("DATABASE_URL") {
            Some(url) => url,
            None => format!(
                "postgres://{}:{}@{}/{}",
                var("POSTGRES_USER", "geolab_user"),
                var("POSTGRES_PASSWORD", "geolab_pass"),
                var("POSTGRES_HOST", "postgres"),
                var("POSTGRES_DB", "geolab"),
            ),
        };

        let db_connect_retries = var("DB_CONNECT_RETRIES", "5")
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::Invalid("DB_CONNECT_RETRIES"))?;

        let db_connect_delay = var("DB_CONNECT_DELAY_SECS", "5")
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::Invalid("DB_CONNECT_DELAY_SECS"))?;

        let elasticsearch_url = var("ELASTICSEARCH_HOST", "http://elasticsearch:9200")
            .trim_end_matches('/')
            .to_string();

        let index_name = var("INDEX_NAME", "persons");
        if index_name.is_empty() {
            return Err(ConfigError::Invalid("INDEX_NAME"));
        }

        let recreate_index = parse_bool(&var("RECREATE_INDEX", "false"))
            .ok_or(ConfigError::Invalid("RECREATE_INDEX"))?;

        let bulk_chunk_size = var("BULK_CHUNK_SIZE", "1000")
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::Invalid("BULK_CHUNK_SIZE"))?;

        let watermark_path = PathBuf::from(var("WATERMARK_PATH", "/app/last_sync.txt"));

        let watermark_policy = var("WATERMARK_POLICY", "cycle_start")
            .parse()
            .map_err(|_| ConfigError::Invalid("WATERMARK_POLICY"))?;

        let commit_lag = var("COMMIT_LAG_MS", "1000")
            .parse()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::Invalid("COMMIT_LAG_MS"))?;

        Ok(Self {
            host,
            port,
            database_url,
            db_connect_retries,
            db_connect_delay,
            elasticsearch_url,
            index_name,
            recreate_index,
            bulk_chunk_size,
            watermark_path,
            watermark_policy,
            commit_lag,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid {0} value")]
    Invalid(&'static str),
}
