//! Configuration management for Swarm Accelerator

use serde::Deserialize;
use std::env;
use std::path::PathBuf;

use crate::protocol::DEFAULT_MAX_BUFFER;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub origin: OriginConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub stream: StreamConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OriginConfig {
    /// Base URL of the Bee node requests fall back to
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub bucket: BucketConfig,
    /// Also keep chunk payloads inline in the metadata database
    pub inline_records: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum BucketConfig {
    Local { path: PathBuf },
    S3(S3Config),
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Per-connection frame buffer bound
    pub max_buffer_bytes: usize,
    /// Streams start with a `u16` frame count
    pub frame_count_prefix: bool,
    pub bulk_max_bytes: usize,
    /// `/bzz` content up to this size is joined fully before responding
    pub join_buffer_limit: u64,
    pub push_queue_capacity: usize,
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(#[from] env::VarError),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 1733,
            },
            origin: OriginConfig {
                url: "http://localhost:1633/".to_string(),
                timeout_secs: 300,
            },
            storage: StorageConfig {
                bucket: BucketConfig::Local {
                    path: PathBuf::from("./data/chunks"),
                },
                inline_records: true,
            },
            database: DatabaseConfig {
                url: "sqlite:./swarm-accelerator.db".to_string(),
            },
            stream: StreamConfig::default(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            max_buffer_bytes: DEFAULT_MAX_BUFFER,
            frame_count_prefix: false,
            bulk_max_bytes: 64 * 1024 * 1024,
            join_buffer_limit: 8 * 1024 * 1024,
            push_queue_capacity: 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let bucket = match env::var("BUCKET_BACKEND").unwrap_or_else(|_| "local".to_string()).as_str() {
            "s3" => BucketConfig::S3(S3Config {
                endpoint: env::var("S3_ENDPOINT")?,
                bucket: env::var("S3_BUCKET")?,
                access_key: env::var("S3_ACCESS_KEY")?,
                secret_key: env::var("S3_SECRET_KEY")?,
                region: env::var("S3_REGION").ok(),
            }),
            "local" => BucketConfig::Local {
                path: env::var("BUCKET_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./data/chunks")),
            },
            other => {
                return Err(ConfigError::Invalid {
                    name: "BUCKET_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT", defaults.server.port)?,
            },
            origin: OriginConfig {
                url: env::var("ORIGIN_URL").unwrap_or(defaults.origin.url),
                timeout_secs: parse_var("ORIGIN_TIMEOUT_SECS", defaults.origin.timeout_secs)?,
            },
            storage: StorageConfig {
                bucket,
                inline_records: parse_var("CHUNK_INLINE_RECORDS", defaults.storage.inline_records)?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
            },
            stream: StreamConfig {
                max_buffer_bytes: parse_var("STREAM_MAX_BUFFER_BYTES", defaults.stream.max_buffer_bytes)?,
                frame_count_prefix: parse_var("STREAM_FRAME_COUNT_PREFIX", defaults.stream.frame_count_prefix)?,
                bulk_max_bytes: parse_var("BULK_UPLOAD_MAX_BYTES", defaults.stream.bulk_max_bytes)?,
                join_buffer_limit: parse_var("JOIN_BUFFER_LIMIT", defaults.stream.join_buffer_limit)?,
                push_queue_capacity: parse_var("PUSH_QUEUE_CAPACITY", defaults.stream.push_queue_capacity)?,
            },
        })
    }
}

/// Parse an optional variable, keeping the default when it is unset
fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}
