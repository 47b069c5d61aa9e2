//! Configuration loading: a TOML file deserialized into a handful of
//! per-role structs plus one shared `CommonConfig`.

use serde::Deserialize;
use std::fs;

use crate::error::ConfigError;

/// Timing and placement constants shared by every role.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CommonConfig {
    /// Chunk size in bytes.
    pub chunk_size: u64,
    /// Number of replicas maintained per chunk.
    pub replication_factor: usize,
    /// Chunk-server heartbeat send interval, in seconds.
    pub heartbeat_interval: u64,
    /// Time since last heartbeat after which a chunk server is declared dead.
    pub heartbeat_timeout: u64,
    /// Sweeper wake interval, in seconds.
    pub sweep_interval: u64,
    /// Primary lease duration, in seconds.
    pub lease_duration: u64,
    /// Delay between chunk-server registration retries, in seconds.
    pub register_retry_delay: u64,
    /// Background checkpoint interval, in seconds.
    pub checkpoint_interval: u64,
    /// Timeout for the primary -> follower `apply_write` call, in seconds.
    pub apply_write_timeout: u64,
    /// Timeout for the master -> chunkserver `copy_chunk` call, in seconds.
    pub copy_chunk_timeout: u64,
    /// Grace period given to in-flight requests on shutdown, in seconds.
    pub shutdown_grace: u64,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4 * 1024 * 1024,
            replication_factor: 2,
            heartbeat_interval: 3,
            heartbeat_timeout: 10,
            sweep_interval: 3,
            lease_duration: 10,
            register_retry_delay: 2,
            checkpoint_interval: 60,
            apply_write_timeout: 10,
            copy_chunk_timeout: 20,
            shutdown_grace: 5,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// Address the master HTTP server binds to.
    pub bind_addr: String,
    /// Path to the checkpoint file.
    pub checkpoint_path: String,
    /// Path to the append-only operation log.
    pub oplog_path: String,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            checkpoint_path: "checkpoint.json".to_string(),
            oplog_path: "oplog.jsonl".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ChunkServerConfig {
    /// Port this chunk server listens on.
    pub port: u16,
    /// `host:port` of the master.
    pub master_addr: String,
    /// Directory holding stable and staged chunk files.
    pub data_path: String,
}

impl Default for ChunkServerConfig {
    fn default() -> Self {
        Self {
            port: 9001,
            master_addr: "localhost:8080".to_string(),
            data_path: "data".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `host:port` of the master.
    pub master_addr: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            master_addr: "localhost:8080".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub master: MasterConfig,
    pub chunkserver: ChunkServerConfig,
    pub client: ClientConfig,
    pub common: CommonConfig,
}

/// Loads `path` as TOML. If the file does not exist, logs and falls back to
/// defaults rather than failing the process; most deployments run every
/// role off constants alone and only need the file to override placement.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let config: Config = toml::from_str(&contents).map_err(ConfigError::Parse)?;
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("config file '{}' not found, using defaults", path);
            Ok(Config::default())
        }
        Err(e) => Err(ConfigError::Read(e)),
    }
}
