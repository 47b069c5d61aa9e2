//! Typed errors for each role, each mapping deterministically onto an
//! HTTP status code. Library code returns these; only the
//! `src/bin/*.rs` entry points collapse errors into `anyhow::Error`.

use hyper::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[source] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Errors raised by the master's coordination core.
#[derive(Debug, thiserror::Error)]
pub enum MasterError {
    /// Client supplied a malformed or semantically invalid request.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unknown file or chunk id; no state was changed.
    #[error("not found: {0}")]
    NotFound(String),
    /// Not enough alive chunk servers to satisfy the request right now.
    #[error("capacity: {0}")]
    Capacity(String),
    /// A downstream chunk server failed to cooperate.
    #[error("downstream error: {0}")]
    Downstream(String),
    /// Disk, JSON, or other internal failure with no durable invariant violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MasterError {
    pub fn status(&self) -> StatusCode {
        match self {
            MasterError::BadRequest(_) => StatusCode::BAD_REQUEST,
            MasterError::NotFound(_) => StatusCode::NOT_FOUND,
            MasterError::Capacity(_) => StatusCode::SERVICE_UNAVAILABLE,
            MasterError::Downstream(_) => StatusCode::BAD_GATEWAY,
            MasterError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for MasterError {
    fn from(e: serde_json::Error) -> Self {
        MasterError::Internal(format!("json error: {}", e))
    }
}

impl From<std::io::Error> for MasterError {
    fn from(e: std::io::Error) -> Self {
        MasterError::Internal(format!("io error: {}", e))
    }
}

/// Errors raised by the chunk server's replicated write pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ChunkServerError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("downstream error: {0}")]
    Downstream(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChunkServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ChunkServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ChunkServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ChunkServerError::Downstream(_) => StatusCode::BAD_GATEWAY,
            ChunkServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for ChunkServerError {
    fn from(e: serde_json::Error) -> Self {
        ChunkServerError::Internal(format!("json error: {}", e))
    }
}

impl From<std::io::Error> for ChunkServerError {
    fn from(e: std::io::Error) -> Self {
        ChunkServerError::Internal(format!("io error: {}", e))
    }
}

/// Errors raised by the client driver, surfaced to CLI callers.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("master request failed: {0}")]
    Master(String),
    #[error("chunk server request failed: {0}")]
    ChunkServer(String),
    #[error("all replicas failed for chunk {0}")]
    AllReplicasFailed(String),
}
