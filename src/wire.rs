//! JSON request/response bodies for every HTTP endpoint exposed by the
//! master and chunk server.
//!
//! Chunk payload bytes travel as a base64 string inside the JSON body,
//! via the `base64_bytes` module below.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        base64::decode(&s).map_err(serde::de::Error::custom)
    }
}

// ---- Master: membership -----------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusOkResponse {
    pub status: &'static str,
}

impl Default for StatusOkResponse {
    fn default() -> Self {
        Self { status: "ok" }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChunkServerView {
    pub port: u16,
    pub alive: bool,
    pub last_seen_unix: u64,
}

// ---- Master: allocation -------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct AllocateRequest {
    pub file: String,
    pub size_bytes: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AllocateResponse {
    pub chunk_ids: Vec<String>,
    pub locations: Vec<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChunkLocationsRequest {
    pub chunk_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChunkLocationsResponse {
    pub locations: Vec<String>,
}

// ---- Master: lease management ------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct PrimaryRequest {
    pub chunk_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PrimaryResponse {
    pub primary: String,
    pub lease_seconds: i64,
    pub replicas: Vec<String>,
    pub version: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RenewLeaseRequest {
    pub chunk_id: String,
    pub primary: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RenewLeaseResponse {
    pub ok: bool,
    pub lease_seconds: i64,
}

// ---- Master: cluster introspection --------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClusterFileView {
    pub chunks: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClusterChunkView {
    pub file: String,
    pub index: u64,
    pub replicas: Vec<String>,
    pub primary: Option<String>,
    pub version: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClusterInfoResponse {
    pub chunkservers: std::collections::HashMap<String, ChunkServerView>,
    pub files: std::collections::HashMap<String, ClusterFileView>,
    pub chunks: std::collections::HashMap<String, ClusterChunkView>,
}

// ---- Chunk server: simple single-replica path ---------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct WriteChunkRequest {
    pub chunk_id: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

// ---- Chunk server: replicated write pipeline -----------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct WritePrimaryRequest {
    pub chunk_id: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeqResponse {
    pub status: String,
    pub seq: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApplyWriteRequest {
    pub chunk_id: String,
    pub seq: u64,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommitRequest {
    pub chunk_id: String,
    pub seq: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CopyChunkRequest {
    pub chunk_id: String,
    pub target: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReceiveChunkRequest {
    pub chunk_id: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusMessageResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
