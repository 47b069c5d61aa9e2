//! The master's namespace metadata and the operations that mutate it
//! under a single lock.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::{CommonConfig, MasterConfig};
use crate::error::MasterError;
use crate::httpclient::{self, HttpClient};
use crate::master::durability::OpLog;
use crate::util::now_unix;

/// A registered chunk server. Never removed once seen, tombstoned by
/// `alive = false` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkServerRecord {
    pub alive: bool,
    pub last_seen: u64,
}

/// A file's ordered list of chunk ids.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileMeta {
    pub chunks: Vec<String>,
}

/// One chunk's placement and lease state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub file: String,
    pub index: u64,
    pub replicas: Vec<String>,
    pub primary: Option<String>,
    /// Unix seconds; 0 means no active lease.
    pub lease_expiry: u64,
    pub version: u64,
}

/// The full in-memory namespace, also the checkpoint's on-disk shape.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Namespace {
    pub files: HashMap<String, FileMeta>,
    pub chunks: HashMap<String, ChunkMeta>,
    pub chunk_servers: HashMap<String, ChunkServerRecord>,
}

/// Chunk-server identity as used on the wire: `localhost:<port>`.
pub fn server_id(port: u16) -> String {
    format!("localhost:{}", port)
}

pub struct MasterState {
    pub inner: Mutex<Namespace>,
    pub config: MasterConfig,
    pub common: CommonConfig,
    pub oplog: OpLog,
    pub http: HttpClient,
}

impl MasterState {
    pub fn new(config: MasterConfig, common: CommonConfig) -> Self {
        let oplog = OpLog::new(config.oplog_path.clone());
        Self {
            inner: Mutex::new(Namespace::default()),
            config,
            common,
            oplog,
            http: httpclient::new_client(),
        }
    }

    pub async fn replace_namespace(&self, ns: Namespace) {
        *self.inner.lock().await = ns;
    }

    pub async fn snapshot(&self) -> Namespace {
        self.inner.lock().await.clone()
    }

    /// `register`/`heartbeat`: idempotent upsert, always admits a node
    /// back to `alive = true`.
    pub async fn register_or_heartbeat(&self, port: u16) {
        let id = server_id(port);
        let mut ns = self.inner.lock().await;
        let record = ns
            .chunk_servers
            .entry(id)
            .or_insert(ChunkServerRecord {
                alive: true,
                last_seen: 0,
            });
        record.alive = true;
        record.last_seen = now_unix();
    }

    pub async fn list_chunk_servers(&self) -> HashMap<String, ChunkServerRecord> {
        self.inner.lock().await.chunk_servers.clone()
    }

    /// Returns chunk-server ids currently alive, in deterministic
    /// (lexicographic) order, so the allocator can round-robin over a
    /// stable ordering of the alive set.
    fn alive_ids_locked(ns: &Namespace) -> Vec<String> {
        let mut ids: Vec<String> = ns
            .chunk_servers
            .iter()
            .filter(|(_, r)| r.alive)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Allocates `size_bytes` worth of new chunks for `file`, round-robining
    /// replica placement across the currently alive chunk servers.
    pub async fn allocate(
        &self,
        file: &str,
        size_bytes: u64,
    ) -> Result<(Vec<String>, Vec<Vec<String>>), MasterError> {
        let replication_factor = self.common.replication_factor;
        let chunk_size = self.common.chunk_size;

        let mut ns = self.inner.lock().await;
        let alive = Self::alive_ids_locked(&ns);
        if alive.len() < replication_factor {
            return Err(MasterError::Capacity(format!(
                "only {} alive chunk server(s), need {}",
                alive.len(),
                replication_factor
            )));
        }

        let num = ((size_bytes + chunk_size - 1) / chunk_size).max(1);
        let start_index = ns.files.get(file).map(|f| f.chunks.len()).unwrap_or(0) as u64;

        let mut chunk_ids = Vec::with_capacity(num as usize);
        let mut locations = Vec::with_capacity(num as usize);

        for i in 0..num {
            let current_index = start_index + i;
            let chunk_id = format!("{}_{}", file, current_index);

            let start = (current_index as usize) % alive.len();
            let replicas: Vec<String> = (0..replication_factor)
                .map(|j| alive[(start + j) % alive.len()].clone())
                .collect();

            ns.chunks.insert(
                chunk_id.clone(),
                ChunkMeta {
                    file: file.to_string(),
                    index: current_index,
                    replicas: replicas.clone(),
                    primary: None,
                    lease_expiry: 0,
                    version: 0,
                },
            );

            chunk_ids.push(chunk_id);
            locations.push(replicas);
        }

        let entry = ns.files.entry(file.to_string()).or_default();
        entry.chunks.extend(chunk_ids.iter().cloned());
        drop(ns);

        self.oplog
            .append(
                "allocate",
                serde_json::json!({ "file": file, "chunks": chunk_ids }),
            )
            .await?;

        Ok((chunk_ids, locations))
    }

    pub async fn chunk_locations(&self, chunk_id: &str) -> Result<Vec<String>, MasterError> {
        let ns = self.inner.lock().await;
        ns.chunks
            .get(chunk_id)
            .map(|c| c.replicas.clone())
            .ok_or_else(|| MasterError::NotFound(format!("chunk '{}' not found", chunk_id)))
    }

    /// Returns the current primary for `chunk_id` if its lease hasn't
    /// expired, or an empty primary otherwise.
    pub async fn get_primary(
        &self,
        chunk_id: &str,
    ) -> Result<(String, i64, Vec<String>, u64), MasterError> {
        let ns = self.inner.lock().await;
        let chunk = ns
            .chunks
            .get(chunk_id)
            .ok_or_else(|| MasterError::NotFound(format!("chunk '{}' not found", chunk_id)))?;

        let now = now_unix();
        if chunk.lease_expiry != 0 && now < chunk.lease_expiry {
            Ok((
                chunk.primary.clone().unwrap_or_default(),
                (chunk.lease_expiry - now) as i64,
                chunk.replicas.clone(),
                chunk.version,
            ))
        } else {
            Ok((String::new(), 0, chunk.replicas.clone(), chunk.version))
        }
    }

    /// Picks a new primary for `chunk_id` from its alive replicas,
    /// preferring `preferred` when it's alive and actually a replica.
    pub async fn assign_primary(
        &self,
        chunk_id: &str,
        preferred: Option<&str>,
    ) -> Result<(String, i64, Vec<String>, u64), MasterError> {
        let lease_seconds = self.common.lease_duration as i64;

        let mut ns = self.inner.lock().await;
        let alive = ns.chunk_servers.clone();
        let chunk = ns
            .chunks
            .get_mut(chunk_id)
            .ok_or_else(|| MasterError::NotFound(format!("chunk '{}' not found", chunk_id)))?;

        let is_alive = |id: &str| alive.get(id).map(|r| r.alive).unwrap_or(false);

        let mut chosen = None;
        if let Some(pref) = preferred {
            if chunk.replicas.iter().any(|r| r == pref) && is_alive(pref) {
                chosen = Some(pref.to_string());
            }
        }
        if chosen.is_none() {
            chosen = chunk.replicas.iter().find(|r| is_alive(r)).cloned();
        }

        let chosen = chosen.ok_or_else(|| {
            MasterError::Capacity("no alive replica to assign primary".to_string())
        })?;

        chunk.primary = Some(chosen.clone());
        chunk.lease_expiry = now_unix() + lease_seconds as u64;
        chunk.version += 1;
        let version = chunk.version;
        let replicas = chunk.replicas.clone();
        drop(ns);

        self.oplog
            .append(
                "assign_primary",
                serde_json::json!({ "chunk_id": chunk_id, "primary": chosen, "version": version }),
            )
            .await?;

        Ok((chosen, lease_seconds, replicas, version))
    }

    /// Extends the lease for `chunk_id` if `claimed_primary` still holds it.
    pub async fn renew_lease(
        &self,
        chunk_id: &str,
        claimed_primary: &str,
    ) -> Result<(bool, i64), MasterError> {
        let lease_seconds = self.common.lease_duration as i64;
        let mut ns = self.inner.lock().await;
        let chunk = ns
            .chunks
            .get_mut(chunk_id)
            .ok_or_else(|| MasterError::NotFound(format!("chunk '{}' not found", chunk_id)))?;

        if chunk.primary.as_deref() != Some(claimed_primary) {
            return Ok((false, 0));
        }
        chunk.lease_expiry = now_unix() + lease_seconds as u64;
        Ok((true, lease_seconds))
    }

    pub async fn cluster_info(&self) -> Namespace {
        self.snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CommonConfig, MasterConfig};

    fn test_state(dir: &std::path::Path) -> MasterState {
        let mut master_config = MasterConfig::default();
        master_config.checkpoint_path = dir.join("checkpoint.json").to_string_lossy().into_owned();
        master_config.oplog_path = dir.join("oplog.jsonl").to_string_lossy().into_owned();
        MasterState::new(master_config, CommonConfig::default())
    }

    fn tempdir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("minigfs-state-test-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    async fn register(state: &MasterState, port: u16) {
        state.register_or_heartbeat(port).await;
    }

    #[tokio::test]
    async fn allocate_requires_replication_factor_alive_servers() {
        let dir = tempdir("capacity");
        let state = test_state(&dir);
        register(&state, 9001).await;

        let err = state.allocate("f.txt", 10).await.unwrap_err();
        assert!(matches!(err, MasterError::Capacity(_)));
    }

    #[tokio::test]
    async fn allocate_round_robins_across_alive_servers() {
        let dir = tempdir("round-robin");
        let state = test_state(&dir);
        for port in [9001, 9002, 9003] {
            register(&state, port).await;
        }

        let (chunk_ids, locations) = state.allocate("f.txt", 3 * state.common.chunk_size).await.unwrap();
        assert_eq!(chunk_ids.len(), 3);
        assert_eq!(chunk_ids, vec!["f.txt_0", "f.txt_1", "f.txt_2"]);

        // each chunk gets replication_factor distinct replicas, and
        // consecutive chunks start from different offsets into the alive set
        for replicas in &locations {
            assert_eq!(replicas.len(), 2);
            assert_ne!(replicas[0], replicas[1]);
        }
        assert_ne!(locations[0], locations[1]);
    }

    #[tokio::test]
    async fn allocate_continues_chunk_indices_across_calls() {
        let dir = tempdir("continue");
        let state = test_state(&dir);
        for port in [9001, 9002] {
            register(&state, port).await;
        }

        let (first, _) = state.allocate("f.txt", state.common.chunk_size).await.unwrap();
        let (second, _) = state.allocate("f.txt", state.common.chunk_size).await.unwrap();
        assert_eq!(first, vec!["f.txt_0"]);
        assert_eq!(second, vec!["f.txt_1"]);
    }

    #[tokio::test]
    async fn assign_primary_prefers_the_requested_replica_when_alive() {
        let dir = tempdir("preferred");
        let state = test_state(&dir);
        for port in [9001, 9002] {
            register(&state, port).await;
        }
        let (chunk_ids, locations) = state.allocate("f.txt", 1).await.unwrap();
        let chunk_id = &chunk_ids[0];
        let preferred = &locations[0][1];

        let (primary, lease_seconds, _, version) =
            state.assign_primary(chunk_id, Some(preferred)).await.unwrap();
        assert_eq!(&primary, preferred);
        assert_eq!(version, 1);
        assert!(lease_seconds > 0);
    }

    #[tokio::test]
    async fn renew_lease_rejects_a_stale_claimed_primary() {
        let dir = tempdir("renew");
        let state = test_state(&dir);
        for port in [9001, 9002] {
            register(&state, port).await;
        }
        let (chunk_ids, _) = state.allocate("f.txt", 1).await.unwrap();
        let chunk_id = &chunk_ids[0];
        let (primary, _, _, _) = state.assign_primary(chunk_id, None).await.unwrap();

        let (ok, _) = state.renew_lease(chunk_id, "localhost:9999").await.unwrap();
        assert!(!ok);

        let (ok, lease_seconds) = state.renew_lease(chunk_id, &primary).await.unwrap();
        assert!(ok);
        assert!(lease_seconds > 0);
    }

    #[tokio::test]
    async fn chunk_locations_errors_on_unknown_chunk() {
        let dir = tempdir("unknown");
        let state = test_state(&dir);
        let err = state.chunk_locations("nope_0").await.unwrap_err();
        assert!(matches!(err, MasterError::NotFound(_)));
    }
}
