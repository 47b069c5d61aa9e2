//! Checkpoint and op-log durability: a full namespace snapshot written
//! atomically, plus an append-only log of mutations replayed on top of
//! the most recent snapshot at startup.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::MasterError;
use crate::master::state::{FileMeta, Namespace};
use crate::util::write_atomic;

#[derive(Debug, Serialize, Deserialize)]
struct OpLogEntry {
    event: String,
    payload: serde_json::Value,
}

/// Append-only operation log. Each append opens its own file handle in
/// append mode; a mutex serializes the open-write-close sequence so
/// concurrent master handlers can't interleave partial lines.
pub struct OpLog {
    path: String,
    write_lock: Mutex<()>,
}

impl OpLog {
    pub fn new(path: String) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn append(
        &self,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), MasterError> {
        let line = serde_json::to_vec(&OpLogEntry {
            event: event.to_string(),
            payload,
        })?;

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }
}

/// Loads the checkpoint at `path`, if present. A missing or corrupt
/// checkpoint logs and yields `None` rather than failing startup.
pub async fn load_checkpoint(path: &str) -> Option<Namespace> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("no checkpoint found at '{}', starting empty", path);
            return None;
        }
        Err(e) => {
            tracing::warn!("failed to read checkpoint '{}': {}", path, e);
            return None;
        }
    };

    match serde_json::from_slice::<Namespace>(&bytes) {
        Ok(ns) => {
            tracing::info!(
                "checkpoint loaded ({} files, {} chunks)",
                ns.files.len(),
                ns.chunks.len()
            );
            Some(ns)
        }
        Err(e) => {
            tracing::warn!("checkpoint '{}' corrupt, ignoring: {}", path, e);
            None
        }
    }
}

/// Saves `ns` to `path` atomically (write to a side file, then rename).
pub async fn save_checkpoint(path: &str, ns: &Namespace) -> Result<(), MasterError> {
    let bytes = serde_json::to_vec_pretty(ns)?;
    write_atomic(Path::new(path), &bytes).await?;
    tracing::info!(
        "checkpoint saved ({} files, {} chunks)",
        ns.files.len(),
        ns.chunks.len()
    );
    Ok(())
}

/// Replays the op-log at `path` into `ns` in file order. Replay is
/// idempotent: `allocate` only creates a file entry when absent (it
/// never extends an existing file's chunk list, even if the logged
/// chunk ids differ); `assign_primary` and `repair` only mutate a chunk
/// that already exists. A decode error aborts the remaining replay
/// without panicking.
pub async fn replay_oplog(path: &str, ns: &mut Namespace) {
    let file = match tokio::fs::File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("no op-log found at '{}'", path);
            return;
        }
        Err(e) => {
            tracing::warn!("failed to open op-log '{}': {}", path, e);
            return;
        }
    };

    let mut lines = tokio::io::BufReader::new(file).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(l)) if l.trim().is_empty() => continue,
            Ok(Some(l)) => l,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("op-log read error, aborting replay: {}", e);
                break;
            }
        };

        let entry: OpLogEntry = match serde_json::from_str(&line) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("op-log decode error, aborting replay: {}", e);
                break;
            }
        };

        apply_log_entry(ns, &entry.event, &entry.payload);
    }
    tracing::info!("op-log replay complete");
}

fn apply_log_entry(ns: &mut Namespace, event: &str, payload: &serde_json::Value) {
    match event {
        "allocate" => {
            let Some(file) = payload.get("file").and_then(|v| v.as_str()) else {
                return;
            };
            if ns.files.contains_key(file) {
                return;
            }
            let chunks: Vec<String> = payload
                .get("chunks")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|c| c.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();
            ns.files.insert(file.to_string(), FileMeta { chunks });
        }
        "assign_primary" => {
            let Some(chunk_id) = payload.get("chunk_id").and_then(|v| v.as_str()) else {
                return;
            };
            let Some(primary) = payload.get("primary").and_then(|v| v.as_str()) else {
                return;
            };
            let version = payload.get("version").and_then(|v| v.as_u64()).unwrap_or(0);
            if let Some(chunk) = ns.chunks.get_mut(chunk_id) {
                chunk.primary = Some(primary.to_string());
                chunk.version = version;
            }
        }
        "repair" => {
            let Some(chunk_id) = payload.get("chunk_id").and_then(|v| v.as_str()) else {
                return;
            };
            let Some(new_replica) = payload.get("new_replica").and_then(|v| v.as_str()) else {
                return;
            };
            if let Some(chunk) = ns.chunks.get_mut(chunk_id) {
                if !chunk.replicas.iter().any(|r| r == new_replica) {
                    chunk.replicas.push(new_replica.to_string());
                }
            }
        }
        other => {
            tracing::debug!("op-log replay: ignoring unknown event '{}'", other);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::master::state::ChunkMeta;

    #[tokio::test]
    async fn replay_is_idempotent() {
        let dir = tempdir();
        let oplog_path = dir.join("oplog.jsonl");
        let log = OpLog::new(oplog_path.to_string_lossy().into_owned());

        log.append(
            "allocate",
            serde_json::json!({"file": "f.txt", "chunks": ["f.txt_0"]}),
        )
        .await
        .unwrap();
        log.append(
            "assign_primary",
            serde_json::json!({"chunk_id": "f.txt_0", "primary": "localhost:9001", "version": 1}),
        )
        .await
        .unwrap();

        let mut ns = Namespace::default();
        ns.chunks.insert(
            "f.txt_0".to_string(),
            ChunkMeta {
                file: "f.txt".to_string(),
                index: 0,
                replicas: vec!["localhost:9001".to_string()],
                primary: None,
                lease_expiry: 0,
                version: 0,
            },
        );

        let path = oplog_path.to_string_lossy().into_owned();
        let mut once = ns.clone();
        replay_oplog(&path, &mut once).await;

        let mut twice = ns.clone();
        replay_oplog(&path, &mut twice).await;
        replay_oplog(&path, &mut twice).await;

        assert_eq!(
            serde_json::to_string(&once).unwrap(),
            serde_json::to_string(&twice).unwrap()
        );
    }

    fn tempdir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("minigfs-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
