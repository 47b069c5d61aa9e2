//! Chunk server storage and per-chunk sequence tracking: staged temp
//! files, stable on-disk chunks, and the `last_applied`/`last_committed`
//! counters the write pipeline advances.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::Mutex;

use crate::config::{ChunkServerConfig, CommonConfig};
use crate::error::ChunkServerError;
use crate::httpclient::{self, HttpClient};
use crate::util::write_atomic;

#[derive(Debug, Default, Clone, Copy)]
pub struct SeqState {
    pub last_applied: u64,
    pub last_committed: u64,
}

pub struct ChunkServerState {
    pub port: u16,
    pub config: ChunkServerConfig,
    pub common: CommonConfig,
    pub http: HttpClient,
    seqs: Mutex<HashMap<String, SeqState>>,
}

impl ChunkServerState {
    pub fn new(port: u16, config: ChunkServerConfig, common: CommonConfig) -> Self {
        Self {
            port,
            config,
            common,
            http: httpclient::new_client(),
            seqs: Mutex::new(HashMap::new()),
        }
    }

    pub fn self_id(&self) -> String {
        format!("localhost:{}", self.port)
    }

    fn stable_path(&self, chunk_id: &str) -> PathBuf {
        PathBuf::from(&self.config.data_path).join(format!("{}.bin", chunk_id))
    }

    fn temp_path(&self, chunk_id: &str, seq: u64) -> PathBuf {
        PathBuf::from(&self.config.data_path).join(format!("{}.{}.tmp", chunk_id, seq))
    }

    async fn ensure_data_dir(&self) -> Result<(), ChunkServerError> {
        tokio::fs::create_dir_all(&self.config.data_path).await?;
        Ok(())
    }

    /// Primary-side: atomically bumps and returns the new `last_applied`
    /// sequence for `chunk_id`.
    pub async fn next_seq(&self, chunk_id: &str) -> u64 {
        let mut seqs = self.seqs.lock().await;
        let entry = seqs.entry(chunk_id.to_string()).or_default();
        entry.last_applied += 1;
        entry.last_applied
    }

    /// Follower-side: records `seq` as applied if it's newer than what's
    /// already recorded.
    pub async fn record_applied(&self, chunk_id: &str, seq: u64) {
        let mut seqs = self.seqs.lock().await;
        let entry = seqs.entry(chunk_id.to_string()).or_default();
        if seq > entry.last_applied {
            entry.last_applied = seq;
        }
    }

    pub async fn record_committed(&self, chunk_id: &str, seq: u64) {
        let mut seqs = self.seqs.lock().await;
        let entry = seqs.entry(chunk_id.to_string()).or_default();
        if seq > entry.last_committed {
            entry.last_committed = seq;
        }
    }

    pub async fn seq_state(&self, chunk_id: &str) -> SeqState {
        self.seqs
            .lock()
            .await
            .get(chunk_id)
            .copied()
            .unwrap_or_default()
    }

    /// Stages `data` to `<chunk_id>.<seq>.tmp`.
    pub async fn stage(&self, chunk_id: &str, seq: u64, data: &[u8]) -> Result<(), ChunkServerError> {
        self.ensure_data_dir().await?;
        tokio::fs::write(self.temp_path(chunk_id, seq), data).await?;
        Ok(())
    }

    /// Renames the temp file for `seq` to the stable name, atomically.
    pub async fn promote(&self, chunk_id: &str, seq: u64) -> Result<(), ChunkServerError> {
        let tmp = self.temp_path(chunk_id, seq);
        let stable = self.stable_path(chunk_id);
        tokio::fs::rename(&tmp, &stable).await?;
        Ok(())
    }

    /// Removes the temp file for `seq`, ignoring a missing file (it may
    /// never have been written if staging itself failed).
    pub async fn discard_temp(&self, chunk_id: &str, seq: u64) {
        let _ = tokio::fs::remove_file(self.temp_path(chunk_id, seq)).await;
    }

    /// Directly writes the stable file, used by `write_chunk` (the
    /// unreplicated smoke-test path) and `receive_chunk` (repair).
    pub async fn write_stable(&self, chunk_id: &str, data: &[u8]) -> Result<(), ChunkServerError> {
        self.ensure_data_dir().await?;
        write_atomic(&self.stable_path(chunk_id), data).await?;
        Ok(())
    }

    pub async fn read_stable(&self, chunk_id: &str) -> Result<Vec<u8>, ChunkServerError> {
        match tokio::fs::read(self.stable_path(chunk_id)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                ChunkServerError::NotFound(format!("chunk '{}' not found", chunk_id)),
            ),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChunkServerConfig, CommonConfig};

    fn test_state(dir: &std::path::Path) -> ChunkServerState {
        let mut config = ChunkServerConfig::default();
        config.data_path = dir.to_string_lossy().into_owned();
        ChunkServerState::new(9001, config, CommonConfig::default())
    }

    fn tempdir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("minigfs-cs-test-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn next_seq_is_monotonic_per_chunk() {
        let dir = tempdir("seq");
        let state = test_state(&dir);
        assert_eq!(state.next_seq("c0").await, 1);
        assert_eq!(state.next_seq("c0").await, 2);
        assert_eq!(state.next_seq("c1").await, 1);
    }

    #[tokio::test]
    async fn record_applied_never_moves_backwards() {
        let dir = tempdir("applied");
        let state = test_state(&dir);
        state.record_applied("c0", 5).await;
        state.record_applied("c0", 2).await;
        assert_eq!(state.seq_state("c0").await.last_applied, 5);
    }

    #[tokio::test]
    async fn stage_then_promote_makes_chunk_readable() {
        let dir = tempdir("promote");
        let state = test_state(&dir);

        assert!(matches!(
            state.read_stable("c0").await.unwrap_err(),
            ChunkServerError::NotFound(_)
        ));

        state.stage("c0", 1, b"hello").await.unwrap();
        state.promote("c0", 1).await.unwrap();
        assert_eq!(state.read_stable("c0").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn write_stable_is_directly_readable() {
        let dir = tempdir("direct");
        let state = test_state(&dir);
        state.write_stable("c0", b"payload").await.unwrap();
        assert_eq!(state.read_stable("c0").await.unwrap(), b"payload");
    }
}
