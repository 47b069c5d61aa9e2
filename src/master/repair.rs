//! Under-replication repair: a dead node triggers a scan for affected
//! chunks, each repaired independently by copying from a healthy
//! replica to a fresh target. Source and target selection go through a
//! `BinaryHeap<Reverse<String>>` min-heap over candidate ids, giving a
//! deterministic lexicographic pick instead of depending on map
//! iteration order.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use crate::master::state::{ChunkMeta, ChunkServerRecord, MasterState};
use crate::wire::{CopyChunkRequest, StatusMessageResponse};

const REPAIR_ATTEMPTS: u32 = 3;

/// Picks a deterministic (source, target) pair for repairing `chunk`:
/// the lexicographically-smallest alive replica as source, and the
/// lexicographically-smallest alive non-replica as target.
fn select_source_and_target(
    chunk: &ChunkMeta,
    chunk_servers: &std::collections::HashMap<String, ChunkServerRecord>,
) -> Result<(String, String), String> {
    let mut alive_replicas: BinaryHeap<Reverse<String>> = chunk
        .replicas
        .iter()
        .filter(|r| chunk_servers.get(*r).map(|c| c.alive).unwrap_or(false))
        .cloned()
        .map(Reverse)
        .collect();

    let replica_set: std::collections::HashSet<&String> = chunk.replicas.iter().collect();
    let mut candidates: BinaryHeap<Reverse<String>> = chunk_servers
        .iter()
        .filter(|(id, cs)| cs.alive && !replica_set.contains(*id))
        .map(|(id, _)| Reverse(id.clone()))
        .collect();

    let Reverse(source) = alive_replicas
        .pop()
        .ok_or_else(|| "no alive source replicas".to_string())?;
    let Reverse(target) = candidates
        .pop()
        .ok_or_else(|| "no available targets to host new replica".to_string())?;
    Ok((source, target))
}

/// Scans all chunks that listed `dead_id` as a replica and are now
/// under-replicated, and spawns an independent repair task for each.
pub async fn repair_node(state: Arc<MasterState>, dead_id: String) {
    tracing::info!("starting repair for dead node '{}'", dead_id);

    let replication_factor = state.common.replication_factor;
    let to_repair: Vec<String> = {
        let ns = state.inner.lock().await;
        ns.chunks
            .iter()
            .filter_map(|(chunk_id, chunk)| {
                if !chunk.replicas.iter().any(|r| r == &dead_id) {
                    return None;
                }
                let alive_count = chunk
                    .replicas
                    .iter()
                    .filter(|r| ns.chunk_servers.get(*r).map(|c| c.alive).unwrap_or(false))
                    .count();
                if alive_count < replication_factor {
                    Some(chunk_id.clone())
                } else {
                    None
                }
            })
            .collect()
    };

    for chunk_id in to_repair {
        let state = state.clone();
        let dead_id = dead_id.clone();
        tokio::spawn(async move {
            if let Err(e) = repair_chunk(&state, &chunk_id, &dead_id).await {
                tracing::warn!("repair failed for chunk '{}': {}", chunk_id, e);
            }
        });
    }
}

async fn repair_chunk(
    state: &Arc<MasterState>,
    chunk_id: &str,
    dead_id: &str,
) -> Result<(), String> {
    let (source, target) = {
        let ns = state.inner.lock().await;
        let chunk = ns
            .chunks
            .get(chunk_id)
            .ok_or_else(|| format!("chunk not found: {}", chunk_id))?;
        select_source_and_target(chunk, &ns.chunk_servers)
            .map_err(|e| format!("{} (chunk {})", e, chunk_id))?
    };

    let req = CopyChunkRequest {
        chunk_id: chunk_id.to_string(),
        target: target.clone(),
    };
    let url = format!("http://{}/copy_chunk", source);
    let timeout = Duration::from_secs(state.common.copy_chunk_timeout);

    let mut last_err = String::new();
    for attempt in 1..=REPAIR_ATTEMPTS {
        match crate::httpclient::post_json::<_, StatusMessageResponse>(&state.http, &url, &req, timeout)
            .await
        {
            Ok(resp) if resp.status == "ok" => {
                let mut ns = state.inner.lock().await;
                if let Some(chunk) = ns.chunks.get_mut(chunk_id) {
                    let mut seen = std::collections::HashSet::new();
                    let mut new_replicas: Vec<String> = chunk
                        .replicas
                        .iter()
                        .filter(|r| r.as_str() != dead_id)
                        .filter(|r| seen.insert((*r).clone()))
                        .cloned()
                        .collect();
                    if seen.insert(target.clone()) {
                        new_replicas.push(target.clone());
                    }
                    chunk.replicas = new_replicas;
                }
                drop(ns);

                state
                    .oplog
                    .append(
                        "repair",
                        serde_json::json!({ "chunk_id": chunk_id, "new_replica": target }),
                    )
                    .await
                    .map_err(|e| e.to_string())?;

                tracing::info!(
                    "repaired chunk '{}' - added replica '{}' (removed '{}')",
                    chunk_id,
                    target,
                    dead_id
                );
                return Ok(());
            }
            Ok(resp) => {
                last_err = format!("copy failed: {}", resp.message.unwrap_or_default());
            }
            Err(e) => {
                last_err = format!("post to source failed: {}", e);
            }
        }
        tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
    }

    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn server(alive: bool) -> ChunkServerRecord {
        ChunkServerRecord {
            alive,
            last_seen: 0,
        }
    }

    fn chunk(replicas: &[&str]) -> ChunkMeta {
        ChunkMeta {
            file: "f.txt".to_string(),
            index: 0,
            replicas: replicas.iter().map(|s| s.to_string()).collect(),
            primary: None,
            lease_expiry: 0,
            version: 1,
        }
    }

    #[test]
    fn picks_lexicographically_smallest_alive_source_and_target() {
        let chunk = chunk(&["b:2", "a:1", "c:3"]);
        let mut servers = HashMap::new();
        servers.insert("a:1".to_string(), server(true));
        servers.insert("b:2".to_string(), server(true));
        servers.insert("c:3".to_string(), server(true));
        servers.insert("d:4".to_string(), server(true));
        servers.insert("e:5".to_string(), server(true));

        let (source, target) = select_source_and_target(&chunk, &servers).unwrap();
        assert_eq!(source, "a:1"); // smallest alive replica
        assert_eq!(target, "d:4"); // smallest alive non-replica
    }

    #[test]
    fn skips_dead_replicas_when_picking_a_source() {
        let chunk = chunk(&["a:1", "b:2"]);
        let mut servers = HashMap::new();
        servers.insert("a:1".to_string(), server(false));
        servers.insert("b:2".to_string(), server(true));
        servers.insert("c:3".to_string(), server(true));

        let (source, target) = select_source_and_target(&chunk, &servers).unwrap();
        assert_eq!(source, "b:2");
        assert_eq!(target, "c:3");
    }

    #[test]
    fn errors_when_no_alive_source_replica_exists() {
        let chunk = chunk(&["a:1"]);
        let mut servers = HashMap::new();
        servers.insert("a:1".to_string(), server(false));
        servers.insert("b:2".to_string(), server(true));

        let err = select_source_and_target(&chunk, &servers).unwrap_err();
        assert!(err.contains("no alive source replicas"));
    }

    #[test]
    fn errors_when_no_target_capacity_remains() {
        let chunk = chunk(&["a:1", "b:2"]);
        let mut servers = HashMap::new();
        servers.insert("a:1".to_string(), server(true));
        servers.insert("b:2".to_string(), server(true));

        let err = select_source_and_target(&chunk, &servers).unwrap_err();
        assert!(err.contains("no available targets"));
    }
}
