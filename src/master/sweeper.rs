//! Background liveness sweep: two `tokio::spawn` loops, one marking
//! chunk servers dead past their heartbeat deadline and triggering
//! repair, the other periodically checkpointing the namespace.

use std::sync::Arc;
use std::time::Duration;

use crate::master::durability;
use crate::master::repair;
use crate::master::state::MasterState;
use crate::util::now_unix;

/// Spawns the periodic sweep and checkpoint loop. Runs until the
/// process exits; there is no cancellation handle because the loop only
/// ever does idempotent, safe-to-interrupt work.
pub fn spawn(state: Arc<MasterState>) {
    let sweep_state = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(sweep_state.common.sweep_interval));
        loop {
            ticker.tick().await;
            sweep_once(&sweep_state).await;
        }
    });

    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(state.common.checkpoint_interval));
        ticker.tick().await; // skip the immediate first fire
        loop {
            ticker.tick().await;
            let ns = state.snapshot().await;
            if let Err(e) = durability::save_checkpoint(&state.config.checkpoint_path, &ns).await {
                tracing::warn!("periodic checkpoint failed: {}", e);
            }
        }
    });
}

async fn sweep_once(state: &Arc<MasterState>) {
    let timeout = state.common.heartbeat_timeout;
    let now = now_unix();

    let dead: Vec<String> = {
        let mut ns = state.inner.lock().await;
        let mut newly_dead = Vec::new();
        for (id, record) in ns.chunk_servers.iter_mut() {
            if record.alive && now.saturating_sub(record.last_seen) > timeout {
                record.alive = false;
                newly_dead.push(id.clone());
            }
        }
        for chunk in ns.chunks.values_mut() {
            if chunk.lease_expiry != 0 && now >= chunk.lease_expiry {
                chunk.lease_expiry = 0;
                chunk.primary = None;
            }
        }
        newly_dead
    };

    for id in dead {
        tracing::warn!("chunk server '{}' missed heartbeat deadline, marking dead", id);
        repair::repair_node(state.clone(), id).await;
    }
}
