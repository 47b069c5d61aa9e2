//! The master node: namespace metadata, liveness, lease management,
//! repair, and durability.

pub mod durability;
pub mod handlers;
pub mod repair;
pub mod server;
pub mod state;
pub mod sweeper;

use std::sync::Arc;

use crate::config::{CommonConfig, MasterConfig};
use state::MasterState;

/// Builds a `MasterState`, restoring from checkpoint plus op-log replay
/// if present: loads the most recent checkpoint first, then replays the
/// log on top of it.
pub async fn init(config: MasterConfig, common: CommonConfig) -> Arc<MasterState> {
    let state = Arc::new(MasterState::new(config.clone(), common));

    let mut ns = durability::load_checkpoint(&config.checkpoint_path)
        .await
        .unwrap_or_default();
    durability::replay_oplog(&config.oplog_path, &mut ns).await;
    state.replace_namespace(ns).await;

    state
}
