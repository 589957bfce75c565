//! versioned persisted state: a single JSON blob for the pool
//! registry/anonymity-pool slice, written atomically via temp-file-then-
//! rename, plus a `sled` tree for the aggregator's per-chain queues and
//! settlement records.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use siaac_aggregator::AggregatorSnapshot;
use siaac_auth::PersistedState as AuthPersistedState;
use siaac_pool::PersistedAnonymityPool;

use crate::error::NodeError;

const STATE_VERSION: u16 = 1;
const SLED_QUEUE_KEY: &[u8] = b"aggregator_snapshot";

#[derive(Serialize, Deserialize)]
pub struct NodeState {
    pub version: u16,
    pub auth: AuthPersistedState,
    pub anonymity_pool: PersistedAnonymityPool,
}

/// write `state` to `path` by writing to a sibling temp file and renaming
/// over the destination, so a crash mid-write never leaves a truncated
/// state file behind.
pub fn write_state_atomic(path: &Path, state: &NodeState) -> Result<(), NodeError> {
    let bytes = serde_json::to_vec_pretty(state).map_err(|e| NodeError::StateCorrupt(e.to_string()))?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &bytes).map_err(|e| NodeError::StateWrite { path: tmp_path.display().to_string(), source: e })?;
    std::fs::rename(&tmp_path, path).map_err(|e| NodeError::StateWrite { path: path.display().to_string(), source: e })?;
    Ok(())
}

/// load previously persisted state, if any file exists at `path`. A
/// version mismatch or structurally corrupt file is an `Err`, never a
/// silent reset.
pub fn read_state(path: &Path) -> Result<Option<NodeState>, NodeError> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(path).map_err(|e| NodeError::StateRead { path: path.display().to_string(), source: e })?;
    let state: NodeState = serde_json::from_slice(&bytes).map_err(|e| NodeError::StateCorrupt(e.to_string()))?;
    if state.version != STATE_VERSION {
        return Err(NodeError::StateVersionMismatch { expected: STATE_VERSION, found: state.version });
    }
    Ok(Some(state))
}

pub fn new_state(auth: AuthPersistedState, anonymity_pool: PersistedAnonymityPool) -> NodeState {
    NodeState { version: STATE_VERSION, auth, anonymity_pool }
}

pub fn state_path(data_dir: &Path) -> PathBuf {
    data_dir.join("state.json")
}

/// persist an `AggregatorSnapshot` into the embedded `sled` tree. Sled
/// already fsyncs on `flush`, so this is the crash-recovery store for
/// in-flight queues and settlement records that the JSON blob above does
/// not cover.
pub fn save_aggregator_snapshot(db: &sled::Db, snapshot: &AggregatorSnapshot) -> Result<(), NodeError> {
    let bytes = serde_json::to_vec(snapshot).map_err(|e| NodeError::StateCorrupt(e.to_string()))?;
    db.insert(SLED_QUEUE_KEY, bytes)?;
    db.flush()?;
    Ok(())
}

pub fn load_aggregator_snapshot(db: &sled::Db) -> Result<Option<AggregatorSnapshot>, NodeError> {
    match db.get(SLED_QUEUE_KEY)? {
        None => Ok(None),
        Some(bytes) => {
            let snapshot: AggregatorSnapshot = serde_json::from_slice(&bytes).map_err(|e| NodeError::StateCorrupt(e.to_string()))?;
            Ok(Some(snapshot))
        }
    }
}
