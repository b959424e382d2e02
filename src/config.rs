//! Engine configuration.

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::crdt::document::DEFAULT_WARN_DEPTH;
use crate::crdt::validate::DEFAULT_MAX_ID_LEN;
use crate::crdt::validate::Validator;

/// Tunables for the merge engine. None of these affect the merged text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Parked operations per document before backpressure is flagged (default: 1024)
    pub pending_warn_depth: usize,
    /// Age at which a parked operation counts as stale (default: 30s)
    pub stale_after: Duration,
    /// Maximum identifier length in bytes (default: 128)
    pub max_id_len: usize,
    /// Write materialized snapshots to the documents table (default: true)
    pub persist_snapshots: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        return EngineConfig {
            pending_warn_depth: DEFAULT_WARN_DEPTH,
            stale_after: Duration::from_secs(30),
            max_id_len: DEFAULT_MAX_ID_LEN,
            persist_snapshots: true,
        };
    }
}

impl EngineConfig {
    /// Small thresholds so tests can trip them.
    pub fn for_testing() -> Self {
        return EngineConfig {
            pending_warn_depth: 8,
            stale_after: Duration::from_millis(50),
            max_id_len: DEFAULT_MAX_ID_LEN,
            persist_snapshots: true,
        };
    }

    pub fn validator(&self) -> Validator {
        return Validator::new(self.max_id_len);
    }
}
