//! Logical deletion.
//!
//! A delete never removes a node. It flips the node's tombstone flag so the
//! character disappears from the visible text while the node keeps its
//! place in the order and stays usable as an anchor: a client may type
//! after a character that someone else deleted concurrently, and the new
//! text must still land where that client saw it.
//!
//! Several delete operations may target the same element. Each is recorded
//! under its own op id; only the first changes anything.
//!
//! Physically pruning tombstones is only safe once every replica has
//! observed the delete (causal stability), and is not done here.

use rustc_hash::FxHashMap;

use super::primitives::OpId;
use super::rga::Rga;
use super::rga::Unresolved;

/// Result of applying a delete operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deleted {
    /// The target was live and is now a tombstone.
    Tombstoned,
    /// The target was already a tombstone (another delete got there first).
    AlreadyTombstoned,
    /// This delete op id was applied before.
    Duplicate,
}

/// Tracks every applied delete operation and the element it removed.
#[derive(Clone, Debug, Default)]
pub struct Tombstones {
    /// Delete op id -> the insert op id it targets.
    deletes: FxHashMap<OpId, OpId>,
    /// Number of distinct tombstoned elements.
    count: usize,
}

impl Tombstones {
    pub fn new() -> Tombstones {
        return Tombstones::default();
    }

    /// Whether `id` names an applied delete operation.
    pub fn is_delete(&self, id: &str) -> bool {
        return self.deletes.contains_key(id);
    }

    /// The element removed by the delete `id`.
    pub fn target_of(&self, id: &str) -> Option<&OpId> {
        return self.deletes.get(id);
    }

    /// Number of tombstoned elements.
    pub fn count(&self) -> usize {
        return self.count;
    }

    /// Number of applied delete operations.
    pub fn delete_ops(&self) -> usize {
        return self.deletes.len();
    }

    /// Tombstone `target` on behalf of delete operation `op_id`.
    ///
    /// The target must already be integrated into `rga`; if it isn't, the
    /// delete belongs in the causal buffer and nothing is recorded.
    pub fn apply_delete(&mut self, rga: &mut Rga, op_id: &OpId, target: &OpId) -> Result<Deleted, Unresolved> {
        if self.deletes.contains_key(op_id.as_str()) {
            return Ok(Deleted::Duplicate);
        }
        let idx = match rga.lookup(target.as_str()) {
            Some(idx) => idx,
            None => return Err(Unresolved(target.clone())),
        };
        self.deletes.insert(op_id.clone(), target.clone());

        if !rga.mark_deleted(idx) {
            log::debug!("delete {} found {} already tombstoned", op_id, target);
            return Ok(Deleted::AlreadyTombstoned);
        }
        self.count += 1;
        return Ok(Deleted::Tombstoned);
    }
}
