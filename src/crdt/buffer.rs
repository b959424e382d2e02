//! Holding area for operations that arrived before their dependency.
//!
//! An insert depends on its anchor and a delete on its target. If that
//! element has not been integrated yet, the operation is parked here, keyed
//! by the op id it is waiting for. When that id is integrated the document
//! asks the buffer to release everything waiting on it; released inserts
//! may in turn release more, which the document drives with a work queue
//! rather than recursion.
//!
//! Nothing is ever dropped. An operation whose dependency never arrives
//! stays parked indefinitely and shows up in `BufferStats`.

use std::time::Duration;
use std::time::Instant;

use rustc_hash::FxHashMap;
use serde::Serialize;
use smallvec::SmallVec;

use crate::error::MalformedOperation;

use super::op::Operation;
use super::primitives::OpId;

/// A parked operation and when it was parked.
#[derive(Clone, Debug)]
struct Parked {
    op: Operation,
    since: Instant,
}

/// Snapshot of buffer health for monitoring.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    /// Number of parked operations.
    pub depth: usize,
    /// Number of distinct op ids being waited on.
    pub awaited: usize,
    /// Age of the longest-parked operation.
    pub oldest_age: Option<Duration>,
    /// Operations parked for longer than the configured threshold.
    pub stale: usize,
    /// Depth has reached the configured warning threshold.
    pub backpressure: bool,
}

/// Operations waiting on a missing dependency.
#[derive(Clone, Debug, Default)]
pub struct CausalBuffer {
    /// Awaited op id -> operations parked on it, in arrival order.
    waiting: FxHashMap<OpId, SmallVec<[Parked; 1]>>,
    /// Parked op id -> the op id it awaits.
    parked: FxHashMap<OpId, OpId>,
}

impl CausalBuffer {
    pub fn new() -> CausalBuffer {
        return CausalBuffer::default();
    }

    /// Number of parked operations.
    pub fn len(&self) -> usize {
        return self.parked.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.parked.is_empty();
    }

    /// Whether `id` is parked.
    pub fn contains(&self, id: &str) -> bool {
        return self.parked.contains_key(id);
    }

    /// The op id that parked operation `id` is waiting on.
    pub fn awaiting(&self, id: &str) -> Option<&OpId> {
        return self.parked.get(id);
    }

    /// Whether anything is parked waiting on `id`.
    pub fn has_waiters(&self, id: &str) -> bool {
        return self.waiting.contains_key(id);
    }

    /// The parked operation `id`, if any.
    pub fn get(&self, id: &str) -> Option<&Operation> {
        let awaited = self.parked.get(id)?;
        return self
            .waiting
            .get(awaited.as_str())?
            .iter()
            .map(|parked| &parked.op)
            .find(|op| op.id.as_str() == id);
    }

    /// Check that parking `id` on `awaiting` would not close a cycle.
    ///
    /// Follows the chain of parked dependencies starting at `awaiting`. If
    /// it leads back to `id`, then neither end can ever resolve to the root.
    pub fn check_cycle(&self, id: &OpId, awaiting: &OpId) -> Result<(), MalformedOperation> {
        let mut cursor = awaiting;
        while let Some(next) = self.parked.get(cursor.as_str()) {
            if next == id {
                return Err(MalformedOperation::CyclicReference {
                    op_id: id.to_string(),
                    through: awaiting.to_string(),
                });
            }
            cursor = next;
        }
        return Ok(());
    }

    /// Park `op` until `awaiting` is integrated.
    ///
    /// Callers run `check_cycle` first; a parked chain is never cyclic, so
    /// the walk above always terminates.
    pub fn park(&mut self, op: Operation, awaiting: OpId) {
        log::debug!("parking {} until {} is resolved", op.id, awaiting);
        self.parked.insert(op.id.clone(), awaiting.clone());
        self.waiting.entry(awaiting).or_default().push(Parked {
            op,
            since: Instant::now(),
        });
    }

    /// Remove and return everything waiting on `resolved`, in arrival order.
    pub fn release(&mut self, resolved: &str) -> SmallVec<[Operation; 1]> {
        let parked = match self.waiting.remove(resolved) {
            Some(parked) => parked,
            None => return SmallVec::new(),
        };
        let mut released = SmallVec::with_capacity(parked.len());
        for entry in parked {
            self.parked.remove(entry.op.id.as_str());
            released.push(entry.op);
        }
        log::debug!("released {} operation(s) waiting on {}", released.len(), resolved);
        return released;
    }

    /// Iterate over parked operations in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        return self.waiting.values().flatten().map(|parked| &parked.op);
    }

    /// Measure depth and age against the given thresholds.
    pub fn stats(&self, now: Instant, stale_after: Duration, warn_depth: usize) -> BufferStats {
        let mut oldest_age = None;
        let mut stale = 0;
        for parked in self.waiting.values().flatten() {
            let age = now.saturating_duration_since(parked.since);
            if age >= stale_after {
                stale += 1;
            }
            oldest_age = Some(oldest_age.map_or(age, |oldest: Duration| oldest.max(age)));
        }
        return BufferStats {
            depth: self.len(),
            awaited: self.waiting.len(),
            oldest_age,
            stale,
            backpressure: self.len() >= warn_depth,
        };
    }
}
