//! Per-document merge state.
//!
//! A `Document` owns everything one document needs to turn an unordered
//! stream of operations into text: the tree, the tombstone records, the
//! causal buffer and a fingerprint of what it has seen. It is created on
//! the first operation for a document and lives until it is explicitly
//! dropped; the engine serializes all mutation of one document behind a
//! single lock.
//!
//! Key design decisions:
//!
//! 1. **Admit, then integrate**: `admit` decides whether an operation is
//!    new, a duplicate, or structurally invalid against what this document
//!    already knows, without changing anything. `integrate` then either
//!    applies or parks it. The engine persists in between, so a rejected
//!    operation is never written to the log.
//!
//! 2. **Work queue cascade**: applying an insert may release operations
//!    parked on it, which may release more. Released operations go on a
//!    `VecDeque` and are processed in a loop, so a long chain of
//!    dependents costs heap, not stack.
//!
//! 3. **Version counter**: every structural change (new element, new
//!    tombstone) bumps `version`. Cached snapshots compare versions to know
//!    whether they are stale.

use std::collections::VecDeque;
use std::time::Duration;
use std::time::Instant;

use crate::error::MalformedOperation;

use super::buffer::BufferStats;
use super::buffer::CausalBuffer;
use super::digest::Fingerprint;
use super::op::OpKind;
use super::op::Operation;
use super::op::RawOperation;
use super::primitives::DocId;
use super::primitives::OpId;
use super::rga::Inserted;
use super::rga::Rga;
use super::rga::Unresolved;
use super::snapshot;
use super::snapshot::Element;
use super::snapshot::Snapshot;
use super::snapshot::VisibleChars;
use super::tombstone::Deleted;
use super::tombstone::Tombstones;
use super::validate::Validator;

/// Default buffer depth at which a warning is logged.
pub const DEFAULT_WARN_DEPTH: usize = 1024;

/// Where an operation is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpStatus {
    /// Waiting in the causal buffer for its dependency.
    Pending,
    /// Integrated. For a delete this means its target is tombstoned.
    Applied,
    /// An insert whose element has since been deleted.
    Tombstoned,
}

/// What happened to an accepted operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Applied, along with `released` operations that were waiting on it.
    Applied { released: usize },
    /// Parked until its dependency arrives.
    Pending,
    /// Already seen; nothing changed.
    Duplicate,
}

/// Result of checking an operation against document state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    New,
    Duplicate,
}

/// A document rebuilt from rows, with the number of rows it skipped.
#[derive(Clone, Debug)]
pub struct Replayed {
    pub document: Document,
    pub rejected: usize,
}

/// The merge state of one document.
#[derive(Clone, Debug)]
pub struct Document {
    id: DocId,
    rga: Rga,
    tombstones: Tombstones,
    buffer: CausalBuffer,
    fingerprint: Fingerprint,
    version: u64,
    applied: usize,
    warn_depth: usize,
}

impl Document {
    pub fn new(id: DocId) -> Document {
        return Document::with_warn_depth(id, DEFAULT_WARN_DEPTH);
    }

    /// Create a document that warns once `warn_depth` operations are parked.
    pub fn with_warn_depth(id: DocId, warn_depth: usize) -> Document {
        return Document {
            id,
            rga: Rga::new(),
            tombstones: Tombstones::new(),
            buffer: CausalBuffer::new(),
            fingerprint: Fingerprint::empty(),
            version: 0,
            applied: 0,
            warn_depth,
        };
    }

    /// Reconstruct a document from raw rows, in the order given.
    ///
    /// Rows that fail validation or the referential checks are logged,
    /// counted and skipped, so the resulting text does not depend on where
    /// in the log a rejected row sits.
    pub fn replay<'a>(
        id: DocId,
        ops: impl IntoIterator<Item = &'a RawOperation>,
        validator: &Validator,
    ) -> Replayed {
        let mut document = Document::new(id);
        let mut rejected = 0;
        for raw in ops {
            let result = validator
                .validate(document.id.as_str(), raw)
                .and_then(|op| document.apply(op));
            if let Err(err) = result {
                log::warn!("{}: skipping row {:?}: {}", document.id, raw.op_id, err);
                rejected += 1;
            }
        }
        return Replayed { document, rejected };
    }

    pub fn id(&self) -> &DocId {
        return &self.id;
    }

    /// Check `op` against what this document already knows.
    ///
    /// Nothing is modified. A duplicate op id is reported as `Duplicate`
    /// even if its content differs from the first delivery; the first one
    /// wins and the mismatch is logged.
    pub fn admit(&self, op: &Operation) -> Result<Admission, MalformedOperation> {
        if op.doc != self.id {
            return Err(MalformedOperation::WrongDocument {
                op_id: op.id.to_string(),
                expected: self.id.to_string(),
                found: op.doc.to_string(),
            });
        }

        if let Some(same) = self.matches_known(op) {
            if !same {
                log::warn!("{} redelivered with different content; keeping the first", op.id);
            }
            return Ok(Admission::Duplicate);
        }

        match &op.kind {
            OpKind::Insert { anchor, .. } => {
                if let Some(anchor) = anchor.op_id() {
                    if self.is_delete(anchor.as_str()) {
                        log::warn!("rejecting {}: anchored to delete {}", op.id, anchor);
                        return Err(MalformedOperation::AnchoredToDelete {
                            op_id: op.id.to_string(),
                            anchor: anchor.to_string(),
                        });
                    }
                }
            }
            OpKind::Delete { target } => {
                if self.is_delete(target.as_str()) {
                    log::warn!("rejecting {}: targets delete {}", op.id, target);
                    return Err(MalformedOperation::DeleteOfDelete {
                        op_id: op.id.to_string(),
                        target: target.to_string(),
                    });
                }
            }
        }

        if let Some(dependency) = op.dependency() {
            if !self.rga.contains(dependency.as_str()) {
                if let Err(err) = self.buffer.check_cycle(&op.id, dependency) {
                    log::warn!("rejecting {}: {}", op.id, err);
                    return Err(err);
                }
            }
        }
        return Ok(Admission::New);
    }

    /// Apply or park an admitted operation.
    pub fn integrate(&mut self, op: Operation) -> Outcome {
        self.fingerprint.add(&op);

        if let Some(dependency) = op.dependency() {
            if !self.rga.contains(dependency.as_str()) {
                let dependency = dependency.clone();
                self.park(op, dependency);
                return Outcome::Pending;
            }
        }

        let mut queue = VecDeque::new();
        queue.push_back(op);
        let mut released = 0;
        let mut first = true;
        while let Some(op) = queue.pop_front() {
            if !first {
                released += 1;
            }
            first = false;

            let id = op.id.clone();
            let is_insert = op.is_insert();
            if let Err(Unresolved(missing)) = self.apply_resolved(&op) {
                // A released operation always has its dependency in the tree
                log::warn!("{} unexpectedly unresolved on {}; parking again", id, missing);
                self.park(op, missing);
                continue;
            }
            if is_insert {
                queue.extend(self.buffer.release(id.as_str()));
            } else if self.buffer.has_waiters(id.as_str()) {
                log::warn!("{} is a delete but inserts are parked on it; they will never resolve", id);
            }
        }
        log::debug!("{}: applied with {} released, version {}", self.id, released, self.version);
        return Outcome::Applied { released };
    }

    /// Admit and integrate in one step.
    pub fn apply(&mut self, op: Operation) -> Result<Outcome, MalformedOperation> {
        return match self.admit(&op)? {
            Admission::Duplicate => Ok(Outcome::Duplicate),
            Admission::New => Ok(self.integrate(op)),
        };
    }

    fn apply_resolved(&mut self, op: &Operation) -> Result<(), Unresolved> {
        match &op.kind {
            OpKind::Insert { ch, anchor } => {
                if let Inserted::New(_) = self.rga.apply_insert(&op.id, &op.client, *ch, anchor)? {
                    self.version += 1;
                }
            }
            OpKind::Delete { target } => {
                if self.tombstones.apply_delete(&mut self.rga, &op.id, target)? == Deleted::Tombstoned {
                    self.version += 1;
                }
            }
        }
        self.applied += 1;
        return Ok(());
    }

    fn park(&mut self, op: Operation, dependency: OpId) {
        self.buffer.park(op, dependency);
        if self.buffer.len() == self.warn_depth {
            log::warn!("{}: {} operations waiting on missing dependencies", self.id, self.buffer.len());
        }
    }

    /// Whether `id` is a known delete, applied or parked.
    fn is_delete(&self, id: &str) -> bool {
        return self.tombstones.is_delete(id) || self.buffer.get(id).is_some_and(Operation::is_delete);
    }

    /// If `op.id` was seen before, whether it carried the same content.
    fn matches_known(&self, op: &Operation) -> Option<bool> {
        if let Some(idx) = self.rga.lookup(op.id.as_str()) {
            let node = self.rga.node(idx);
            let same = match &op.kind {
                OpKind::Insert { ch, anchor } => {
                    node.client == op.client && node.ch == *ch && self.rga.node(node.parent).id.as_str() == anchor.as_str()
                }
                OpKind::Delete { .. } => false,
            };
            return Some(same);
        }
        if let Some(target) = self.tombstones.target_of(op.id.as_str()) {
            return Some(matches!(&op.kind, OpKind::Delete { target: t } if t == target));
        }
        if let Some(parked) = self.buffer.get(op.id.as_str()) {
            return Some(parked.same_fact(op));
        }
        return None;
    }

    /// Lifecycle status of `op_id`, or `None` if it has never been seen.
    pub fn status(&self, op_id: &str) -> Option<OpStatus> {
        if let Some(idx) = self.rga.lookup(op_id) {
            if self.rga.node(idx).deleted {
                return Some(OpStatus::Tombstoned);
            }
            return Some(OpStatus::Applied);
        }
        if self.tombstones.is_delete(op_id) {
            return Some(OpStatus::Applied);
        }
        if self.buffer.contains(op_id) {
            return Some(OpStatus::Pending);
        }
        return None;
    }

    /// Lazy iterator over the visible text.
    pub fn chars(&self) -> VisibleChars<'_> {
        return snapshot::visible_chars(&self.rga);
    }

    pub fn text(&self) -> String {
        return self.chars().collect();
    }

    pub fn snapshot(&self) -> Snapshot {
        return Snapshot::materialize(self.id.clone(), &self.rga, self.version);
    }

    /// Every element in order, tombstones included.
    pub fn elements(&self) -> Vec<Element> {
        return snapshot::elements(&self.rga);
    }

    pub fn position_of(&self, op_id: &str) -> Option<usize> {
        return self.rga.position_of(op_id);
    }

    pub fn id_at(&self, index: usize) -> Option<&OpId> {
        return self.rga.id_at(index);
    }

    /// Number of visible characters.
    pub fn len(&self) -> usize {
        return self.rga.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.rga.is_empty();
    }

    /// Number of operations integrated so far.
    pub fn applied_len(&self) -> usize {
        return self.applied;
    }

    /// Number of operations waiting in the causal buffer.
    pub fn pending_len(&self) -> usize {
        return self.buffer.len();
    }

    /// The parked operations, in no particular order.
    pub fn pending(&self) -> impl Iterator<Item = &Operation> {
        return self.buffer.iter();
    }

    pub fn tombstone_count(&self) -> usize {
        return self.tombstones.count();
    }

    pub fn buffer_stats(&self, stale_after: Duration) -> BufferStats {
        let stats = self.buffer.stats(Instant::now(), stale_after, self.warn_depth);
        if stats.stale > 0 {
            log::warn!("{}: {} parked operations older than {:?}", self.id, stats.stale, stale_after);
        }
        return stats;
    }

    /// Fingerprint of every operation seen, applied or pending.
    pub fn fingerprint(&self) -> Fingerprint {
        return self.fingerprint;
    }

    pub fn version(&self) -> u64 {
        return self.version;
    }
}
