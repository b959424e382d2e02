//! The operation log and snapshot cache.
//!
//! Two tables back the engine:
//!
//! ```text
//! documents(doc_id PRIMARY KEY, snapshot, updated_at)
//! crdt_ops(op_id PRIMARY KEY, doc_id REFERENCES documents, type, char,
//!          after_id, client_id, created_at)
//! ```
//!
//! `crdt_ops` is append-only and authoritative. `documents` is a cache of
//! materialized text that can always be rebuilt from the log. `OpStore`
//! is the contract the engine needs from whatever holds these tables;
//! `MemoryStore` implements it in process.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use chrono::DateTime;
use chrono::Utc;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde::Serialize;

use crate::crdt::op::Operation;
use crate::crdt::op::RawOperation;
use crate::crdt::primitives::DocId;
use crate::crdt::primitives::OpId;
use crate::error::StoreError;

/// A row of the documents table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRow {
    pub doc_id: DocId,
    /// Cached visible text.
    pub snapshot: String,
    pub updated_at: DateTime<Utc>,
}

/// Persistence the engine depends on.
///
/// Implementations must be safe to share between threads. The engine
/// serializes appends per document but not across documents.
pub trait OpStore: Send + Sync {
    /// Append `op` to the log. Returns `false` without writing if a row
    /// with the same op id already exists. Creates the document row if
    /// there isn't one.
    fn append(&self, op: &Operation) -> Result<bool, StoreError>;

    /// Every logged operation of `doc_id`, in append order.
    fn operations(&self, doc_id: &DocId) -> Result<Vec<Operation>, StoreError>;

    /// Whether an operation with this id has been logged.
    fn contains(&self, op_id: &OpId) -> Result<bool, StoreError>;

    /// The logged operation with this id, whichever document it belongs to.
    fn operation(&self, op_id: &OpId) -> Result<Option<Operation>, StoreError>;

    /// Overwrite the cached snapshot row. Last writer wins.
    fn put_snapshot(&self, row: DocumentRow) -> Result<(), StoreError>;

    /// The cached snapshot row of `doc_id`, if any.
    fn snapshot(&self, doc_id: &DocId) -> Result<Option<DocumentRow>, StoreError>;
}

#[derive(Default)]
struct Tables {
    ops: Vec<Operation>,
    by_id: FxHashMap<OpId, usize>,
    by_doc: FxHashMap<DocId, Vec<usize>>,
    documents: FxHashMap<DocId, DocumentRow>,
}

/// In-memory `OpStore`.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        return MemoryStore::default();
    }

    /// Make every call fail with `StoreError::Unavailable` until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Total number of logged operations across all documents.
    pub fn len(&self) -> usize {
        return self.tables.read().ops.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.tables.read().ops.is_empty();
    }

    /// The log of `doc_id` in row form.
    pub fn rows(&self, doc_id: &DocId) -> Vec<RawOperation> {
        let tables = self.tables.read();
        return match tables.by_doc.get(doc_id) {
            Some(indices) => indices.iter().map(|&i| tables.ops[i].to_raw()).collect(),
            None => Vec::new(),
        };
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        return Ok(());
    }
}

impl OpStore for MemoryStore {
    fn append(&self, op: &Operation) -> Result<bool, StoreError> {
        self.check()?;
        let mut tables = self.tables.write();
        if tables.by_id.contains_key(op.id.as_str()) {
            return Ok(false);
        }
        let idx = tables.ops.len();
        tables.ops.push(op.clone());
        tables.by_id.insert(op.id.clone(), idx);
        tables.by_doc.entry(op.doc.clone()).or_default().push(idx);
        tables.documents.entry(op.doc.clone()).or_insert_with(|| DocumentRow {
            doc_id: op.doc.clone(),
            snapshot: String::new(),
            updated_at: Utc::now(),
        });
        return Ok(true);
    }

    fn operations(&self, doc_id: &DocId) -> Result<Vec<Operation>, StoreError> {
        self.check()?;
        let tables = self.tables.read();
        return Ok(match tables.by_doc.get(doc_id) {
            Some(indices) => indices.iter().map(|&i| tables.ops[i].clone()).collect(),
            None => Vec::new(),
        });
    }

    fn contains(&self, op_id: &OpId) -> Result<bool, StoreError> {
        self.check()?;
        return Ok(self.tables.read().by_id.contains_key(op_id.as_str()));
    }

    fn operation(&self, op_id: &OpId) -> Result<Option<Operation>, StoreError> {
        self.check()?;
        let tables = self.tables.read();
        return Ok(tables.by_id.get(op_id.as_str()).map(|&i| tables.ops[i].clone()));
    }

    fn put_snapshot(&self, row: DocumentRow) -> Result<(), StoreError> {
        self.check()?;
        self.tables.write().documents.insert(row.doc_id.clone(), row);
        return Ok(());
    }

    fn snapshot(&self, doc_id: &DocId) -> Result<Option<DocumentRow>, StoreError> {
        self.check()?;
        return Ok(self.tables.read().documents.get(doc_id).cloned());
    }
}
