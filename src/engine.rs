//! The engine-facing API.
//!
//! `Engine` owns a registry of per-document state and an `OpStore`. Work
//! on different documents proceeds in parallel; work on one document is
//! serialized by that document's mutex, and causal-buffer cascades run
//! inside the same critical section.
//!
//! Key design decisions:
//!
//! 1. **Registry lock is short**: the registry `RwLock` is never held
//!    while applying operations. Its write lock is held while a missing
//!    document is hydrated and published, so a hydration can never race a
//!    removal and publish a log read that is already out of date.
//!
//! 2. **Handles are checked after locking**: a writer locks a document and
//!    then confirms its handle is still the registered one, retrying if it
//!    was removed in between. `remove_document` takes the document lock
//!    before unregistering it, so an in-flight write always lands in the
//!    handle that the next hydration replaces.
//!
//! 3. **Readers never block writers**: each handle keeps the last
//!    materialized snapshot in its own cell. `get_snapshot` only
//!    `try_lock`s the document; if a writer holds it, the cached snapshot
//!    is returned. That snapshot may be stale but was a real state of the
//!    document. Reads of a document with nothing logged return empty
//!    results without registering it.
//!
//! 4. **Validate, admit, persist, integrate**: an operation is only written
//!    to the log after it passed both structural validation and the
//!    document's referential checks, and it is only integrated after the
//!    write succeeded. A store failure leaves memory untouched, so the
//!    caller can retry with the same op id. If the log already holds the
//!    op id for this document but memory does not, the logged row is
//!    integrated so a retry heals the gap.

use std::sync::Arc;

use parking_lot::Mutex;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::config::EngineConfig;
use crate::crdt::buffer::BufferStats;
use crate::crdt::digest::Fingerprint;
use crate::crdt::document::Admission;
use crate::crdt::document::Document;
use crate::crdt::document::OpStatus;
use crate::crdt::document::Outcome;
use crate::crdt::op::Operation;
use crate::crdt::op::RawOperation;
use crate::crdt::primitives::DocId;
use crate::crdt::snapshot::Snapshot;
use crate::crdt::validate::Validator;
use crate::error::Result;
use crate::store::DocumentRow;
use crate::store::MemoryStore;
use crate::store::OpStore;

/// Live state of one document.
struct DocumentHandle {
    /// Single writer per document.
    document: Mutex<Document>,
    /// Last materialized snapshot, swapped whole.
    snapshot: RwLock<Arc<Snapshot>>,
}

impl DocumentHandle {
    fn new(document: Document) -> DocumentHandle {
        let snapshot = Arc::new(document.snapshot());
        return DocumentHandle {
            document: Mutex::new(document),
            snapshot: RwLock::new(snapshot),
        };
    }
}

/// Merges operation streams into documents.
pub struct Engine<S: OpStore = MemoryStore> {
    store: S,
    config: EngineConfig,
    validator: Validator,
    documents: RwLock<FxHashMap<DocId, Arc<DocumentHandle>>>,
}

impl Engine<MemoryStore> {
    /// An engine over an empty in-memory store with default config.
    pub fn new() -> Engine<MemoryStore> {
        return Engine::with_store(MemoryStore::new(), EngineConfig::default());
    }
}

impl Default for Engine<MemoryStore> {
    fn default() -> Self {
        return Self::new();
    }
}

impl<S: OpStore> Engine<S> {
    pub fn with_store(store: S, config: EngineConfig) -> Engine<S> {
        let validator = config.validator();
        return Engine {
            store,
            config,
            validator,
            documents: RwLock::new(FxHashMap::default()),
        };
    }

    pub fn store(&self) -> &S {
        return &self.store;
    }

    pub fn config(&self) -> &EngineConfig {
        return &self.config;
    }

    /// Validate `raw` and apply it to `doc_id`, or park it until its
    /// dependency arrives.
    ///
    /// Idempotent: redelivering an op id that has been seen before returns
    /// `Outcome::Duplicate` and changes nothing.
    pub fn append_operation(&self, doc_id: &str, raw: &RawOperation) -> Result<Outcome> {
        let op = match self.validator.validate(doc_id, raw) {
            Ok(op) => op,
            Err(err) => {
                log::warn!("rejecting {:?} for {}: {}", raw.op_id, doc_id, err);
                return Err(err.into());
            }
        };

        loop {
            let handle = self.handle(&op.doc)?;
            let mut document = handle.document.lock();
            if !self.is_current(&op.doc, &handle) {
                log::debug!("{}: removed while {} waited; retrying", op.doc, op.id);
                continue;
            }
            if document.admit(&op)? == Admission::Duplicate {
                log::debug!("{}: {} already seen", op.doc, op.id);
                return Ok(Outcome::Duplicate);
            }
            if !self.store.append(&op)? {
                return self.integrate_logged(&mut document, op);
            }
            return Ok(document.integrate(op));
        }
    }

    /// `op.id` is already in the log but not in `document`. A row logged
    /// for this document is integrated; one logged elsewhere makes `op` a
    /// duplicate.
    fn integrate_logged(&self, document: &mut Document, op: Operation) -> Result<Outcome> {
        let logged = match self.store.operation(&op.id)? {
            Some(logged) if logged.doc == op.doc => logged,
            _ => {
                log::warn!("{}: {} already logged under another document", op.doc, op.id);
                return Ok(Outcome::Duplicate);
            }
        };
        if !logged.same_fact(&op) {
            log::warn!("{} redelivered with different content; keeping the logged one", op.id);
        }
        if document.admit(&logged)? == Admission::Duplicate {
            return Ok(Outcome::Duplicate);
        }
        log::warn!("{}: {} was logged but missing in memory; integrating it", op.doc, op.id);
        return Ok(document.integrate(logged));
    }

    /// Current text of `doc_id`.
    ///
    /// Rematerializes if the cached snapshot is behind. If the document is
    /// busy with a write, returns the cached snapshot instead of waiting.
    pub fn get_snapshot(&self, doc_id: &str) -> Result<Arc<Snapshot>> {
        let doc_id = DocId::new(doc_id);
        let handle = match self.existing(&doc_id)? {
            Some(handle) => handle,
            None => return Ok(Arc::new(Snapshot::empty(doc_id))),
        };

        let document = match handle.document.try_lock() {
            Some(document) => document,
            None => {
                log::trace!("{} is busy; serving cached snapshot", doc_id);
                return Ok(handle.snapshot.read().clone());
            }
        };
        let cached = handle.snapshot.read().clone();
        if cached.version == document.version() {
            return Ok(cached);
        }
        let fresh = Arc::new(document.snapshot());
        drop(document);

        {
            let mut cell = handle.snapshot.write();
            if fresh.version > cell.version {
                *cell = fresh.clone();
            }
        }
        if self.config.persist_snapshots {
            self.store.put_snapshot(DocumentRow {
                doc_id,
                snapshot: fresh.text.clone(),
                updated_at: fresh.materialized_at,
            })?;
        }
        return Ok(fresh);
    }

    /// Shorthand for the text of `get_snapshot`.
    pub fn text(&self, doc_id: &str) -> Result<String> {
        return Ok(self.get_snapshot(doc_id)?.text.clone());
    }

    /// Reconstruct text from `ops` alone, without touching engine state.
    ///
    /// Rows rejected by validation or the referential checks are skipped.
    pub fn replay(&self, doc_id: &str, ops: &[RawOperation]) -> String {
        let replayed = Document::replay(DocId::new(doc_id), ops, &self.validator);
        if replayed.rejected > 0 {
            log::warn!("{}: replay skipped {} of {} rows", doc_id, replayed.rejected, ops.len());
        }
        return replayed.document.text();
    }

    /// Causal buffer health of `doc_id`.
    pub fn buffer_stats(&self, doc_id: &str) -> Result<BufferStats> {
        return self.with_document(doc_id, |document| document.buffer_stats(self.config.stale_after));
    }

    /// Lifecycle status of an operation in `doc_id`.
    pub fn status(&self, doc_id: &str, op_id: &str) -> Result<Option<OpStatus>> {
        return self.with_document(doc_id, |document| document.status(op_id));
    }

    pub fn fingerprint(&self, doc_id: &str) -> Result<Fingerprint> {
        return self.with_document(doc_id, Document::fingerprint);
    }

    /// Run `f` with the document locked.
    ///
    /// A document with nothing logged is passed as an empty one and is not
    /// registered.
    pub fn with_document<R>(&self, doc_id: &str, f: impl FnOnce(&Document) -> R) -> Result<R> {
        let doc_id = DocId::new(doc_id);
        return match self.existing(&doc_id)? {
            Some(handle) => {
                let document = handle.document.lock();
                Ok(f(&*document))
            }
            None => Ok(f(&self.empty(doc_id))),
        };
    }

    /// Drop the in-memory state of `doc_id`. The log is untouched; the
    /// next access hydrates it again.
    ///
    /// Waits for a write in progress on the document to finish first.
    pub fn remove_document(&self, doc_id: &str) -> bool {
        let handle = match self.documents.read().get(doc_id) {
            Some(handle) => handle.clone(),
            None => return false,
        };
        let _document = handle.document.lock();
        let mut documents = self.documents.write();
        // Someone else may have removed it and hydrated a fresh one
        if !documents.get(doc_id).is_some_and(|current| Arc::ptr_eq(current, &handle)) {
            return false;
        }
        documents.remove(doc_id);
        log::info!("dropped in-memory state of {}", doc_id);
        return true;
    }

    /// Documents currently held in memory.
    pub fn documents(&self) -> Vec<DocId> {
        return self.documents.read().keys().cloned().collect();
    }

    /// The registered handle of `doc_id`, hydrated and published if needed.
    fn handle(&self, doc_id: &DocId) -> Result<Arc<DocumentHandle>> {
        if let Some(handle) = self.documents.read().get(doc_id) {
            return Ok(handle.clone());
        }

        let mut documents = self.documents.write();
        if let Some(handle) = documents.get(doc_id) {
            return Ok(handle.clone());
        }
        let ops = self.store.operations(doc_id)?;
        return Ok(self.publish(&mut documents, doc_id, ops));
    }

    /// Like `handle`, but a document with nothing logged is not published.
    fn existing(&self, doc_id: &DocId) -> Result<Option<Arc<DocumentHandle>>> {
        if let Some(handle) = self.documents.read().get(doc_id) {
            return Ok(Some(handle.clone()));
        }

        let mut documents = self.documents.write();
        if let Some(handle) = documents.get(doc_id) {
            return Ok(Some(handle.clone()));
        }
        let ops = self.store.operations(doc_id)?;
        if ops.is_empty() {
            return Ok(None);
        }
        return Ok(Some(self.publish(&mut documents, doc_id, ops)));
    }

    /// Hydrate `doc_id` from `ops` and register it. Called with the
    /// registry write lock held.
    fn publish(
        &self,
        documents: &mut FxHashMap<DocId, Arc<DocumentHandle>>,
        doc_id: &DocId,
        ops: Vec<Operation>,
    ) -> Arc<DocumentHandle> {
        let handle = Arc::new(DocumentHandle::new(self.hydrate(doc_id, ops)));
        documents.insert(doc_id.clone(), handle.clone());
        return handle;
    }

    /// Whether `handle` is still the registered handle of `doc_id`.
    fn is_current(&self, doc_id: &DocId, handle: &Arc<DocumentHandle>) -> bool {
        return self.documents.read().get(doc_id).is_some_and(|current| Arc::ptr_eq(current, handle));
    }

    fn empty(&self, doc_id: DocId) -> Document {
        return Document::with_warn_depth(doc_id, self.config.pending_warn_depth);
    }

    fn hydrate(&self, doc_id: &DocId, ops: Vec<Operation>) -> Document {
        let mut document = self.empty(doc_id.clone());
        let count = ops.len();
        for op in ops {
            let id = op.id.clone();
            if let Err(err) = document.apply(op) {
                log::warn!("{}: skipping logged operation {}: {}", doc_id, id, err);
            }
        }
        if count > 0 {
            log::info!(
                "hydrated {} from {} logged operations ({} pending)",
                doc_id,
                count,
                document.pending_len()
            );
        }
        return document;
    }
}
