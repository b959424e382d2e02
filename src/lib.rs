//! Stitch - a merge engine for collaborative plain text.
//!
//! Clients record edits as an append-only log of insert and delete
//! operations, each naming the element it follows by op id. Stitch turns
//! that log into text. Operations may arrive in any order, more than once,
//! or before the element they refer to; every replica that has seen the
//! same set of operations produces the same text.
//!
//! # Quick Start
//!
//! ```
//! use stitch::Engine;
//! use stitch::RawOperation;
//!
//! let engine = Engine::new();
//!
//! // Two clients type at the start of the document concurrently
//! engine.append_operation("doc", &RawOperation::insert("op1", "doc", "alice", 'H', "root")).unwrap();
//! engine.append_operation("doc", &RawOperation::insert("op2", "doc", "bob", 'X', "root")).unwrap();
//!
//! // Alice deletes her H and types i after it
//! engine.append_operation("doc", &RawOperation::delete("op3", "doc", "alice", "op1")).unwrap();
//! engine.append_operation("doc", &RawOperation::insert("op4", "doc", "alice", 'i', "op1")).unwrap();
//!
//! assert_eq!(engine.text("doc").unwrap(), "iX");
//! ```

pub mod config;
pub mod crdt;
pub mod engine;
pub mod error;
pub mod store;

pub use config::EngineConfig;
pub use crdt::document::Document;
pub use crdt::document::OpStatus;
pub use crdt::document::Outcome;
pub use crdt::document::Replayed;
pub use crdt::op::Operation;
pub use crdt::op::RawOperation;
pub use crdt::snapshot::Snapshot;
pub use engine::Engine;
pub use error::Error;
pub use error::MalformedOperation;
pub use error::Result;
pub use error::StoreError;
pub use store::MemoryStore;
pub use store::OpStore;
