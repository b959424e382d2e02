//! The merge engine for one document.
//!
//! Operations flow through these modules in order: `validate` turns a raw
//! row into an `Operation`, `buffer` holds it until its dependency is
//! known, `rga` attaches inserts to the tree (ordering siblings with
//! `conflict`), `tombstone` handles deletes, and `snapshot` projects the
//! result into text. `document` ties them together.

pub mod buffer;
pub mod conflict;
pub mod digest;
pub mod document;
pub mod op;
pub mod primitives;
pub mod rga;
pub mod snapshot;
pub mod tombstone;
pub mod validate;
