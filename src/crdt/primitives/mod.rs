//! Shared primitives for the merge engine.
//!
//! ## IDs
//! - `OpId`: operation identifier, globally unique
//! - `ClientId`: replica identifier, used only for tie-breaking
//! - `DocId`: document identifier
//! - `Anchor`: the element an insert attaches after, or the root sentinel

pub mod id;

// Re-exports for convenience
pub use id::Anchor;
pub use id::ClientId;
pub use id::DocId;
pub use id::OpId;
pub use id::ROOT;
