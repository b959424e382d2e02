//! Identifier types for operations, replicas and documents.
//!
//! # Identifier Hierarchy
//!
//! - `DocId`: names a document; every operation belongs to exactly one
//! - `ClientId`: names the replica that originated an operation
//! - `OpId`: globally unique name of an operation, assigned by its client
//! - `Anchor`: what an insert is attached after (an `OpId` or the root)
//!
//! All three string ids compare lexicographically by their bytes, which is
//! what sibling ordering relies on. None of them carry meaning beyond
//! identity: a client id never grants authority over anything.

use std::borrow::Borrow;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// The reserved `after_id` naming the start of every document.
pub const ROOT: &str = "root";

/// An operation identifier.
///
/// Immutable once assigned; re-delivery of the same id is a no-op.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpId(String);

/// A replica identifier, used only to break ties between siblings.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

/// A document identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(String);

impl OpId {
    /// Wrap a string as an operation id. Does not validate.
    pub fn new(id: impl Into<String>) -> OpId {
        return OpId(id.into());
    }

    pub fn as_str(&self) -> &str {
        return &self.0;
    }
}

impl ClientId {
    /// Wrap a string as a client id. Does not validate.
    pub fn new(id: impl Into<String>) -> ClientId {
        return ClientId(id.into());
    }

    pub fn as_str(&self) -> &str {
        return &self.0;
    }
}

impl DocId {
    /// Wrap a string as a document id. Does not validate.
    pub fn new(id: impl Into<String>) -> DocId {
        return DocId(id.into());
    }

    pub fn as_str(&self) -> &str {
        return &self.0;
    }
}

// Borrow<str> lets the hash maps keyed by these ids be probed with a &str.
// The derived Hash of a single-field newtype hashes exactly like the field.

impl Borrow<str> for OpId {
    fn borrow(&self) -> &str {
        return &self.0;
    }
}

impl Borrow<str> for DocId {
    fn borrow(&self) -> &str {
        return &self.0;
    }
}

impl fmt::Debug for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "OpId({})", self.0);
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "ClientId({})", self.0);
    }
}

impl fmt::Debug for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "DocId({})", self.0);
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(&self.0);
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(&self.0);
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(&self.0);
    }
}

/// The element an insert is causally anchored after.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Anchor {
    /// The start of the document.
    Root,
    /// Directly after the element created by this insert.
    After(OpId),
}

impl Anchor {
    /// Interpret a raw `after_id`, mapping the sentinel to `Root`.
    pub fn parse(raw: &str) -> Anchor {
        if raw == ROOT {
            return Anchor::Root;
        }
        return Anchor::After(OpId::new(raw));
    }

    /// The raw `after_id` form of this anchor.
    pub fn as_str(&self) -> &str {
        match self {
            Anchor::Root => ROOT,
            Anchor::After(id) => id.as_str(),
        }
    }

    /// The operation this anchor depends on, if any.
    pub fn op_id(&self) -> Option<&OpId> {
        match self {
            Anchor::Root => None,
            Anchor::After(id) => Some(id),
        }
    }
}
