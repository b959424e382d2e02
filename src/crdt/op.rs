//! Operations as they are stored in the append-only log.
//!
//! Each client produces operations that, when replayed in any order,
//! reconstruct the document. Operations name positions by the id of the
//! element they follow rather than by index, so they survive concurrent
//! edits unchanged:
//! - Insert: "I inserted this character after element X (or the root)"
//! - Delete: "I deleted element X"
//!
//! `RawOperation` mirrors a row of the `crdt_ops` table exactly and is what
//! arrives over the wire. `Operation` is the validated, typed form the
//! engine works with; the only way to get one from a raw row is through
//! the validator.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use super::primitives::Anchor;
use super::primitives::ClientId;
use super::primitives::DocId;
use super::primitives::OpId;

/// The `type` value of an insert row.
pub const INSERT: &str = "insert";

/// The `type` value of a delete row.
pub const DELETE: &str = "delete";

/// One row of the operation log, unvalidated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOperation {
    pub op_id: String,
    pub doc_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "char", default, skip_serializing_if = "Option::is_none")]
    pub ch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_id: Option<String>,
    pub client_id: String,
    /// Origination time. Advisory only; never used for ordering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl RawOperation {
    /// Build an insert row. Use `"root"` as `after_id` to insert at the start.
    pub fn insert(op_id: &str, doc_id: &str, client_id: &str, ch: char, after_id: &str) -> RawOperation {
        return RawOperation {
            op_id: op_id.to_string(),
            doc_id: doc_id.to_string(),
            kind: INSERT.to_string(),
            ch: Some(ch.to_string()),
            after_id: Some(after_id.to_string()),
            client_id: client_id.to_string(),
            created_at: None,
        };
    }

    /// Build a delete row removing the element created by `target`.
    pub fn delete(op_id: &str, doc_id: &str, client_id: &str, target: &str) -> RawOperation {
        return RawOperation {
            op_id: op_id.to_string(),
            doc_id: doc_id.to_string(),
            kind: DELETE.to_string(),
            ch: None,
            after_id: Some(target.to_string()),
            client_id: client_id.to_string(),
            created_at: None,
        };
    }

    /// Stamp the row with an origination time.
    pub fn at(mut self, created_at: DateTime<Utc>) -> RawOperation {
        self.created_at = Some(created_at);
        return self;
    }
}

/// What a validated operation does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpKind {
    /// Insert `ch` directly after `anchor`.
    Insert { ch: char, anchor: Anchor },
    /// Tombstone the element created by `target`.
    Delete { target: OpId },
}

/// A validated operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operation {
    pub id: OpId,
    pub doc: DocId,
    pub client: ClientId,
    pub kind: OpKind,
    pub created_at: Option<DateTime<Utc>>,
}

impl Operation {
    /// The operation that must be applied before this one can be, if any.
    ///
    /// For an insert this is its anchor; for a delete, its target.
    pub fn dependency(&self) -> Option<&OpId> {
        match &self.kind {
            OpKind::Insert { anchor, .. } => anchor.op_id(),
            OpKind::Delete { target } => Some(target),
        }
    }

    pub fn is_insert(&self) -> bool {
        return matches!(self.kind, OpKind::Insert { .. });
    }

    pub fn is_delete(&self) -> bool {
        return matches!(self.kind, OpKind::Delete { .. });
    }

    /// True if both describe the same logical fact.
    ///
    /// `created_at` is ignored: it is advisory and may be restamped by
    /// intermediaries without changing what the operation means.
    pub fn same_fact(&self, other: &Operation) -> bool {
        return self.id == other.id
            && self.doc == other.doc
            && self.client == other.client
            && self.kind == other.kind;
    }

    /// Convert back into the row form.
    pub fn to_raw(&self) -> RawOperation {
        let (kind, ch, after_id) = match &self.kind {
            OpKind::Insert { ch, anchor } => (INSERT, Some(ch.to_string()), anchor.as_str()),
            OpKind::Delete { target } => (DELETE, None, target.as_str()),
        };
        return RawOperation {
            op_id: self.id.to_string(),
            doc_id: self.doc.to_string(),
            kind: kind.to_string(),
            ch,
            after_id: Some(after_id.to_string()),
            client_id: self.client.to_string(),
            created_at: self.created_at,
        };
    }
}
