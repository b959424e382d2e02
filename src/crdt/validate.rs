//! Structural validation of incoming rows.
//!
//! Validation is pure: it looks at one row in isolation and never consults
//! document state. Whether the row's dependency has been seen yet is the
//! causal buffer's concern, and whether it points at the right kind of
//! element is checked by the document once the referenced element is known.

use crate::error::IdField;
use crate::error::MalformedOperation;

use super::op::DELETE;
use super::op::INSERT;
use super::op::OpKind;
use super::op::Operation;
use super::op::RawOperation;
use super::primitives::Anchor;
use super::primitives::ClientId;
use super::primitives::DocId;
use super::primitives::OpId;
use super::primitives::ROOT;

/// Default maximum identifier length in bytes.
pub const DEFAULT_MAX_ID_LEN: usize = 128;

/// Turns raw rows into typed operations, or says why it can't.
#[derive(Clone, Copy, Debug)]
pub struct Validator {
    max_id_len: usize,
}

impl Validator {
    pub fn new(max_id_len: usize) -> Validator {
        return Validator { max_id_len };
    }

    /// Validate a row addressed to `doc_id`.
    pub fn validate(&self, doc_id: &str, raw: &RawOperation) -> Result<Operation, MalformedOperation> {
        self.check_id(IdField::OpId, &raw.op_id)?;
        if raw.op_id == ROOT {
            return Err(MalformedOperation::ReservedId(raw.op_id.clone()));
        }
        self.check_id(IdField::DocId, &raw.doc_id)?;
        if raw.doc_id != doc_id {
            return Err(MalformedOperation::WrongDocument {
                op_id: raw.op_id.clone(),
                expected: doc_id.to_string(),
                found: raw.doc_id.clone(),
            });
        }
        self.check_id(IdField::ClientId, &raw.client_id)?;

        let after_id = match &raw.after_id {
            Some(after_id) => after_id,
            None => return Err(MalformedOperation::MissingAfterId(raw.op_id.clone())),
        };
        self.check_id(IdField::AfterId, after_id)?;
        if *after_id == raw.op_id {
            return Err(MalformedOperation::SelfReference(raw.op_id.clone()));
        }

        let kind = match raw.kind.as_str() {
            INSERT => {
                let ch = match &raw.ch {
                    Some(ch) => single_char(&raw.op_id, ch)?,
                    None => return Err(MalformedOperation::MissingChar(raw.op_id.clone())),
                };
                OpKind::Insert {
                    ch,
                    anchor: Anchor::parse(after_id),
                }
            }
            DELETE => {
                if raw.ch.is_some() {
                    return Err(MalformedOperation::UnexpectedChar(raw.op_id.clone()));
                }
                if after_id == ROOT {
                    return Err(MalformedOperation::DeleteRoot(raw.op_id.clone()));
                }
                OpKind::Delete {
                    target: OpId::new(after_id.as_str()),
                }
            }
            other => return Err(MalformedOperation::UnknownKind(other.to_string())),
        };

        return Ok(Operation {
            id: OpId::new(raw.op_id.as_str()),
            doc: DocId::new(raw.doc_id.as_str()),
            client: ClientId::new(raw.client_id.as_str()),
            kind,
            created_at: raw.created_at,
        });
    }

    /// Identifiers are non-empty, bounded, and free of whitespace and
    /// control characters.
    fn check_id(&self, field: IdField, value: &str) -> Result<(), MalformedOperation> {
        if value.is_empty() {
            return Err(MalformedOperation::EmptyId { field });
        }
        let well_formed = value.len() <= self.max_id_len
            && !value.chars().any(|c| c.is_whitespace() || c.is_control());
        if !well_formed {
            return Err(MalformedOperation::InvalidId {
                field,
                value: value.to_string(),
            });
        }
        return Ok(());
    }
}

impl Default for Validator {
    fn default() -> Self {
        return Validator::new(DEFAULT_MAX_ID_LEN);
    }
}

fn single_char(op_id: &str, value: &str) -> Result<char, MalformedOperation> {
    let mut chars = value.chars();
    if let (Some(ch), None) = (chars.next(), chars.next()) {
        return Ok(ch);
    }
    return Err(MalformedOperation::InvalidChar {
        op_id: op_id.to_string(),
        value: value.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(raw: &RawOperation) -> Result<Operation, MalformedOperation> {
        return Validator::default().validate("doc", raw);
    }

    #[test]
    fn accepts_insert_after_root() {
        let op = validate(&RawOperation::insert("op1", "doc", "alice", 'H', "root")).unwrap();
        assert_eq!(op.id, OpId::new("op1"));
        assert_eq!(op.kind, OpKind::Insert { ch: 'H', anchor: Anchor::Root });
    }

    #[test]
    fn accepts_delete() {
        let op = validate(&RawOperation::delete("op3", "doc", "alice", "op1")).unwrap();
        assert_eq!(op.kind, OpKind::Delete { target: OpId::new("op1") });
    }

    #[test]
    fn accepts_multibyte_char() {
        let op = validate(&RawOperation::insert("op1", "doc", "alice", 'é', "root")).unwrap();
        assert_eq!(op.kind, OpKind::Insert { ch: 'é', anchor: Anchor::Root });
    }

    #[test]
    fn rejects_empty_op_id() {
        let raw = RawOperation::insert("", "doc", "alice", 'H', "root");
        assert_eq!(validate(&raw), Err(MalformedOperation::EmptyId { field: IdField::OpId }));
    }

    #[test]
    fn rejects_whitespace_in_ids() {
        let raw = RawOperation::insert("op 1", "doc", "alice", 'H', "root");
        assert!(matches!(
            validate(&raw),
            Err(MalformedOperation::InvalidId { field: IdField::OpId, .. })
        ));

        let raw = RawOperation::insert("op1", "doc", "alice", 'H', "op\n0");
        assert!(matches!(
            validate(&raw),
            Err(MalformedOperation::InvalidId { field: IdField::AfterId, .. })
        ));
    }

    #[test]
    fn rejects_overlong_id() {
        let long = "x".repeat(DEFAULT_MAX_ID_LEN + 1);
        let raw = RawOperation::insert(&long, "doc", "alice", 'H', "root");
        assert!(matches!(validate(&raw), Err(MalformedOperation::InvalidId { .. })));
    }

    #[test]
    fn rejects_root_as_op_id() {
        let raw = RawOperation::insert("root", "doc", "alice", 'H', "op0");
        assert_eq!(validate(&raw), Err(MalformedOperation::ReservedId("root".to_string())));
    }

    #[test]
    fn rejects_unknown_kind() {
        let mut raw = RawOperation::insert("op1", "doc", "alice", 'H', "root");
        raw.kind = "update".to_string();
        assert_eq!(validate(&raw), Err(MalformedOperation::UnknownKind("update".to_string())));
    }

    #[test]
    fn char_required_iff_insert() {
        let mut raw = RawOperation::insert("op1", "doc", "alice", 'H', "root");
        raw.ch = None;
        assert_eq!(validate(&raw), Err(MalformedOperation::MissingChar("op1".to_string())));

        let mut raw = RawOperation::delete("op2", "doc", "alice", "op1");
        raw.ch = Some("x".to_string());
        assert_eq!(validate(&raw), Err(MalformedOperation::UnexpectedChar("op2".to_string())));
    }

    #[test]
    fn char_must_be_single_scalar() {
        let mut raw = RawOperation::insert("op1", "doc", "alice", 'H', "root");
        raw.ch = Some("Hi".to_string());
        assert!(matches!(validate(&raw), Err(MalformedOperation::InvalidChar { .. })));

        raw.ch = Some(String::new());
        assert!(matches!(validate(&raw), Err(MalformedOperation::InvalidChar { .. })));
    }

    #[test]
    fn after_id_required() {
        let mut raw = RawOperation::insert("op1", "doc", "alice", 'H', "root");
        raw.after_id = None;
        assert_eq!(validate(&raw), Err(MalformedOperation::MissingAfterId("op1".to_string())));
    }

    #[test]
    fn rejects_self_reference() {
        let raw = RawOperation::insert("op1", "doc", "alice", 'H', "op1");
        assert_eq!(validate(&raw), Err(MalformedOperation::SelfReference("op1".to_string())));

        let raw = RawOperation::delete("op2", "doc", "alice", "op2");
        assert_eq!(validate(&raw), Err(MalformedOperation::SelfReference("op2".to_string())));
    }

    #[test]
    fn rejects_delete_of_root() {
        let raw = RawOperation::delete("op2", "doc", "alice", "root");
        assert_eq!(validate(&raw), Err(MalformedOperation::DeleteRoot("op2".to_string())));
    }

    #[test]
    fn rejects_wrong_document() {
        let raw = RawOperation::insert("op1", "other", "alice", 'H', "root");
        assert!(matches!(validate(&raw), Err(MalformedOperation::WrongDocument { .. })));
    }

    #[test]
    fn keeps_created_at_for_diagnostics() {
        let now = chrono::Utc::now();
        let raw = RawOperation::insert("op1", "doc", "alice", 'H', "root").at(now);
        assert_eq!(validate(&raw).unwrap().created_at, Some(now));
    }
}
