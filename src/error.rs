//! Error types.
//!
//! A malformed operation is the caller's problem: it is reported and never
//! retried. A dangling reference is not an error at all (the operation is
//! parked), and a duplicate delivery is a success.

use std::fmt;

use thiserror::Error;

/// Which identifier field of an operation a validation error is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdField {
    OpId,
    DocId,
    ClientId,
    AfterId,
}

impl fmt::Display for IdField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdField::OpId => "op_id",
            IdField::DocId => "doc_id",
            IdField::ClientId => "client_id",
            IdField::AfterId => "after_id",
        };
        return f.write_str(name);
    }
}

/// A structural or referential violation in an incoming operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedOperation {
    #[error("{field} is empty")]
    EmptyId { field: IdField },

    #[error("{field} {value:?} is not a well-formed identifier")]
    InvalidId { field: IdField, value: String },

    #[error("op_id {0:?} is reserved for the document root")]
    ReservedId(String),

    #[error("unrecognized operation type {0:?}")]
    UnknownKind(String),

    #[error("insert {0} carries no char")]
    MissingChar(String),

    #[error("delete {0} must not carry a char")]
    UnexpectedChar(String),

    #[error("char {value:?} of {op_id} is not exactly one character")]
    InvalidChar { op_id: String, value: String },

    #[error("{0} has no after_id")]
    MissingAfterId(String),

    #[error("delete {0} targets the document root")]
    DeleteRoot(String),

    #[error("{op_id} belongs to document {found}, not {expected}")]
    WrongDocument {
        op_id: String,
        expected: String,
        found: String,
    },

    #[error("{0} references itself")]
    SelfReference(String),

    #[error("{op_id} closes a dependency cycle through {through}")]
    CyclicReference { op_id: String, through: String },

    #[error("delete {op_id} targets {target}, which is itself a delete")]
    DeleteOfDelete { op_id: String, target: String },

    #[error("insert {op_id} is anchored after {anchor}, which is a delete")]
    AnchoredToDelete { op_id: String, anchor: String },
}

/// A failure of the external operation store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Any error surfaced by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Malformed(#[from] MalformedOperation),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, Error>;
