//! Per-concern error types. The grammar, the store, and the attribute-path
//! resolver each own their failure modes rather than sharing one enum.

use thiserror::Error;

pub use crate::id::IdError;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("no value at path '{path}'")]
    NoSuchPath { path: String },

    #[error("path '{path}' traverses a non-container value")]
    PathTypeMismatch { path: String },

    #[error("path is empty")]
    EmptyPath,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no entity for id '{id}'")]
    NoSuchEntity { id: String },

    #[error("no schema for id '{id}'")]
    NoSuchSchema { id: String },

    #[error("no instance for id '{id}'")]
    NoSuchInstance { id: String },

    #[error("instance '{instance}' violates schema '{schema}': {detail}")]
    SchemaViolation {
        instance: String,
        schema: String,
        detail: String,
    },

    #[error("'{a}' and '{b}' are incomparable: differing MAJOR or identity")]
    Incomparable { a: String, b: String },

    #[error("cannot cast '{instance}' to '{target}': not backward compatible ({offending:?})")]
    NotCastable {
        instance: String,
        target: String,
        offending: Vec<String>,
    },

    #[error("'{a}' and '{b}' differ in MAJOR version")]
    MajorMismatch { a: String, b: String },

    #[error("malformed query '{query}': {cause}")]
    MalformedQuery { query: String, cause: String },

    #[error(transparent)]
    Id(#[from] IdError),
}
