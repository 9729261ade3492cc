//! Crate-wide error type.
//!
//! One variant per error kind in the engine's error handling design: the
//! caller sees `NotFound` / `InvalidArgument` / `SchemaValidation` /
//! `Conflict` / `Backend` / `Cancelled` and nothing else. Adapter crates
//! (the reference `rusqlite` port included here) convert their own error
//! types into `Backend` at the boundary; no backend error type appears in
//! an engine-level signature.

use thiserror::Error;

use crate::validate::ValidationError;

/// Core error type for the Lattice engine.
#[derive(Error, Debug)]
pub enum LatticeError {
    /// A referenced collection, document, schema, or other entity is missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Null/empty required input, or out-of-range pagination.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Schema enforcement rejected the document.
    #[error("schema validation failed with {} error(s)", .0.len())]
    SchemaValidation(Vec<ValidationError>),

    /// A lock is held by another hostname; the caller may retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A wrapped repository failure. Retryable at the caller's discretion.
    #[error("backend error: {0}")]
    Backend(#[from] anyhow::Error),

    /// Cooperative cancellation via the caller's token.
    #[error("operation cancelled")]
    Cancelled,
}

/// Result type alias using [`LatticeError`].
pub type Result<T> = std::result::Result<T, LatticeError>;

impl From<rusqlite::Error> for LatticeError {
    fn from(e: rusqlite::Error) -> Self {
        LatticeError::Backend(anyhow::Error::new(e))
    }
}

impl From<std::io::Error> for LatticeError {
    fn from(e: std::io::Error) -> Self {
        LatticeError::Backend(anyhow::Error::new(e))
    }
}
