//! Domain error types
//!
//! Errors raised while constructing or validating domain values.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid relative path (absolute, escaping, or malformed)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid hash format (expected lowercase SHA-256 hex)
    #[error("Invalid hash format: {0}")]
    InvalidHash(String),

    /// Two nodes claimed the same path inside one snapshot
    #[error("Duplicate path in snapshot: {0}")]
    DuplicatePath(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}
