//! Error types for the versioned store.

use crate::types::RecordId;
use thiserror::Error;

/// Main error type for store operations.
///
/// Constraint violations and lookup misses are reported here; protocol
/// violations (closing a non-topmost scope, committing past the current
/// revision) are usage errors and panic instead.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found in table {table}: {id}")]
    RecordNotFound { table: &'static str, id: RecordId },

    #[error("No record in ordering {ordering} of table {table} for key {key}")]
    KeyNotFound {
        table: &'static str,
        ordering: &'static str,
        key: String,
    },

    #[error("Unique ordering {ordering} on table {table} already holds key {key}")]
    UniqueViolation {
        table: &'static str,
        ordering: &'static str,
        key: String,
    },

    #[error("Table {table} has no ordering named {ordering}")]
    UnknownOrdering { table: &'static str, ordering: String },

    #[error("Ordering {ordering} on table {table} is keyed by a different type")]
    OrderingTypeMismatch {
        table: &'static str,
        ordering: &'static str,
    },

    #[error("Table already registered: {0}")]
    TableExists(&'static str),

    #[error("Table not registered: {0}")]
    TableNotRegistered(&'static str),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
