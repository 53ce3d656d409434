use std::path::PathBuf;

use ldp_container::ContainerError;

/// Errors from primary store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record exists for the id.
    #[error("container record not found: {0}")]
    NotFound(String),

    /// A record with this id already exists.
    #[error("container record already exists: {0}")]
    AlreadyExists(String),

    /// The stored revision differs from the one the writer read.
    #[error("revision mismatch for {id}: expected {expected}, found {actual}")]
    RevisionMismatch {
        id: String,
        expected: u64,
        actual: u64,
    },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted unit failed its checksum or could not be decoded.
    #[error("corrupt record at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// A decoded record violates aggregate invariants.
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] ContainerError),

    /// Internal backend failure (e.g. a poisoned lock).
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
