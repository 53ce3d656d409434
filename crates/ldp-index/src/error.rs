//! Error types for the index crate.

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// No partition has been seeded for the container.
    #[error("no index partition for container: {0}")]
    PartitionNotFound(String),

    /// A partition for the container already exists.
    #[error("index partition already exists for container: {0}")]
    PartitionExists(String),

    /// The member is already indexed under the container.
    #[error("member {member} already indexed in container {container}")]
    DuplicateEntry { container: String, member: String },

    /// SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored row could not be decoded.
    #[error("corrupt index row: {0}")]
    Corrupt(String),

    /// Internal backend failure (e.g. a poisoned lock).
    #[error("index backend error: {0}")]
    Backend(String),
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
