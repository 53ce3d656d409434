//! Error types for the repository crate.

use std::fmt;

use ldp_container::ContainerError;
use ldp_index::IndexError;
use ldp_store::StoreError;

/// Stable, inspectable classification of a repository failure.
///
/// Transport layers map these to status codes; the set does not change
/// when the concrete error types behind it do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidId,
    InvalidType,
    AlreadyExists,
    NotFound,
    ParentNotFound,
    CircularReference,
    /// The hierarchy would grow deeper than the configured `max_depth`.
    DepthExceeded,
    DuplicateMember,
    MemberNotFound,
    /// The member is a child container and must be moved or deleted instead.
    ChildContainer,
    NotEmpty,
    IndexWriteFailed,
    Canceled,
    /// Primary store or index read failure.
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidId => "invalid_id",
            ErrorKind::InvalidType => "invalid_type",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ParentNotFound => "parent_not_found",
            ErrorKind::CircularReference => "circular_reference",
            ErrorKind::DepthExceeded => "depth_exceeded",
            ErrorKind::DuplicateMember => "duplicate_member",
            ErrorKind::MemberNotFound => "member_not_found",
            ErrorKind::ChildContainer => "child_container",
            ErrorKind::NotEmpty => "not_empty",
            ErrorKind::IndexWriteFailed => "index_write_failed",
            ErrorKind::Canceled => "canceled",
            ErrorKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Aggregate validation failed before any I/O.
    #[error(transparent)]
    Invalid(#[from] ContainerError),

    #[error("container already exists: {0}")]
    AlreadyExists(String),

    #[error("container not found: {0}")]
    NotFound(String),

    #[error("parent {parent} of container {id} not found")]
    ParentNotFound { id: String, parent: String },

    /// The operation would make a container its own ancestor, or a cycle
    /// was found while walking the hierarchy.
    #[error("circular reference: {id} cannot be placed under {parent}")]
    CircularReference { id: String, parent: String },

    #[error("container {id} would sit deeper than the maximum depth of {max_depth}")]
    DepthExceeded { id: String, max_depth: usize },

    /// Child containers leave their parent through `delete_container` or
    /// `move_container`, never through `remove_member`.
    #[error("{member} is a child container of {container}")]
    ChildContainer { container: String, member: String },

    #[error("container {id} still has {members} member(s)")]
    NotEmpty { id: String, members: usize },

    /// The membership index rejected a write; nothing was committed.
    #[error("index write failed for container {container}: {source}")]
    IndexWriteFailed {
        container: String,
        #[source]
        source: IndexError,
    },

    /// The execution context was cancelled or its deadline passed before
    /// the first durable write.
    #[error("operation canceled: {0}")]
    Canceled(&'static str),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl RepositoryError {
    /// The stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepositoryError::Invalid(err) => match err {
                ContainerError::InvalidId { .. }
                | ContainerError::InvalidMemberId { .. }
                | ContainerError::SelfMembership(_) => ErrorKind::InvalidId,
                ContainerError::InvalidType(_) => ErrorKind::InvalidType,
                ContainerError::DuplicateMember { .. } => ErrorKind::DuplicateMember,
                ContainerError::MemberNotFound { .. } => ErrorKind::MemberNotFound,
                ContainerError::CircularReference { .. } => ErrorKind::CircularReference,
            },
            RepositoryError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            RepositoryError::NotFound(_) => ErrorKind::NotFound,
            RepositoryError::ParentNotFound { .. } => ErrorKind::ParentNotFound,
            RepositoryError::CircularReference { .. } => ErrorKind::CircularReference,
            RepositoryError::DepthExceeded { .. } => ErrorKind::DepthExceeded,
            RepositoryError::ChildContainer { .. } => ErrorKind::ChildContainer,
            RepositoryError::NotEmpty { .. } => ErrorKind::NotEmpty,
            RepositoryError::IndexWriteFailed { .. } => ErrorKind::IndexWriteFailed,
            RepositoryError::Canceled(_) => ErrorKind::Canceled,
            RepositoryError::Store(StoreError::NotFound(_)) => ErrorKind::NotFound,
            RepositoryError::Store(StoreError::AlreadyExists(_)) => ErrorKind::AlreadyExists,
            RepositoryError::Store(_) | RepositoryError::Index(_) | RepositoryError::Config(_) => {
                ErrorKind::Storage
            }
        }
    }

    pub(crate) fn index_write(container: &str, source: IndexError) -> Self {
        RepositoryError::IndexWriteFailed {
            container: container.to_string(),
            source,
        }
    }
}

/// Convenience alias for repository results.
pub type RepositoryResult<T> = Result<T, RepositoryError>;
