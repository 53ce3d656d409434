//! Validation errors raised by the container aggregate.

use ldp_types::TypeError;

/// Errors produced by aggregate construction and mutation.
///
/// All of these are detected before any I/O happens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContainerError {
    #[error("invalid container id {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    #[error("invalid container type: {0}")]
    InvalidType(String),

    #[error("invalid member id {member:?} for container {container}")]
    InvalidMemberId { container: String, member: String },

    #[error("container {0} cannot be a member of itself")]
    SelfMembership(String),

    #[error("member {member} already present in container {container}")]
    DuplicateMember { container: String, member: String },

    #[error("member {member} not found in container {container}")]
    MemberNotFound { container: String, member: String },

    #[error("container {id} cannot have {parent} as parent: circular reference")]
    CircularReference { id: String, parent: String },
}

impl From<TypeError> for ContainerError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidId { id, reason } => Self::InvalidId { id, reason },
            TypeError::UnknownContainerType(name) => Self::InvalidType(name),
            TypeError::UnknownMemberType(name) => Self::InvalidType(name),
        }
    }
}

/// Convenience alias for aggregate results.
pub type ContainerResult<T> = Result<T, ContainerError>;
