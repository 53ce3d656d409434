use thiserror::Error;

/// Errors produced by type parsing and validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid container id {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    #[error("unknown container type: {0}")]
    UnknownContainerType(String),

    #[error("unknown member type: {0}")]
    UnknownMemberType(String),
}
