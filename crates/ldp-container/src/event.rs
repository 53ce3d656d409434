use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ldp_types::{MemberType, Metadata, Timestamp};

/// Classification of container domain events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ContainerCreated,
    ContainerUpdated,
    ContainerDeleted,
    MemberAdded,
    MemberRemoved,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContainerCreated => "container_created",
            Self::ContainerUpdated => "container_updated",
            Self::ContainerDeleted => "container_deleted",
            Self::MemberAdded => "member_added",
            Self::MemberRemoved => "member_removed",
        }
    }

    /// Returns `true` for the two membership event kinds.
    pub fn is_membership(&self) -> bool {
        matches!(self, Self::MemberAdded | Self::MemberRemoved)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope shared by every domain event the aggregate produces.
///
/// Events are queued on the aggregate and handed to the dispatch
/// collaborator by the repository once the mutation has been committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerEvent {
    /// Time-ordered unique event id (UUID v7).
    pub id: Uuid,
    pub kind: EventKind,
    pub container_id: String,
    /// The affected member for membership events.
    pub member_id: Option<String>,
    pub member_type: Option<MemberType>,
    pub timestamp: Timestamp,
    /// Event-specific context (container type, parent, changed keys).
    pub metadata: Metadata,
}

impl ContainerEvent {
    pub fn new(kind: EventKind, container_id: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            container_id: container_id.into(),
            member_id: None,
            member_type: None,
            timestamp,
            metadata: Metadata::new(),
        }
    }

    pub fn with_member(mut self, member_id: impl Into<String>, member_type: MemberType) -> Self {
        self.member_id = Some(member_id.into());
        self.member_type = Some(member_type);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
