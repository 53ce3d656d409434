use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::kind::MemberType;

/// Descriptive properties attached to a container.
///
/// Keys are sorted so persisted records and listings are deterministic.
pub type Metadata = BTreeMap<String, String>;

/// A single entry in a container's ordered membership list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Identifier of the member resource or sub-container.
    pub id: String,
    /// Classification used for index filtering and LDP annotations.
    pub member_type: MemberType,
    /// When the member was added; drives "newest first" listings.
    pub added_at: Timestamp,
}

impl Member {
    pub fn new(id: impl Into<String>, member_type: MemberType, added_at: Timestamp) -> Self {
        Self {
            id: id.into(),
            member_type,
            added_at,
        }
    }

    pub fn is_container(&self) -> bool {
        self.member_type == MemberType::Container
    }
}
