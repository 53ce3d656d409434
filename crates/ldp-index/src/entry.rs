//! Index row and query types.

use serde::{Deserialize, Serialize};

use ldp_types::{MemberType, Timestamp};

/// One membership row: `member_id` is contained in `container_id`.
///
/// The row does not own the member's lifecycle; it only records
/// containment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub container_id: String,
    pub member_id: String,
    pub member_type: MemberType,
    pub inserted_at: Timestamp,
    /// Insertion sequence, strictly increasing across the whole index.
    pub seq: u64,
}

/// Ordering of a windowed select.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    /// Oldest first, in insertion order.
    #[default]
    Insertion,
    /// Most recently inserted first.
    NewestFirst,
    /// Lexicographic by member id.
    MemberId,
}

/// A windowed, ordered, optionally filtered select over one partition.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexQuery {
    pub offset: u64,
    /// `None` selects everything after `offset`.
    pub limit: Option<u64>,
    pub sort: SortOrder,
    pub member_type: Option<MemberType>,
}

impl IndexQuery {
    /// Select everything in insertion order.
    pub fn all() -> Self {
        Self::default()
    }

    /// A `limit`/`offset` window in insertion order.
    pub fn window(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn sorted(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn of_type(mut self, member_type: MemberType) -> Self {
        self.member_type = Some(member_type);
        self
    }

    /// Returns `true` if the entry passes the member-type filter.
    pub fn matches(&self, entry: &IndexEntry) -> bool {
        self.member_type.map_or(true, |t| t == entry.member_type)
    }
}
