//! Request and response shapes for listing and metadata updates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use ldp_index::{IndexEntry, SortOrder};
use ldp_types::MemberType;

/// Pagination, ordering and filtering for member listings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    pub offset: u64,
    /// `None` uses the repository's `default_page_limit`, so a listing
    /// without a limit is still one page. Read a whole container with
    /// `member_cursor` (or `drain_cursor`) instead.
    pub limit: Option<u64>,
    pub sort: SortOrder,
    pub member_type: Option<MemberType>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(offset: u64, limit: u64) -> Self {
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
}

/// One window of a container's members.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPage {
    pub entries: Vec<IndexEntry>,
    /// Members matching the filter, across all pages.
    pub total: u64,
    pub offset: u64,
    /// The effective limit after clamping.
    pub limit: u64,
}

impl MemberPage {
    pub fn member_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.member_id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if members remain past this page.
    pub fn has_more(&self) -> bool {
        self.offset.saturating_add(self.entries.len() as u64) < self.total
    }
}

/// A batch of metadata changes applied atomically.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataUpdate {
    pub set: BTreeMap<String, String>,
    pub remove: Vec<String>,
}

impl MetadataUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set.insert(key.into(), value.into());
        self
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.remove.push(key.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }
}
