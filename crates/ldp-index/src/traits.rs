use ldp_types::{Member, MemberType};

use crate::entry::{IndexEntry, IndexQuery};
use crate::error::IndexResult;

/// Secondary index of container membership.
///
/// Rows are grouped in one partition per container. A partition is seeded
/// when the container is created and dropped when it is deleted; inserting
/// into a missing partition fails, so rows can never point at a container
/// that was never created.
///
/// Implementations must be thread-safe and make every method atomic.
pub trait MembershipIndex: Send + Sync {
    /// Seed an empty partition. Fails with `PartitionExists` if present.
    fn create_partition(&self, container_id: &str) -> IndexResult<()>;

    /// Drop a partition and all its rows. Returns `false` if it was absent.
    fn drop_partition(&self, container_id: &str) -> IndexResult<bool>;

    fn has_partition(&self, container_id: &str) -> IndexResult<bool>;

    /// All partition ids, sorted.
    fn partitions(&self) -> IndexResult<Vec<String>>;

    /// Insert a membership row and return it with its assigned sequence.
    fn insert(&self, container_id: &str, member: &Member) -> IndexResult<IndexEntry>;

    /// Delete a membership row. Returns `false` if it was absent.
    fn remove(&self, container_id: &str, member_id: &str) -> IndexResult<bool>;

    fn contains(&self, container_id: &str, member_id: &str) -> IndexResult<bool>;

    /// Number of rows in the partition, optionally of one member type.
    fn count(&self, container_id: &str, member_type: Option<MemberType>) -> IndexResult<u64>;

    /// Windowed, ordered select. An offset past the end yields no rows.
    fn select(&self, container_id: &str, query: &IndexQuery) -> IndexResult<Vec<IndexEntry>>;

    /// Keyset select in insertion order: up to `limit` rows with
    /// `seq > after_seq`.
    fn select_after(
        &self,
        container_id: &str,
        after_seq: u64,
        limit: usize,
        member_type: Option<MemberType>,
    ) -> IndexResult<Vec<IndexEntry>>;

    /// Atomically replace the partition's rows with `members`, in order,
    /// creating the partition if needed. Used for recovery.
    fn replace_partition(&self, container_id: &str, members: &[Member]) -> IndexResult<()>;
}
