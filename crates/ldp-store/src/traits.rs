use crate::error::StoreResult;
use crate::record::ContainerRecord;

/// Durable primary store of container records, one unit per container.
///
/// All implementations must satisfy these invariants:
/// - `insert` is create-only and is the uniqueness point for container ids.
///   Ids passed to `retire` stay taken forever.
/// - `update` only succeeds when the stored revision equals
///   `expected_revision`, and the new record's revision is written as given.
/// - A record is replaced atomically; concurrent readers never see a torn
///   record.
/// - All I/O errors are propagated, never silently ignored.
pub trait ContainerStore: Send + Sync {
    /// Read the record for `id`.
    ///
    /// Returns `Ok(None)` if the container does not exist.
    fn read(&self, id: &str) -> StoreResult<Option<ContainerRecord>>;

    /// Durably write a new record. Fails with `AlreadyExists` if the id is
    /// taken.
    fn insert(&self, record: &ContainerRecord) -> StoreResult<()>;

    /// Replace an existing record if its stored revision is
    /// `expected_revision`.
    fn update(&self, record: &ContainerRecord, expected_revision: u64) -> StoreResult<()>;

    /// Delete a record without reserving its id. Used to back out an insert
    /// that was never acknowledged. Returns `true` if it existed.
    fn delete(&self, id: &str) -> StoreResult<bool>;

    /// Delete a record and leave a tombstone, so later inserts of the same
    /// id fail with `AlreadyExists`. Returns `true` if the record existed.
    fn retire(&self, id: &str) -> StoreResult<bool>;

    /// Whether `id` carries a tombstone.
    fn is_retired(&self, id: &str) -> StoreResult<bool>;

    /// All stored container ids, sorted.
    fn ids(&self) -> StoreResult<Vec<String>>;

    /// Check whether a record exists.
    fn exists(&self, id: &str) -> StoreResult<bool> {
        Ok(self.read(id)?.is_some())
    }

    /// Read multiple records in a batch.
    ///
    /// Default implementation calls `read()` for each id.
    fn read_batch(&self, ids: &[String]) -> StoreResult<Vec<Option<ContainerRecord>>> {
        ids.iter().map(|id| self.read(id)).collect()
    }

    /// Number of stored containers.
    fn len(&self) -> StoreResult<usize> {
        Ok(self.ids()?.len())
    }
}
