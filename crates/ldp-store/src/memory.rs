use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::record::ContainerRecord;
use crate::traits::ContainerStore;

/// In-memory, HashMap-based container store.
///
/// Intended for tests and embedding. Records are held behind a `RwLock` and
/// cloned on read/write.
pub struct InMemoryContainerStore {
    records: RwLock<HashMap<String, ContainerRecord>>,
    /// Ids of retired containers. Always locked after `records`.
    retired: RwLock<HashSet<String>>,
}

impl InMemoryContainerStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            retired: RwLock::new(HashSet::new()),
        }
    }

    /// Remove all records and tombstones from the store.
    pub fn clear(&self) -> StoreResult<()> {
        let mut map = self.records.write().map_err(poisoned)?;
        map.clear();
        self.retired.write().map_err(poisoned)?.clear();
        Ok(())
    }
}

impl Default for InMemoryContainerStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Backend(format!("lock poisoned: {e}"))
}

impl ContainerStore for InMemoryContainerStore {
    fn read(&self, id: &str) -> StoreResult<Option<ContainerRecord>> {
        let map = self.records.read().map_err(poisoned)?;
        Ok(map.get(id).cloned())
    }

    fn insert(&self, record: &ContainerRecord) -> StoreResult<()> {
        let mut map = self.records.write().map_err(poisoned)?;
        let retired = self.retired.read().map_err(poisoned)?;
        if map.contains_key(record.id()) || retired.contains(record.id()) {
            return Err(StoreError::AlreadyExists(record.id().to_string()));
        }
        map.insert(record.id().to_string(), record.clone());
        Ok(())
    }

    fn update(&self, record: &ContainerRecord, expected_revision: u64) -> StoreResult<()> {
        let mut map = self.records.write().map_err(poisoned)?;
        let current = map
            .get_mut(record.id())
            .ok_or_else(|| StoreError::NotFound(record.id().to_string()))?;
        if current.revision != expected_revision {
            return Err(StoreError::RevisionMismatch {
                id: record.id().to_string(),
                expected: expected_revision,
                actual: current.revision,
            });
        }
        *current = record.clone();
        Ok(())
    }

    fn delete(&self, id: &str) -> StoreResult<bool> {
        let mut map = self.records.write().map_err(poisoned)?;
        Ok(map.remove(id).is_some())
    }

    fn retire(&self, id: &str) -> StoreResult<bool> {
        let mut map = self.records.write().map_err(poisoned)?;
        self.retired.write().map_err(poisoned)?.insert(id.to_string());
        Ok(map.remove(id).is_some())
    }

    fn is_retired(&self, id: &str) -> StoreResult<bool> {
        Ok(self.retired.read().map_err(poisoned)?.contains(id))
    }

    fn ids(&self) -> StoreResult<Vec<String>> {
        let map = self.records.read().map_err(poisoned)?;
        let mut ids: Vec<String> = map.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn exists(&self, id: &str) -> StoreResult<bool> {
        let map = self.records.read().map_err(poisoned)?;
        Ok(map.contains_key(id))
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.records.read().map_err(poisoned)?.len())
    }
}

impl std::fmt::Debug for InMemoryContainerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.records.read().map(|m| m.len()).unwrap_or_default();
        f.debug_struct("InMemoryContainerStore")
            .field("record_count", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use ldp_container::Container;
    use ldp_types::{ContainerType, MemberType};
    use std::sync::Arc;
    use std::thread;

    fn record(id: &str) -> ContainerRecord {
        let c = Container::new(id, "", ContainerType::Basic, DateTime::<Utc>::UNIX_EPOCH).unwrap();
        ContainerRecord::new(&c)
    }

    #[test]
    fn insert_and_read() {
        let store = InMemoryContainerStore::new();
        store.insert(&record("a")).unwrap();
        let read = store.read("a").unwrap().expect("should exist");
        assert_eq!(read.id(), "a");
        assert!(store.exists("a").unwrap());
        assert!(store.read("b").unwrap().is_none());
    }

    #[test]
    fn insert_is_create_only() {
        let store = InMemoryContainerStore::new();
        store.insert(&record("a")).unwrap();
        let err = store.insert(&record("a")).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(id) if id == "a"));
    }

    #[test]
    fn update_checks_revision() {
        let store = InMemoryContainerStore::new();
        let first = record("a");
        store.insert(&first).unwrap();

        let mut c = first.to_container().unwrap();
        c.add_member("m", MemberType::Resource, DateTime::<Utc>::UNIX_EPOCH)
            .unwrap();
        let second = first.next(&c);
        store.update(&second, 1).unwrap();

        // Stale writer still holding revision 1.
        let err = store.update(&first.next(&c), 1).unwrap_err();
        assert!(matches!(
            err,
            StoreError::RevisionMismatch { expected: 1, actual: 2, .. }
        ));
        assert_eq!(store.read("a").unwrap().unwrap().member_count(), 1);
    }

    #[test]
    fn update_missing_is_not_found() {
        let store = InMemoryContainerStore::new();
        assert!(matches!(
            store.update(&record("x"), 1),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn delete_and_ids() {
        let store = InMemoryContainerStore::new();
        for id in ["c", "a", "b"] {
            store.insert(&record(id)).unwrap();
        }
        assert_eq!(store.ids().unwrap(), vec!["a", "b", "c"]);
        assert!(store.delete("b").unwrap());
        assert!(!store.delete("b").unwrap());
        assert_eq!(store.len().unwrap(), 2);
        store.clear().unwrap();
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn retired_ids_stay_taken() {
        let store = InMemoryContainerStore::new();
        store.insert(&record("old")).unwrap();
        assert!(store.retire("old").unwrap());
        assert!(!store.exists("old").unwrap());
        assert!(store.is_retired("old").unwrap());
        assert!(matches!(
            store.insert(&record("old")),
            Err(StoreError::AlreadyExists(id)) if id == "old"
        ));
        assert!(store.ids().unwrap().is_empty());

        // A plain delete backs out an insert and leaves the id free.
        store.insert(&record("draft")).unwrap();
        assert!(store.delete("draft").unwrap());
        assert!(!store.is_retired("draft").unwrap());
        store.insert(&record("draft")).unwrap();
    }

    #[test]
    fn concurrent_inserts_single_winner() {
        let store = Arc::new(InMemoryContainerStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.insert(&record("shared")).is_ok())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic"))
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn debug_format() {
        let store = InMemoryContainerStore::new();
        store.insert(&record("x")).unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryContainerStore"));
        assert!(debug.contains("record_count"));
    }
}
