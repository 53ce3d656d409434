//! In-memory membership index.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use ldp_types::{Member, MemberType};

use crate::entry::{IndexEntry, IndexQuery, SortOrder};
use crate::error::{IndexError, IndexResult};
use crate::traits::MembershipIndex;

#[derive(Default)]
struct Partition {
    rows: BTreeMap<u64, IndexEntry>,
    by_member: HashMap<String, u64>,
}

#[derive(Default)]
struct IndexState {
    partitions: HashMap<String, Partition>,
    next_seq: u64,
}

impl IndexState {
    fn partition(&self, container_id: &str) -> IndexResult<&Partition> {
        self.partitions
            .get(container_id)
            .ok_or_else(|| IndexError::PartitionNotFound(container_id.to_string()))
    }

    fn entry_for(&mut self, container_id: &str, member: &Member) -> IndexEntry {
        self.next_seq += 1;
        IndexEntry {
            container_id: container_id.to_string(),
            member_id: member.id.clone(),
            member_type: member.member_type,
            inserted_at: member.added_at,
            seq: self.next_seq,
        }
    }
}

/// `BTreeMap`-backed index for tests and embedding.
///
/// Insertion-order selects walk the partition without copying it;
/// `NewestFirst` and `MemberId` selects sort a filtered copy.
pub struct InMemoryMembershipIndex {
    state: RwLock<IndexState>,
}

impl InMemoryMembershipIndex {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
        }
    }
}

impl Default for InMemoryMembershipIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> IndexError {
    IndexError::Backend(format!("lock poisoned: {e}"))
}

fn window<'a, I>(iter: I, query: &IndexQuery) -> Vec<IndexEntry>
where
    I: Iterator<Item = &'a IndexEntry>,
{
    let offset = usize::try_from(query.offset).unwrap_or(usize::MAX);
    let limit = query
        .limit
        .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
        .unwrap_or(usize::MAX);
    iter.filter(|e| query.matches(e))
        .skip(offset)
        .take(limit)
        .cloned()
        .collect()
}

impl MembershipIndex for InMemoryMembershipIndex {
    fn create_partition(&self, container_id: &str) -> IndexResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        if state.partitions.contains_key(container_id) {
            return Err(IndexError::PartitionExists(container_id.to_string()));
        }
        state
            .partitions
            .insert(container_id.to_string(), Partition::default());
        Ok(())
    }

    fn drop_partition(&self, container_id: &str) -> IndexResult<bool> {
        let mut state = self.state.write().map_err(poisoned)?;
        Ok(state.partitions.remove(container_id).is_some())
    }

    fn has_partition(&self, container_id: &str) -> IndexResult<bool> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.partitions.contains_key(container_id))
    }

    fn partitions(&self) -> IndexResult<Vec<String>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut ids: Vec<String> = state.partitions.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn insert(&self, container_id: &str, member: &Member) -> IndexResult<IndexEntry> {
        let mut state = self.state.write().map_err(poisoned)?;
        let partition = state.partition(container_id)?;
        if partition.by_member.contains_key(&member.id) {
            return Err(IndexError::DuplicateEntry {
                container: container_id.to_string(),
                member: member.id.clone(),
            });
        }
        let entry = state.entry_for(container_id, member);
        let partition = state
            .partitions
            .get_mut(container_id)
            .ok_or_else(|| IndexError::PartitionNotFound(container_id.to_string()))?;
        partition.by_member.insert(member.id.clone(), entry.seq);
        partition.rows.insert(entry.seq, entry.clone());
        Ok(entry)
    }

    fn remove(&self, container_id: &str, member_id: &str) -> IndexResult<bool> {
        let mut state = self.state.write().map_err(poisoned)?;
        let partition = state
            .partitions
            .get_mut(container_id)
            .ok_or_else(|| IndexError::PartitionNotFound(container_id.to_string()))?;
        match partition.by_member.remove(member_id) {
            Some(seq) => {
                partition.rows.remove(&seq);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn contains(&self, container_id: &str, member_id: &str) -> IndexResult<bool> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .partitions
            .get(container_id)
            .is_some_and(|p| p.by_member.contains_key(member_id)))
    }

    fn count(&self, container_id: &str, member_type: Option<MemberType>) -> IndexResult<u64> {
        let state = self.state.read().map_err(poisoned)?;
        let partition = state.partition(container_id)?;
        let count = match member_type {
            None => partition.rows.len(),
            Some(t) => partition.rows.values().filter(|e| e.member_type == t).count(),
        };
        Ok(count as u64)
    }

    fn select(&self, container_id: &str, query: &IndexQuery) -> IndexResult<Vec<IndexEntry>> {
        let state = self.state.read().map_err(poisoned)?;
        let partition = state.partition(container_id)?;
        let rows = match query.sort {
            SortOrder::Insertion => window(partition.rows.values(), query),
            SortOrder::NewestFirst => {
                let mut sorted: Vec<&IndexEntry> = partition.rows.values().collect();
                sorted.sort_by(|a, b| b.inserted_at.cmp(&a.inserted_at).then(b.seq.cmp(&a.seq)));
                window(sorted.into_iter(), query)
            }
            SortOrder::MemberId => {
                let mut sorted: Vec<&IndexEntry> = partition.rows.values().collect();
                sorted.sort_by(|a, b| a.member_id.cmp(&b.member_id));
                window(sorted.into_iter(), query)
            }
        };
        Ok(rows)
    }

    fn select_after(
        &self,
        container_id: &str,
        after_seq: u64,
        limit: usize,
        member_type: Option<MemberType>,
    ) -> IndexResult<Vec<IndexEntry>> {
        let state = self.state.read().map_err(poisoned)?;
        let partition = state.partition(container_id)?;
        Ok(partition
            .rows
            .range(after_seq.saturating_add(1)..)
            .map(|(_, e)| e)
            .filter(|e| member_type.map_or(true, |t| t == e.member_type))
            .take(limit)
            .cloned()
            .collect())
    }

    fn replace_partition(&self, container_id: &str, members: &[Member]) -> IndexResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        let mut partition = Partition::default();
        for member in members {
            if partition.by_member.contains_key(&member.id) {
                return Err(IndexError::DuplicateEntry {
                    container: container_id.to_string(),
                    member: member.id.clone(),
                });
            }
            let entry = state.entry_for(container_id, member);
            partition.by_member.insert(member.id.clone(), entry.seq);
            partition.rows.insert(entry.seq, entry);
        }
        state.partitions.insert(container_id.to_string(), partition);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryMembershipIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let partitions = self
            .state
            .read()
            .map(|s| s.partitions.len())
            .unwrap_or_default();
        f.debug_struct("InMemoryMembershipIndex")
            .field("partitions", &partitions)
            .finish()
    }
}
