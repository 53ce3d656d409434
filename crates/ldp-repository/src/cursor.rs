//! Batched, bounded-memory reads over large containers.

use std::sync::Arc;

use ldp_index::{IndexEntry, IndexError, IndexQuery, MembershipIndex, SortOrder};

use crate::context::Context;
use crate::error::{RepositoryError, RepositoryResult};
use crate::lock::LockTable;
use crate::options::ListOptions;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Position {
    Start,
    /// Keyset position: the last insertion sequence returned.
    AfterSeq(u64),
    /// Offset position, for orders that have no stable key.
    AtOffset(u64),
    Done,
}

/// Streams a container's members in batches of at most `batch_size`.
///
/// Insertion-ordered cursors page by sequence number, so members added or
/// removed behind the cursor never shift it. Other orders page by offset
/// and may skip or repeat entries under concurrent mutation.
///
/// Each batch is read under the container's shared lock; no lock is held
/// between batches.
pub struct MemberCursor {
    container_id: String,
    index: Arc<dyn MembershipIndex>,
    locks: Arc<LockTable>,
    options: ListOptions,
    batch_size: usize,
    position: Position,
    yielded: u64,
}

impl MemberCursor {
    pub(crate) fn new(
        container_id: &str,
        index: Arc<dyn MembershipIndex>,
        locks: Arc<LockTable>,
        options: ListOptions,
        batch_size: usize,
    ) -> Self {
        Self {
            container_id: container_id.to_string(),
            index,
            locks,
            options,
            batch_size: batch_size.max(1),
            position: Position::Start,
            yielded: 0,
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Entries returned so far.
    pub fn yielded(&self) -> u64 {
        self.yielded
    }

    pub fn is_exhausted(&self) -> bool {
        self.position == Position::Done
    }

    /// The next batch; empty once the cursor is exhausted.
    pub async fn next_batch(&mut self, ctx: &Context) -> RepositoryResult<Vec<IndexEntry>> {
        if self.position == Position::Done {
            return Ok(Vec::new());
        }
        let remaining = self
            .options
            .limit
            .map_or(u64::MAX, |l| l.saturating_sub(self.yielded));
        let take = (self.batch_size as u64).min(remaining);
        if take == 0 {
            self.position = Position::Done;
            return Ok(Vec::new());
        }

        let batch = {
            let _guard = self.locks.read(ctx, &self.container_id).await?;
            self.fetch(take).map_err(|e| match e {
                IndexError::PartitionNotFound(id) => RepositoryError::NotFound(id),
                other => RepositoryError::Index(other),
            })?
        };

        let len = batch.len() as u64;
        self.yielded += len;
        self.position = if len < take {
            Position::Done
        } else {
            match (self.options.sort, self.position) {
                (SortOrder::Insertion, _) => {
                    Position::AfterSeq(batch.last().map_or(0, |e| e.seq))
                }
                (_, Position::AtOffset(at)) => Position::AtOffset(at + len),
                _ => Position::AtOffset(self.options.offset + len),
            }
        };
        Ok(batch)
    }

    fn fetch(&self, take: u64) -> Result<Vec<IndexEntry>, IndexError> {
        let window = |offset: u64| IndexQuery {
            offset,
            limit: Some(take),
            sort: self.options.sort,
            member_type: self.options.member_type,
        };
        match self.position {
            Position::Start => self.index.select(&self.container_id, &window(self.options.offset)),
            Position::AtOffset(at) => self.index.select(&self.container_id, &window(at)),
            Position::AfterSeq(seq) => self.index.select_after(
                &self.container_id,
                seq,
                usize::try_from(take).unwrap_or(usize::MAX),
                self.options.member_type,
            ),
            Position::Done => Ok(Vec::new()),
        }
    }
}

impl std::fmt::Debug for MemberCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberCursor")
            .field("container_id", &self.container_id)
            .field("batch_size", &self.batch_size)
            .field("position", &self.position)
            .field("yielded", &self.yielded)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use ldp_index::InMemoryMembershipIndex;
    use ldp_types::{Member, MemberType};

    fn index_with(n: i64) -> Arc<dyn MembershipIndex> {
        let index = InMemoryMembershipIndex::new();
        index.create_partition("c").unwrap();
        for i in 0..n {
            let t = if i % 10 == 0 { MemberType::Binary } else { MemberType::Resource };
            let at = DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(i);
            index.insert("c", &Member::new(format!("m{i:05}"), t, at)).unwrap();
        }
        Arc::new(index)
    }

    fn cursor(index: &Arc<dyn MembershipIndex>, options: ListOptions, batch: usize) -> MemberCursor {
        MemberCursor::new("c", Arc::clone(index), Arc::new(LockTable::new()), options, batch)
    }

    #[tokio::test]
    async fn walks_large_container_in_bounded_batches() {
        let index = index_with(10_050);
        let mut cursor = cursor(&index, ListOptions::new(), 500);
        let ctx = Context::background();
        let mut batches = 0;
        let mut last = None;
        loop {
            let batch = cursor.next_batch(&ctx).await.unwrap();
            if batch.is_empty() {
                break;
            }
            assert!(batch.len() <= 500);
            if let Some(prev) = last {
                assert!(batch[0].seq > prev);
            }
            last = batch.last().map(|e| e.seq);
            batches += 1;
        }
        assert_eq!(batches, 21);
        assert_eq!(cursor.yielded(), 10_050);
        assert!(cursor.is_exhausted());
    }

    #[tokio::test]
    async fn honours_offset_limit_and_filter() {
        let index = index_with(100);
        let ctx = Context::background();

        let mut c = cursor(&index, ListOptions::page(95, 50), 3);
        let mut ids = Vec::new();
        loop {
            let batch = c.next_batch(&ctx).await.unwrap();
            if batch.is_empty() {
                break;
            }
            ids.extend(batch.into_iter().map(|e| e.member_id));
        }
        assert_eq!(ids, ["m00095", "m00096", "m00097", "m00098", "m00099"]);

        let mut c = cursor(&index, ListOptions::page(0, 4).of_type(MemberType::Binary), 3);
        let first = c.next_batch(&ctx).await.unwrap();
        let second = c.next_batch(&ctx).await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].member_id, "m00030");
        assert!(c.next_batch(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn newest_first_pages_by_offset() {
        let index = index_with(7);
        let ctx = Context::background();
        let mut c = cursor(&index, ListOptions::new().sorted(SortOrder::NewestFirst), 3);
        let a = c.next_batch(&ctx).await.unwrap();
        let b = c.next_batch(&ctx).await.unwrap();
        let d = c.next_batch(&ctx).await.unwrap();
        assert_eq!(a[0].member_id, "m00006");
        assert_eq!(b[0].member_id, "m00003");
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].member_id, "m00000");
        assert!(c.is_exhausted());
    }

    #[tokio::test]
    async fn removals_behind_the_cursor_do_not_shift_it() {
        let index = index_with(10);
        let ctx = Context::background();
        let mut c = cursor(&index, ListOptions::new(), 4);
        let first = c.next_batch(&ctx).await.unwrap();
        index.remove("c", &first[0].member_id).unwrap();
        index.remove("c", &first[1].member_id).unwrap();
        let second = c.next_batch(&ctx).await.unwrap();
        assert_eq!(second[0].member_id, "m00004");
    }

    #[tokio::test]
    async fn missing_container_is_not_found() {
        let index: Arc<dyn MembershipIndex> = Arc::new(InMemoryMembershipIndex::new());
        let mut c = MemberCursor::new("nope", index, Arc::new(LockTable::new()), ListOptions::new(), 10);
        let err = c.next_batch(&Context::background()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(id) if id == "nope"));
    }
}
