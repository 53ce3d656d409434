//! Keyed per-container locks.
//!
//! One `tokio::sync::RwLock` per container id, created on first use and
//! removed from the table as soon as nobody holds or waits on it. Writers
//! serialize per container; unrelated containers never contend.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::context::Context;
use crate::error::RepositoryResult;

type LockMap = DashMap<String, Arc<RwLock<()>>>;

enum Held {
    Read(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
    Write(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
}

/// A held per-container lock. Dropping it releases the lock and reclaims
/// the table entry if it has become idle.
pub struct ContainerGuard {
    held: Option<Held>,
    key: String,
    locks: Arc<LockMap>,
}

impl ContainerGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self.held, Some(Held::Write(_)))
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        // Release first so the strong count below only sees the table's Arc.
        self.held.take();
        reclaim(&self.locks, &self.key);
    }
}

impl std::fmt::Debug for ContainerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerGuard")
            .field("key", &self.key)
            .field("exclusive", &self.is_exclusive())
            .finish()
    }
}

fn reclaim(locks: &LockMap, key: &str) {
    locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
}

/// Table of keyed container locks.
#[derive(Default)]
pub struct LockTable {
    locks: Arc<LockMap>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, key: &str) -> Arc<RwLock<()>> {
        Arc::clone(self.locks.entry(key.to_string()).or_default().value())
    }

    /// Shared access to `key`, for reads that must not observe a
    /// half-committed write.
    pub async fn read(&self, ctx: &Context, key: &str) -> RepositoryResult<ContainerGuard> {
        let lock = self.handle(key);
        match ctx.run(lock.read_owned()).await {
            Ok(guard) => Ok(self.guard(key, Held::Read(guard))),
            Err(err) => {
                reclaim(&self.locks, key);
                Err(err)
            }
        }
    }

    /// Exclusive access to `key`.
    pub async fn write(&self, ctx: &Context, key: &str) -> RepositoryResult<ContainerGuard> {
        let lock = self.handle(key);
        match ctx.run(lock.write_owned()).await {
            Ok(guard) => Ok(self.guard(key, Held::Write(guard))),
            Err(err) => {
                reclaim(&self.locks, key);
                Err(err)
            }
        }
    }

    /// Exclusive access to several keys. Keys are deduplicated and taken
    /// in sorted order; empty keys (the root's parent) are skipped.
    pub async fn write_many<'a, I>(&self, ctx: &Context, keys: I) -> RepositoryResult<Vec<ContainerGuard>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let keys: BTreeSet<&str> = keys.into_iter().filter(|k| !k.is_empty()).collect();
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.write(ctx, key).await?);
        }
        Ok(guards)
    }

    /// Number of lock entries currently in the table.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    fn guard(&self, key: &str, held: Held) -> ContainerGuard {
        ContainerGuard {
            held: Some(held),
            key: key.to_string(),
            locks: Arc::clone(&self.locks),
        }
    }
}

impl std::fmt::Debug for LockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockTable")
            .field("entries", &self.locks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn entries_are_reclaimed_when_idle() {
        let table = LockTable::new();
        let ctx = Context::background();
        {
            let guard = table.write(&ctx, "a").await.unwrap();
            assert!(guard.is_exclusive());
            assert_eq!(table.len(), 1);
        }
        assert!(table.is_empty());

        let r1 = table.read(&ctx, "a").await.unwrap();
        let r2 = table.read(&ctx, "a").await.unwrap();
        assert_eq!(table.len(), 1);
        drop(r1);
        assert_eq!(table.len(), 1);
        drop(r2);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn writers_serialize_per_key() {
        let table = Arc::new(LockTable::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let table = Arc::clone(&table);
            let inside = Arc::clone(&inside);
            handles.push(tokio::spawn(async move {
                let _g = table.write(&Context::background(), "k").await.unwrap();
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn unrelated_keys_do_not_block() {
        let table = LockTable::new();
        let ctx = Context::background();
        let _a = table.write(&ctx, "a").await.unwrap();
        let b = tokio::time::timeout(Duration::from_millis(100), table.write(&ctx, "b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn cancelled_wait_leaves_no_entry_behind() {
        let table = LockTable::new();
        let holder = table.write(&Context::background(), "busy").await.unwrap();

        let ctx = Context::with_timeout(Duration::from_millis(20));
        let err = table.write(&ctx, "busy").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Canceled);
        assert_eq!(table.len(), 1);

        drop(holder);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn write_many_sorts_and_dedups() {
        let table = Arc::new(LockTable::new());
        let ctx = Context::background();
        let guards = table.write_many(&ctx, ["b", "a", "", "b"]).await.unwrap();
        let keys: Vec<&str> = guards.iter().map(|g| g.key()).collect();
        assert_eq!(keys, ["a", "b"]);
        drop(guards);

        // Opposite orders cannot deadlock.
        let t1 = {
            let table = Arc::clone(&table);
            tokio::spawn(async move {
                for _ in 0..50 {
                    let _g = table.write_many(&Context::background(), ["x", "y"]).await.unwrap();
                }
            })
        };
        let t2 = {
            let table = Arc::clone(&table);
            tokio::spawn(async move {
                for _ in 0..50 {
                    let _g = table.write_many(&Context::background(), ["y", "x"]).await.unwrap();
                }
            })
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            t1.await.unwrap();
            t2.await.unwrap();
        })
        .await
        .unwrap();
    }
}
