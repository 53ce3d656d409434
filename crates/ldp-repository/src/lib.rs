//! Transactional repository for the LDP container store.
//!
//! Combines a primary [`ContainerStore`](ldp_store::ContainerStore) and a
//! [`MembershipIndex`](ldp_index::MembershipIndex) behind one contract,
//! [`ContainerRepository`]. Every membership mutation writes the index row
//! and the primary record as one logical unit under a per-container lock;
//! a failure on either side leaves a state the index can be rebuilt from.
//!
//! # Key Types
//!
//! - [`ContainerRepository`] -- The repository contract
//! - [`StoreRepository`] -- Implementation over any store and index
//! - [`Context`] -- Cancellation and deadlines for every call
//! - [`LockTable`] -- Keyed per-container locks, reclaimed when idle
//! - [`MemberCursor`] -- Batched reads over large containers
//! - [`BroadcastDispatcher`] -- In-process event fan-out
//! - [`RepositoryConfig`] -- TOML configuration and backend selection

pub mod config;
pub mod context;
pub mod cursor;
pub mod error;
pub mod events;
pub mod lock;
pub mod options;
pub mod recovery;
pub mod repository;
pub mod store_repository;


pub use config::{
    open_repository, open_repository_with, IndexBackend, RepositoryConfig, RepositoryLimits,
    StoreBackend,
};
pub use context::Context;
pub use cursor::MemberCursor;
pub use error::{ErrorKind, RepositoryError, RepositoryResult};
pub use events::{BroadcastDispatcher, EventDispatcher, EventFilter, EventStream, NoopDispatcher};
pub use lock::{ContainerGuard, LockTable};
pub use options::{ListOptions, MemberPage, MetadataUpdate};
pub use recovery::{ConsistencyReport, Divergence, RebuildSummary};
pub use repository::{drain_cursor, ContainerRepository};
pub use store_repository::{StoreRepository, StoreRepositoryBuilder};
