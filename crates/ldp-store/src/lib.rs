//! Primary container storage for the LDP container store.
//!
//! The primary store is the durable source of truth for every container:
//! identity, parent pointer, type, metadata and the ordered member list. It
//! is organised as one persisted unit per container. The membership index is
//! derived from it and can always be rebuilt from it.
//!
//! # Storage Backends
//!
//! All backends implement the [`ContainerStore`] trait:
//!
//! - [`InMemoryContainerStore`] -- `HashMap`-based store for tests and embedding
//! - [`FileContainerStore`] -- one checksummed file per container on disk
//!
//! # Design Rules
//!
//! 1. Inserts are create-only: a second insert of the same id fails with
//!    [`StoreError::AlreadyExists`] at the point of the durable write.
//! 2. Updates are compare-and-swap on the record revision.
//! 3. A record is written whole; readers see either the old or the new unit.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod file;
pub mod memory;
pub mod record;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::FileContainerStore;
pub use memory::InMemoryContainerStore;
pub use record::ContainerRecord;
pub use traits::ContainerStore;
