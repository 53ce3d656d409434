//! Membership index for the LDP container store.
//!
//! The index is a secondary, query-optimised record of containment facts:
//! one row per `(container, member)` pair with the member's type, insertion
//! time and an insertion sequence number. It serves listing, pagination,
//! filtering by member type and sorting without touching the primary store,
//! and it can always be re-derived from the primary store's member lists.
//!
//! # Key Types
//!
//! - [`MembershipIndex`] -- The index contract
//! - [`IndexEntry`] -- One membership row
//! - [`IndexQuery`] / [`SortOrder`] -- Windowed, ordered, filtered selects
//! - [`InMemoryMembershipIndex`] -- `BTreeMap`-backed index for tests
//! - [`SqliteMembershipIndex`] -- Durable index on an embedded SQLite database

pub mod entry;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

#[cfg(test)]
mod conformance;

pub use entry::{IndexEntry, IndexQuery, SortOrder};
pub use error::{IndexError, IndexResult};
pub use memory::InMemoryMembershipIndex;
pub use sqlite::SqliteMembershipIndex;
pub use traits::MembershipIndex;
