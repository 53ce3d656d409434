//! The container aggregate for the LDP container store.
//!
//! A [`Container`] is an in-memory entity that owns its invariants: a valid
//! id, a recognised container type, a duplicate-free ordered member list, and
//! no self-membership. Every mutation bumps `updated_at` and queues a
//! [`ContainerEvent`]; nothing in this crate performs I/O. Durability and
//! cross-container checks (parent existence, cycles, uniqueness of ids) are
//! the repository's job.
//!
//! # Modules
//!
//! - [`container`] — The [`Container`] aggregate and its persisted
//!   [`ContainerSnapshot`]
//! - [`event`] — Domain event envelope ([`ContainerEvent`], [`EventKind`])
//! - [`error`] — [`ContainerError`]

pub mod container;
pub mod error;
pub mod event;

pub use container::{Container, ContainerSnapshot, CREATED_KEY, MODIFIED_KEY};
pub use error::{ContainerError, ContainerResult};
pub use event::{ContainerEvent, EventKind};
