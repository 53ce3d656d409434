//! Foundation types for the LDP container store.
//!
//! This crate provides the shared vocabulary used by every other crate in the
//! workspace: the closed set of container kinds, member classifications, the
//! per-member record kept inside a container, and the collaborator traits
//! (clock, id generator, member classifier) that are injected into the
//! repository rather than implemented by it.
//!
//! # Key Types
//!
//! - [`ContainerType`] — Basic, Direct or Indirect container
//! - [`MemberType`] — Resource, Container or Binary member
//! - [`Member`] — A member id with its classification and insertion time
//! - [`Clock`] / [`SystemClock`] / [`ManualClock`] — Timestamp sources
//! - [`IdGenerator`] / [`UuidV7Generator`] — Fresh container ids
//! - [`MemberClassifier`] / [`DefaultClassifier`] — Member type inference

pub mod classify;
pub mod clock;
pub mod error;
pub mod id;
pub mod kind;
pub mod member;

pub use classify::{DefaultClassifier, MemberClassifier};
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use error::TypeError;
pub use id::{validate_container_id, IdGenerator, UuidV7Generator};
pub use kind::{ContainerType, MemberType};
pub use member::{Member, Metadata};
