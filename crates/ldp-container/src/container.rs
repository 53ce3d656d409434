//! The [`Container`] aggregate.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use ldp_types::{validate_container_id, ContainerType, Member, MemberType, Metadata, Timestamp};

use crate::error::{ContainerError, ContainerResult};
use crate::event::{ContainerEvent, EventKind};

/// Metadata key mirroring `created_at` (RFC 3339).
pub const CREATED_KEY: &str = "created";
/// Metadata key mirroring `updated_at` (RFC 3339).
pub const MODIFIED_KEY: &str = "modified";

const TITLE_KEY: &str = "title";
const DESCRIPTION_KEY: &str = "description";

/// Persisted state of a container, without the uncommitted event queue.
///
/// This is what storage backends serialize; [`Container::restore`] turns it
/// back into an aggregate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    pub id: String,
    pub parent_id: String,
    pub container_type: ContainerType,
    pub members: Vec<Member>,
    pub metadata: Metadata,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A node in the container hierarchy.
///
/// Invariants held after every operation:
/// - `id` is a valid, non-empty path segment
/// - members are unique and never include the container itself
/// - `parent_id` is never the container's own id
/// - `container_type` never changes
#[derive(Clone, Debug)]
pub struct Container {
    id: String,
    parent_id: String,
    container_type: ContainerType,
    members: Vec<Member>,
    member_ids: HashSet<String>,
    metadata: Metadata,
    created_at: Timestamp,
    updated_at: Timestamp,
    events: Vec<ContainerEvent>,
}

impl Container {
    /// Construct a new, not yet durable container and queue
    /// `container_created`.
    ///
    /// The parent is not looked up here; an empty `parent_id` makes a root.
    pub fn new(
        id: impl Into<String>,
        parent_id: impl Into<String>,
        container_type: ContainerType,
        now: Timestamp,
    ) -> ContainerResult<Self> {
        let id = id.into();
        let parent_id = parent_id.into();
        validate_container_id(&id)?;
        if parent_id == id {
            return Err(ContainerError::CircularReference {
                id,
                parent: parent_id,
            });
        }

        let mut metadata = Metadata::new();
        metadata.insert(CREATED_KEY.into(), now.to_rfc3339());
        metadata.insert(MODIFIED_KEY.into(), now.to_rfc3339());

        let created = ContainerEvent::new(EventKind::ContainerCreated, id.clone(), now)
            .with_meta("container_type", container_type.as_str())
            .with_meta("parent_id", parent_id.clone());

        Ok(Self {
            id,
            parent_id,
            container_type,
            members: Vec::new(),
            member_ids: HashSet::new(),
            metadata,
            created_at: now,
            updated_at: now,
            events: vec![created],
        })
    }

    /// Like [`Container::new`] but parses the container type from its name,
    /// failing with [`ContainerError::InvalidType`] for unknown names.
    pub fn with_type_name(
        id: impl Into<String>,
        parent_id: impl Into<String>,
        container_type: &str,
        now: Timestamp,
    ) -> ContainerResult<Self> {
        Self::new(id, parent_id, Self::parse_type(container_type)?, now)
    }

    /// Parse a container type name (`"basic"`, `"ldp:DirectContainer"`, ...).
    pub fn parse_type(name: &str) -> ContainerResult<ContainerType> {
        Ok(name.parse()?)
    }

    /// Rebuild an aggregate from persisted state. No events are queued.
    pub fn restore(snapshot: ContainerSnapshot) -> ContainerResult<Self> {
        let member_ids = snapshot.members.iter().map(|m| m.id.clone()).collect();
        let container = Self {
            id: snapshot.id,
            parent_id: snapshot.parent_id,
            container_type: snapshot.container_type,
            members: snapshot.members,
            member_ids,
            metadata: snapshot.metadata,
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
            events: Vec::new(),
        };
        container.validate()?;
        Ok(container)
    }

    /// Capture the persistent state of this container.
    pub fn snapshot(&self) -> ContainerSnapshot {
        ContainerSnapshot {
            id: self.id.clone(),
            parent_id: self.parent_id.clone(),
            container_type: self.container_type,
            members: self.members.clone(),
            metadata: self.metadata.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    // ---------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_empty()
    }

    pub fn container_type(&self) -> ContainerType {
        self.container_type
    }

    /// Members in insertion order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member_ids(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.id.as_str())
    }

    pub fn contains_member(&self, member_id: &str) -> bool {
        self.member_ids.contains(member_id)
    }

    pub fn member(&self, member_id: &str) -> Option<&Member> {
        if !self.contains_member(member_id) {
            return None;
        }
        self.members.iter().find(|m| m.id == member_id)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata_value(TITLE_KEY)
    }

    pub fn description(&self) -> Option<&str> {
        self.metadata_value(DESCRIPTION_KEY)
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    // ---------------------------------------------------------------
    // Membership
    // ---------------------------------------------------------------

    /// Append `member_id` to the membership list and queue `member_added`.
    pub fn add_member(
        &mut self,
        member_id: impl Into<String>,
        member_type: MemberType,
        now: Timestamp,
    ) -> ContainerResult<()> {
        let member_id = member_id.into();
        if member_id.is_empty() || member_id.chars().any(char::is_control) {
            return Err(ContainerError::InvalidMemberId {
                container: self.id.clone(),
                member: member_id,
            });
        }
        if member_id == self.id {
            return Err(ContainerError::SelfMembership(member_id));
        }
        if self.member_ids.contains(&member_id) {
            return Err(ContainerError::DuplicateMember {
                container: self.id.clone(),
                member: member_id,
            });
        }

        self.member_ids.insert(member_id.clone());
        self.members
            .push(Member::new(member_id.clone(), member_type, now));
        self.touch(now);
        self.events.push(
            ContainerEvent::new(EventKind::MemberAdded, self.id.clone(), now)
                .with_member(member_id, member_type),
        );
        Ok(())
    }

    /// Remove `member_id`, keeping the relative order of the remaining
    /// members, and queue `member_removed`. Returns the removed entry.
    pub fn remove_member(&mut self, member_id: &str, now: Timestamp) -> ContainerResult<Member> {
        if !self.member_ids.remove(member_id) {
            return Err(ContainerError::MemberNotFound {
                container: self.id.clone(),
                member: member_id.to_string(),
            });
        }
        let position = self
            .members
            .iter()
            .position(|m| m.id == member_id)
            .ok_or_else(|| ContainerError::MemberNotFound {
                container: self.id.clone(),
                member: member_id.to_string(),
            })?;
        let removed = self.members.remove(position);
        self.touch(now);
        self.events.push(
            ContainerEvent::new(EventKind::MemberRemoved, self.id.clone(), now)
                .with_member(removed.id.clone(), removed.member_type),
        );
        Ok(removed)
    }

    // ---------------------------------------------------------------
    // Metadata and hierarchy
    // ---------------------------------------------------------------

    /// Set a metadata entry and queue `container_updated`.
    ///
    /// The `created` and `modified` entries are owned by the aggregate;
    /// writes to them are ignored.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>, now: Timestamp) {
        let key = key.into();
        if key == CREATED_KEY || key == MODIFIED_KEY {
            return;
        }
        self.metadata.insert(key.clone(), value.into());
        self.touch(now);
        self.events.push(
            ContainerEvent::new(EventKind::ContainerUpdated, self.id.clone(), now)
                .with_meta("set", key),
        );
    }

    /// Remove a metadata entry, returning its previous value.
    pub fn remove_metadata(&mut self, key: &str, now: Timestamp) -> Option<String> {
        if key == CREATED_KEY || key == MODIFIED_KEY {
            return None;
        }
        let previous = self.metadata.remove(key)?;
        self.touch(now);
        self.events.push(
            ContainerEvent::new(EventKind::ContainerUpdated, self.id.clone(), now)
                .with_meta("removed", key),
        );
        Some(previous)
    }

    pub fn set_title(&mut self, title: impl Into<String>, now: Timestamp) {
        self.set_metadata(TITLE_KEY, title, now);
    }

    pub fn set_description(&mut self, description: impl Into<String>, now: Timestamp) {
        self.set_metadata(DESCRIPTION_KEY, description, now);
    }

    /// Point this container at a new parent (empty for root).
    ///
    /// Only the trivial self-parent cycle can be detected here; deeper
    /// cycles require walking the stored hierarchy.
    pub fn reparent(&mut self, parent_id: impl Into<String>, now: Timestamp) -> ContainerResult<()> {
        let parent_id = parent_id.into();
        if parent_id == self.id {
            return Err(ContainerError::CircularReference {
                id: self.id.clone(),
                parent: parent_id,
            });
        }
        let previous = std::mem::replace(&mut self.parent_id, parent_id.clone());
        self.touch(now);
        self.events.push(
            ContainerEvent::new(EventKind::ContainerUpdated, self.id.clone(), now)
                .with_meta("previous_parent_id", previous)
                .with_meta("parent_id", parent_id),
        );
        Ok(())
    }

    /// Queue `container_deleted`. The repository calls this once it has
    /// checked the container is empty.
    pub fn mark_deleted(&mut self, now: Timestamp) {
        self.events.push(
            ContainerEvent::new(EventKind::ContainerDeleted, self.id.clone(), now)
                .with_meta("parent_id", self.parent_id.clone()),
        );
    }

    /// Re-check all aggregate-local invariants.
    pub fn validate(&self) -> ContainerResult<()> {
        validate_container_id(&self.id)?;
        if self.parent_id == self.id {
            return Err(ContainerError::CircularReference {
                id: self.id.clone(),
                parent: self.parent_id.clone(),
            });
        }
        let mut seen = HashSet::with_capacity(self.members.len());
        for member in &self.members {
            if member.id == self.id {
                return Err(ContainerError::SelfMembership(self.id.clone()));
            }
            if !seen.insert(member.id.as_str()) {
                return Err(ContainerError::DuplicateMember {
                    container: self.id.clone(),
                    member: member.id.clone(),
                });
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Event queue
    // ---------------------------------------------------------------

    /// Events queued since construction or the last [`Self::take_events`].
    pub fn pending_events(&self) -> &[ContainerEvent] {
        &self.events
    }

    /// Drain the uncommitted event queue.
    pub fn take_events(&mut self) -> Vec<ContainerEvent> {
        std::mem::take(&mut self.events)
    }

    fn touch(&mut self, now: Timestamp) {
        self.updated_at = now;
        self.metadata.insert(MODIFIED_KEY.into(), now.to_rfc3339());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn t(ms: i64) -> Timestamp {
        DateTime::<Utc>::UNIX_EPOCH + Duration::milliseconds(ms)
    }

    fn basic(id: &str) -> Container {
        Container::new(id, "", ContainerType::Basic, t(0)).unwrap()
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    #[test]
    fn new_container_queues_created_event() {
        let c = Container::new("photos", "root", ContainerType::Direct, t(5)).unwrap();
        assert_eq!(c.id(), "photos");
        assert_eq!(c.parent_id(), "root");
        assert!(!c.is_root());
        assert_eq!(c.container_type(), ContainerType::Direct);
        assert_eq!(c.created_at(), t(5));
        assert_eq!(c.updated_at(), t(5));
        assert!(c.metadata_value(CREATED_KEY).is_some());

        let events = c.pending_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::ContainerCreated);
        assert_eq!(events[0].container_id, "photos");
    }

    #[test]
    fn empty_id_is_rejected() {
        let err = Container::new("", "", ContainerType::Basic, t(0)).unwrap_err();
        assert!(matches!(err, ContainerError::InvalidId { .. }));
    }

    #[test]
    fn unknown_type_name_is_rejected() {
        let err = Container::with_type_name("c", "", "FolderContainer", t(0)).unwrap_err();
        assert_eq!(err, ContainerError::InvalidType("FolderContainer".into()));

        let ok = Container::with_type_name("c", "", "ldp:IndirectContainer", t(0)).unwrap();
        assert_eq!(ok.container_type(), ContainerType::Indirect);
    }

    #[test]
    fn self_parent_is_circular() {
        let err = Container::new("a", "a", ContainerType::Basic, t(0)).unwrap_err();
        assert!(matches!(err, ContainerError::CircularReference { .. }));
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    #[test]
    fn add_member_appends_and_bumps_updated_at() {
        let mut c = basic("c");
        c.take_events();
        c.add_member("r1", MemberType::Resource, t(10)).unwrap();
        c.add_member("r2", MemberType::Binary, t(20)).unwrap();

        assert_eq!(c.member_ids().collect::<Vec<_>>(), vec!["r1", "r2"]);
        assert_eq!(c.updated_at(), t(20));
        assert_eq!(c.member("r2").unwrap().member_type, MemberType::Binary);

        let events = c.take_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::MemberAdded);
        assert_eq!(events[0].member_id.as_deref(), Some("r1"));
        assert_eq!(events[1].member_type, Some(MemberType::Binary));
        assert!(c.pending_events().is_empty());
    }

    #[test]
    fn duplicate_member_fails_and_leaves_list_unchanged() {
        let mut c = basic("c");
        c.add_member("r1", MemberType::Resource, t(1)).unwrap();
        let before = c.pending_events().len();

        let err = c.add_member("r1", MemberType::Resource, t(2)).unwrap_err();
        assert!(matches!(err, ContainerError::DuplicateMember { .. }));
        assert_eq!(c.member_count(), 1);
        assert_eq!(c.updated_at(), t(1));
        assert_eq!(c.pending_events().len(), before);
    }

    #[test]
    fn self_membership_is_rejected() {
        let mut c = basic("c");
        let err = c.add_member("c", MemberType::Container, t(1)).unwrap_err();
        assert_eq!(err, ContainerError::SelfMembership("c".into()));
    }

    #[test]
    fn empty_member_id_is_rejected() {
        let mut c = basic("c");
        assert!(matches!(
            c.add_member("", MemberType::Resource, t(1)),
            Err(ContainerError::InvalidMemberId { .. })
        ));
    }

    #[test]
    fn remove_member_preserves_order() {
        let mut c = basic("c");
        for (i, id) in ["a", "b", "c2", "d"].iter().enumerate() {
            c.add_member(*id, MemberType::Resource, t(i as i64)).unwrap();
        }
        c.take_events();

        let removed = c.remove_member("b", t(50)).unwrap();
        assert_eq!(removed.id, "b");
        assert_eq!(c.member_ids().collect::<Vec<_>>(), vec!["a", "c2", "d"]);
        assert!(!c.contains_member("b"));

        let events = c.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::MemberRemoved);
    }

    #[test]
    fn remove_missing_member_fails() {
        let mut c = basic("c");
        let err = c.remove_member("ghost", t(1)).unwrap_err();
        assert!(matches!(err, ContainerError::MemberNotFound { .. }));
    }

    // -----------------------------------------------------------------------
    // Metadata and hierarchy
    // -----------------------------------------------------------------------

    #[test]
    fn metadata_updates_queue_events() {
        let mut c = basic("c");
        c.take_events();
        c.set_title("Photos", t(3));
        c.set_description("Holiday pictures", t(4));
        assert_eq!(c.title(), Some("Photos"));
        assert_eq!(c.description(), Some("Holiday pictures"));
        assert_eq!(c.remove_metadata("title", t(5)), Some("Photos".into()));
        assert_eq!(c.remove_metadata("title", t(6)), None);

        let kinds: Vec<_> = c.take_events().into_iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::ContainerUpdated; 3]);
        assert_eq!(c.updated_at(), t(5));
    }

    #[test]
    fn reserved_timestamp_keys_are_not_writable() {
        let mut c = basic("c");
        let created = c.metadata_value(CREATED_KEY).map(str::to_owned);
        c.set_metadata(CREATED_KEY, "yesterday", t(9));
        assert_eq!(c.metadata_value(CREATED_KEY).map(str::to_owned), created);
        assert_eq!(c.remove_metadata(MODIFIED_KEY, t(9)), None);
    }

    #[test]
    fn reparent_rejects_self() {
        let mut c = Container::new("a", "root", ContainerType::Basic, t(0)).unwrap();
        assert!(c.reparent("a", t(1)).is_err());
        c.reparent("", t(2)).unwrap();
        assert!(c.is_root());
    }

    // -----------------------------------------------------------------------
    // Snapshot / restore
    // -----------------------------------------------------------------------

    #[test]
    fn snapshot_restore_preserves_state_without_events() {
        let mut c = basic("c");
        c.add_member("x", MemberType::Resource, t(1)).unwrap();
        c.set_title("T", t(2));

        let restored = Container::restore(c.snapshot()).unwrap();
        assert_eq!(restored.snapshot(), c.snapshot());
        assert!(restored.pending_events().is_empty());
        assert!(restored.contains_member("x"));
    }

    #[test]
    fn restore_rejects_duplicate_members() {
        let mut snapshot = basic("c").snapshot();
        snapshot.members.push(Member::new("x", MemberType::Resource, t(1)));
        snapshot.members.push(Member::new("x", MemberType::Resource, t(2)));
        assert!(matches!(
            Container::restore(snapshot),
            Err(ContainerError::DuplicateMember { .. })
        ));
    }

    proptest::proptest! {
        #[test]
        fn membership_matches_model(ops in proptest::collection::vec((proptest::bool::ANY, 0u8..16), 0..64)) {
            let mut c = basic("c");
            let mut model: Vec<String> = Vec::new();
            for (i, (add, n)) in ops.into_iter().enumerate() {
                let id = format!("m{n}");
                if add {
                    let res = c.add_member(id.clone(), MemberType::Resource, t(i as i64));
                    proptest::prop_assert_eq!(res.is_ok(), !model.contains(&id));
                    if !model.contains(&id) {
                        model.push(id);
                    }
                } else {
                    let res = c.remove_member(&id, t(i as i64));
                    proptest::prop_assert_eq!(res.is_ok(), model.contains(&id));
                    model.retain(|m| m != &id);
                }
            }
            let ids: Vec<String> = c.member_ids().map(str::to_owned).collect();
            proptest::prop_assert_eq!(ids, model);
            proptest::prop_assert!(c.validate().is_ok());
        }
    }
}
