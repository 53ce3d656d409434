use serde::{Deserialize, Serialize};

use ldp_container::{Container, ContainerSnapshot};

use crate::error::StoreResult;

/// The persisted unit for one container.
///
/// `revision` starts at 1 on insert and increases by one on every update;
/// backends use it for compare-and-swap writes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub revision: u64,
    pub container: ContainerSnapshot,
}

impl ContainerRecord {
    /// A fresh record for a container that has never been stored.
    pub fn new(container: &Container) -> Self {
        Self {
            revision: 1,
            container: container.snapshot(),
        }
    }

    /// The record that replaces `self` once `container` has been mutated.
    pub fn next(&self, container: &Container) -> Self {
        Self {
            revision: self.revision + 1,
            container: container.snapshot(),
        }
    }

    pub fn id(&self) -> &str {
        &self.container.id
    }

    pub fn parent_id(&self) -> &str {
        &self.container.parent_id
    }

    pub fn member_count(&self) -> usize {
        self.container.members.len()
    }

    /// Hydrate the aggregate, re-validating its invariants.
    pub fn to_container(&self) -> StoreResult<Container> {
        Ok(Container::restore(self.container.clone())?)
    }

    pub(crate) fn encode(&self) -> StoreResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| crate::StoreError::Serialization(e.to_string()))
    }

    pub(crate) fn decode(bytes: &[u8]) -> StoreResult<Self> {
        bincode::deserialize(bytes).map_err(|e| crate::StoreError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use ldp_types::{ContainerType, MemberType};

    #[test]
    fn next_bumps_revision() {
        let now = DateTime::<Utc>::UNIX_EPOCH;
        let mut c = Container::new("c", "", ContainerType::Basic, now).unwrap();
        let first = ContainerRecord::new(&c);
        assert_eq!(first.revision, 1);

        c.add_member("m", MemberType::Resource, now).unwrap();
        let second = first.next(&c);
        assert_eq!(second.revision, 2);
        assert_eq!(second.member_count(), 1);
    }

    #[test]
    fn bincode_roundtrip() {
        let now = DateTime::<Utc>::UNIX_EPOCH;
        let mut c = Container::new("c", "root", ContainerType::Indirect, now).unwrap();
        c.set_title("Title", now);
        let record = ContainerRecord::new(&c);
        let decoded = ContainerRecord::decode(&record.encode().unwrap()).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.to_container().unwrap().title(), Some("Title"));
    }
}
