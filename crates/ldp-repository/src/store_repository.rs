//! [`ContainerRepository`] over a primary store and a membership index.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use ldp_container::{Container, ContainerEvent};
use ldp_index::{IndexError, IndexQuery, InMemoryMembershipIndex, MembershipIndex};
use ldp_store::{ContainerRecord, ContainerStore, InMemoryContainerStore, StoreError};
use ldp_types::{
    Clock, ContainerType, DefaultClassifier, IdGenerator, Member, MemberClassifier, MemberType,
    SystemClock, UuidV7Generator,
};

use crate::config::RepositoryLimits;
use crate::context::Context;
use crate::cursor::MemberCursor;
use crate::error::{RepositoryError, RepositoryResult};
use crate::events::{EventDispatcher, NoopDispatcher};
use crate::lock::LockTable;
use crate::options::{ListOptions, MemberPage, MetadataUpdate};
use crate::recovery::{ConsistencyReport, RebuildSummary};
use crate::repository::ContainerRepository;

/// One index mutation belonging to a dual write.
#[derive(Clone, Debug)]
pub(crate) enum IndexChange {
    Insert(Member),
    Remove(String),
}

/// Repository over any [`ContainerStore`] and [`MembershipIndex`].
///
/// Writes go to the index first and the primary store second; a failed
/// primary write undoes the index change. Both happen under the container's
/// write lock, and reads take the shared lock, so no caller observes one
/// half without the other.
pub struct StoreRepository {
    pub(crate) store: Arc<dyn ContainerStore>,
    pub(crate) index: Arc<dyn MembershipIndex>,
    pub(crate) locks: Arc<LockTable>,
    /// Held exclusively by moves, shared by creates, deletes and path
    /// reads. Two moves cannot jointly form a cycle, and no path walk sees
    /// a move half applied.
    hierarchy: RwLock<()>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    classifier: Arc<dyn MemberClassifier>,
    dispatcher: Arc<dyn EventDispatcher>,
    pub(crate) limits: RepositoryLimits,
}

/// Builder for [`StoreRepository`]. Collaborators not given explicitly use
/// the system clock, UUIDv7 ids, the extension classifier and no events.
pub struct StoreRepositoryBuilder {
    store: Arc<dyn ContainerStore>,
    index: Arc<dyn MembershipIndex>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    classifier: Arc<dyn MemberClassifier>,
    dispatcher: Arc<dyn EventDispatcher>,
    limits: RepositoryLimits,
}

impl StoreRepositoryBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn MemberClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn limits(mut self, limits: RepositoryLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn build(self) -> StoreRepository {
        StoreRepository {
            store: self.store,
            index: self.index,
            locks: Arc::new(LockTable::new()),
            hierarchy: RwLock::new(()),
            clock: self.clock,
            ids: self.ids,
            classifier: self.classifier,
            dispatcher: self.dispatcher,
            limits: self.limits,
        }
    }
}

impl StoreRepository {
    pub fn builder(
        store: Arc<dyn ContainerStore>,
        index: Arc<dyn MembershipIndex>,
    ) -> StoreRepositoryBuilder {
        StoreRepositoryBuilder {
            store,
            index,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidV7Generator),
            classifier: Arc::new(DefaultClassifier),
            dispatcher: Arc::new(NoopDispatcher),
            limits: RepositoryLimits::default(),
        }
    }

    /// A repository with both backends in memory.
    pub fn in_memory() -> Self {
        Self::builder(
            Arc::new(InMemoryContainerStore::new()),
            Arc::new(InMemoryMembershipIndex::new()),
        )
        .build()
    }

    pub fn limits(&self) -> RepositoryLimits {
        self.limits
    }

    pub fn lock_table(&self) -> &LockTable {
        &self.locks
    }

    /// A fresh container id from the injected generator.
    pub fn next_id(&self) -> String {
        self.ids.next_id()
    }

    /// Construct (but do not persist) a container stamped by the injected
    /// clock. An empty `id` draws one from the id generator.
    pub fn new_container(
        &self,
        id: &str,
        parent_id: &str,
        container_type: ContainerType,
    ) -> RepositoryResult<Container> {
        let id = if id.is_empty() { self.next_id() } else { id.to_string() };
        Ok(Container::new(id, parent_id, container_type, self.clock.now())?)
    }

    // ---------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------

    pub(crate) fn load(&self, id: &str) -> RepositoryResult<(ContainerRecord, Container)> {
        let record = self
            .store
            .read(id)?
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        let container = record.to_container()?;
        Ok((record, container))
    }

    /// `start` followed by its ancestors up to the root.
    fn ancestors(&self, start: &str) -> RepositoryResult<Vec<String>> {
        let mut chain = vec![start.to_string()];
        let mut seen: HashSet<String> = HashSet::from([start.to_string()]);
        let mut current = start.to_string();
        loop {
            let (record, _) = self.load(&current)?;
            let parent = record.parent_id();
            if parent.is_empty() {
                return Ok(chain);
            }
            if !seen.insert(parent.to_string()) {
                return Err(RepositoryError::CircularReference {
                    id: current,
                    parent: parent.to_string(),
                });
            }
            if chain.len() >= self.limits.max_depth {
                return Err(self.too_deep(start));
            }
            chain.push(parent.to_string());
            current = parent.to_string();
        }
    }

    /// Levels in the subtree rooted at `id`, counting `id` itself.
    fn subtree_height(&self, id: &str) -> RepositoryResult<usize> {
        let mut seen: HashSet<String> = HashSet::from([id.to_string()]);
        let mut level = vec![id.to_string()];
        let mut height = 0;
        while !level.is_empty() {
            height += 1;
            if height > self.limits.max_depth {
                return Err(self.too_deep(id));
            }
            let mut next = Vec::new();
            for node in &level {
                let (_, container) = self.load(node)?;
                let candidates: Vec<String> = container
                    .members()
                    .iter()
                    .filter(|m| m.is_container())
                    .map(|m| m.id.clone())
                    .collect();
                for record in self.store.read_batch(&candidates)?.into_iter().flatten() {
                    if record.parent_id() == node.as_str() && seen.insert(record.id().to_string()) {
                        next.push(record.id().to_string());
                    }
                }
            }
            level = next;
        }
        Ok(height)
    }

    fn too_deep(&self, id: &str) -> RepositoryError {
        RepositoryError::DepthExceeded {
            id: id.to_string(),
            max_depth: self.limits.max_depth,
        }
    }

    fn classify(&self, container_id: &str, member_id: &str) -> RepositoryResult<MemberType> {
        if self.store.exists(member_id)? {
            return Ok(MemberType::Container);
        }
        Ok(self.classifier.classify(container_id, member_id))
    }

    /// Map an index read error, reporting a missing partition as a missing
    /// container when the primary store agrees.
    fn index_read_error(&self, container_id: &str, err: IndexError) -> RepositoryError {
        match err {
            IndexError::PartitionNotFound(_) => match self.store.exists(container_id) {
                Ok(false) => RepositoryError::NotFound(container_id.to_string()),
                Ok(true) => RepositoryError::Index(err),
                Err(e) => e.into(),
            },
            other => RepositoryError::Index(other),
        }
    }

    fn seed_partition(&self, id: &str) -> RepositoryResult<()> {
        match self.index.create_partition(id) {
            Ok(()) => Ok(()),
            Err(IndexError::PartitionExists(_)) => {
                // Left over from a write that never reached the primary store.
                warn!(container = id, "resetting orphan index partition");
                self.index
                    .replace_partition(id, &[])
                    .map_err(|e| RepositoryError::index_write(id, e))
            }
            Err(e) => Err(RepositoryError::index_write(id, e)),
        }
    }

    fn apply_index(&self, container_id: &str, changes: &[IndexChange], previous: &[Member]) -> RepositoryResult<()> {
        for (applied, change) in changes.iter().enumerate() {
            let result = match change {
                IndexChange::Insert(member) => self.index.insert(container_id, member).map(|_| ()),
                IndexChange::Remove(member_id) => self.index.remove(container_id, member_id).map(|found| {
                    if !found {
                        warn!(container = container_id, member = %member_id, "index row already missing");
                    }
                }),
            };
            if let Err(e) = result {
                self.undo_index(container_id, &changes[..applied], previous);
                return Err(RepositoryError::index_write(container_id, e));
            }
        }
        Ok(())
    }

    /// Best-effort rollback of applied index changes. A failure leaves the
    /// partition divergent until `rebuild_index` runs.
    fn undo_index(&self, container_id: &str, applied: &[IndexChange], previous: &[Member]) {
        if applied.is_empty() {
            return;
        }
        let result = if applied.iter().all(|c| matches!(c, IndexChange::Insert(_))) {
            applied.iter().try_for_each(|c| match c {
                IndexChange::Insert(m) => self.index.remove(container_id, &m.id).map(|_| ()),
                IndexChange::Remove(_) => Ok(()),
            })
        } else {
            // Re-inserting removed rows would reorder them.
            self.index.replace_partition(container_id, previous)
        };
        if let Err(e) = result {
            warn!(container = container_id, error = %e, "index rollback failed; partition needs rebuild");
        }
    }

    /// Dual write of a mutated container: index first, then the primary
    /// record. Returns the committed record.
    fn commit(
        &self,
        record: &ContainerRecord,
        container: &Container,
        changes: &[IndexChange],
    ) -> RepositoryResult<ContainerRecord> {
        let id = container.id();
        self.apply_index(id, changes, &record.container.members)?;
        let next = record.next(container);
        if let Err(e) = self.store.update(&next, record.revision) {
            self.undo_index(id, changes, &record.container.members);
            return Err(e.into());
        }
        Ok(next)
    }

    /// Put back a container's state as of `previous`, after `committed` was
    /// written but a later step of the same operation failed.
    fn restore(&self, previous: &ContainerRecord, committed: &ContainerRecord) {
        let id = previous.id();
        let rollback = ContainerRecord {
            revision: committed.revision + 1,
            container: previous.container.clone(),
        };
        if let Err(e) = self.store.update(&rollback, committed.revision) {
            warn!(container = id, error = %e, "primary rollback failed");
        }
        if let Err(e) = self.index.replace_partition(id, &previous.container.members) {
            warn!(container = id, error = %e, "index rollback failed; partition needs rebuild");
        }
    }

    fn unwind(&self, committed: &[(ContainerRecord, ContainerRecord)]) {
        for (previous, next) in committed.iter().rev() {
            self.restore(previous, next);
        }
    }

    /// Remove a freshly created container whose parent registration failed.
    fn unwind_create(&self, id: &str) {
        if let Err(e) = self.store.delete(id) {
            warn!(container = id, error = %e, "failed to remove partially created container");
        }
        if let Err(e) = self.index.drop_partition(id) {
            warn!(container = id, error = %e, "failed to drop partially created partition");
        }
    }

    async fn publish(&self, events: Vec<ContainerEvent>) {
        if !events.is_empty() {
            self.dispatcher.dispatch(events).await;
        }
    }

    fn page_limit(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.limits.default_page_limit)
            .min(self.limits.max_page_limit)
    }
}

#[async_trait]
impl ContainerRepository for StoreRepository {
    async fn create_container(&self, ctx: &Context, mut container: Container) -> RepositoryResult<Container> {
        container.validate()?;
        let id = container.id().to_string();
        let parent_id = container.parent_id().to_string();

        let _hierarchy = ctx.run(self.hierarchy.read()).await?;
        let _guards = self
            .locks
            .write_many(ctx, [id.as_str(), parent_id.as_str()])
            .await?;

        if self.store.exists(&id)? || self.store.is_retired(&id)? {
            return Err(RepositoryError::AlreadyExists(id));
        }

        // Validate the parent side in memory before any write.
        let now = self.clock.now();
        let mut parent = None;
        if !parent_id.is_empty() {
            let (record, mut parent_container) = self.load(&parent_id).map_err(|e| match e {
                RepositoryError::NotFound(_) => RepositoryError::ParentNotFound {
                    id: id.clone(),
                    parent: parent_id.clone(),
                },
                other => other,
            })?;
            let chain = self.ancestors(&parent_id)?;
            if chain.contains(&id) {
                return Err(RepositoryError::CircularReference {
                    id,
                    parent: parent_id,
                });
            }
            if chain.len() >= self.limits.max_depth {
                return Err(self.too_deep(&id));
            }
            parent_container.add_member(id.clone(), MemberType::Container, now)?;
            parent = Some((record, parent_container));
        }

        ctx.check()?;

        self.seed_partition(&id)?;
        let record = ContainerRecord::new(&container);
        if let Err(e) = self.store.insert(&record) {
            if let Err(drop_err) = self.index.drop_partition(&id) {
                warn!(container = %id, error = %drop_err, "failed to drop partition after rejected insert");
            }
            return Err(match e {
                StoreError::AlreadyExists(_) => RepositoryError::AlreadyExists(id),
                other => other.into(),
            });
        }

        let mut events = container.take_events();
        if let Some((parent_record, mut parent_container)) = parent {
            let member = Member::new(id.clone(), MemberType::Container, now);
            if let Err(e) = self.commit(&parent_record, &parent_container, &[IndexChange::Insert(member)]) {
                self.unwind_create(&id);
                return Err(e);
            }
            events.extend(parent_container.take_events());
        }

        debug!(container = %id, parent = %parent_id, "container created");
        self.publish(events).await;
        Ok(container)
    }

    async fn get_container(&self, ctx: &Context, id: &str) -> RepositoryResult<Container> {
        let _guard = self.locks.read(ctx, id).await?;
        Ok(self.load(id)?.1)
    }

    async fn container_exists(&self, ctx: &Context, id: &str) -> RepositoryResult<bool> {
        ctx.check()?;
        Ok(self.store.exists(id)?)
    }

    async fn delete_container(&self, ctx: &Context, id: &str) -> RepositoryResult<()> {
        let _hierarchy = ctx.run(self.hierarchy.read()).await?;
        loop {
            let parent_id = self.load(id)?.0.parent_id().to_string();
            let guards = self
                .locks
                .write_many(ctx, [id, parent_id.as_str()])
                .await?;

            let (record, mut container) = self.load(id)?;
            if record.parent_id() != parent_id {
                // Moved while we waited; lock the new parent instead.
                drop(guards);
                continue;
            }
            if !container.is_empty() {
                return Err(RepositoryError::NotEmpty {
                    id: id.to_string(),
                    members: container.member_count(),
                });
            }

            ctx.check()?;

            let now = self.clock.now();
            container.mark_deleted(now);
            let mut events = container.take_events();

            let mut detached = None;
            if !parent_id.is_empty() {
                match self.store.read(&parent_id)? {
                    Some(parent_record) => {
                        let mut parent = parent_record.to_container()?;
                        if parent.contains_member(id) {
                            parent.remove_member(id, now)?;
                            let committed = self.commit(
                                &parent_record,
                                &parent,
                                &[IndexChange::Remove(id.to_string())],
                            )?;
                            events.extend(parent.take_events());
                            detached = Some((parent_record, committed));
                        } else {
                            warn!(container = id, parent = %parent_id, "container missing from parent's members");
                        }
                    }
                    None => warn!(container = id, parent = %parent_id, "parent record missing"),
                }
            }

            if let Err(e) = self.store.retire(id) {
                if let Some((previous, committed)) = &detached {
                    self.restore(previous, committed);
                }
                return Err(e.into());
            }
            if let Err(e) = self.index.drop_partition(id) {
                warn!(container = id, error = %e, "orphan index partition left behind");
            }

            debug!(container = id, parent = %parent_id, "container deleted");
            self.publish(events).await;
            return Ok(());
        }
    }

    async fn update_metadata(
        &self,
        ctx: &Context,
        id: &str,
        update: MetadataUpdate,
    ) -> RepositoryResult<Container> {
        let _guard = self.locks.write(ctx, id).await?;
        let (record, mut container) = self.load(id)?;
        let now = self.clock.now();
        for (key, value) in update.set {
            container.set_metadata(key, value, now);
        }
        for key in &update.remove {
            container.remove_metadata(key, now);
        }
        if container.pending_events().is_empty() {
            return Ok(container);
        }

        ctx.check()?;
        self.commit(&record, &container, &[])?;
        debug!(container = id, "metadata updated");
        self.publish(container.take_events()).await;
        Ok(container)
    }

    async fn add_member(&self, ctx: &Context, container_id: &str, member_id: &str) -> RepositoryResult<Member> {
        let member_type = self.classify(container_id, member_id)?;
        let _guard = self.locks.write(ctx, container_id).await?;
        let (record, mut container) = self.load(container_id)?;
        let now = self.clock.now();
        container.add_member(member_id, member_type, now)?;

        ctx.check()?;
        let member = Member::new(member_id, member_type, now);
        self.commit(&record, &container, &[IndexChange::Insert(member.clone())])?;

        debug!(container = container_id, member = member_id, member_type = %member_type, "member added");
        self.publish(container.take_events()).await;
        Ok(member)
    }

    async fn remove_member(&self, ctx: &Context, container_id: &str, member_id: &str) -> RepositoryResult<Member> {
        let _guard = self.locks.write(ctx, container_id).await?;
        let (record, mut container) = self.load(container_id)?;
        if container.contains_member(member_id) {
            if let Some(child) = self.store.read(member_id)? {
                if child.parent_id() == container_id {
                    return Err(RepositoryError::ChildContainer {
                        container: container_id.to_string(),
                        member: member_id.to_string(),
                    });
                }
            }
        }
        let removed = container.remove_member(member_id, self.clock.now())?;

        ctx.check()?;
        self.commit(&record, &container, &[IndexChange::Remove(member_id.to_string())])?;

        debug!(container = container_id, member = member_id, "member removed");
        self.publish(container.take_events()).await;
        Ok(removed)
    }

    async fn list_members(
        &self,
        ctx: &Context,
        container_id: &str,
        options: ListOptions,
    ) -> RepositoryResult<MemberPage> {
        let limit = self.page_limit(options.limit);
        let _guard = self.locks.read(ctx, container_id).await?;
        let total = self
            .index
            .count(container_id, options.member_type)
            .map_err(|e| self.index_read_error(container_id, e))?;
        let entries = if limit == 0 || options.offset >= total {
            Vec::new()
        } else {
            let query = IndexQuery {
                offset: options.offset,
                limit: Some(limit),
                sort: options.sort,
                member_type: options.member_type,
            };
            self.index
                .select(container_id, &query)
                .map_err(|e| self.index_read_error(container_id, e))?
        };
        Ok(MemberPage {
            entries,
            total,
            offset: options.offset,
            limit,
        })
    }

    async fn count_members(
        &self,
        ctx: &Context,
        container_id: &str,
        member_type: Option<MemberType>,
    ) -> RepositoryResult<u64> {
        let _guard = self.locks.read(ctx, container_id).await?;
        self.index
            .count(container_id, member_type)
            .map_err(|e| self.index_read_error(container_id, e))
    }

    fn member_cursor(&self, container_id: &str, options: ListOptions, batch_size: usize) -> MemberCursor {
        let batch_size = if batch_size == 0 {
            self.limits.cursor_batch_size
        } else {
            batch_size
        };
        MemberCursor::new(
            container_id,
            Arc::clone(&self.index),
            Arc::clone(&self.locks),
            options,
            batch_size,
        )
    }

    async fn get_children(&self, ctx: &Context, id: &str) -> RepositoryResult<Vec<Container>> {
        let _guard = self.locks.read(ctx, id).await?;
        let (_, container) = self.load(id)?;
        let candidates: Vec<String> = container
            .members()
            .iter()
            .filter(|m| m.is_container())
            .map(|m| m.id.clone())
            .collect();
        let mut children = Vec::with_capacity(candidates.len());
        for record in self.store.read_batch(&candidates)?.into_iter().flatten() {
            if record.parent_id() == id {
                children.push(record.to_container()?);
            }
        }
        Ok(children)
    }

    async fn get_parent(&self, ctx: &Context, id: &str) -> RepositoryResult<Container> {
        let _hierarchy = ctx.run(self.hierarchy.read()).await?;
        let (record, _) = self.load(id)?;
        if record.parent_id().is_empty() {
            return Err(RepositoryError::NotFound(format!("parent of root {id}")));
        }
        Ok(self.load(record.parent_id())?.1)
    }

    async fn get_path(&self, ctx: &Context, id: &str) -> RepositoryResult<Vec<String>> {
        let _hierarchy = ctx.run(self.hierarchy.read()).await?;
        let mut chain = self.ancestors(id)?;
        chain.reverse();
        Ok(chain)
    }

    async fn find_by_path(&self, ctx: &Context, path: &str) -> RepositoryResult<Container> {
        let _hierarchy = ctx.run(self.hierarchy.read()).await?;
        let not_found = || RepositoryError::NotFound(path.to_string());
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let first = segments.next().ok_or_else(not_found)?;
        let mut current = match self.load(first) {
            Ok((_, c)) if c.is_root() => c,
            Ok(_) | Err(RepositoryError::NotFound(_)) => return Err(not_found()),
            Err(e) => return Err(e),
        };
        for segment in segments {
            if !current.contains_member(segment) {
                return Err(not_found());
            }
            current = match self.load(segment) {
                Ok((_, c)) if c.parent_id() == current.id() => c,
                Ok(_) | Err(RepositoryError::NotFound(_)) => return Err(not_found()),
                Err(e) => return Err(e),
            };
        }
        Ok(current)
    }

    async fn move_container(&self, ctx: &Context, id: &str, new_parent_id: &str) -> RepositoryResult<Container> {
        let _hierarchy = ctx.run(self.hierarchy.write()).await?;

        let (record, _) = self.load(id)?;
        let old_parent_id = record.parent_id().to_string();
        if new_parent_id == id {
            return Err(RepositoryError::CircularReference {
                id: id.to_string(),
                parent: new_parent_id.to_string(),
            });
        }
        if !new_parent_id.is_empty() {
            if !self.store.exists(new_parent_id)? {
                return Err(RepositoryError::ParentNotFound {
                    id: id.to_string(),
                    parent: new_parent_id.to_string(),
                });
            }
            let chain = self.ancestors(new_parent_id)?;
            if chain.iter().any(|a| a == id) {
                return Err(RepositoryError::CircularReference {
                    id: id.to_string(),
                    parent: new_parent_id.to_string(),
                });
            }
            if chain.len() + self.subtree_height(id)? > self.limits.max_depth {
                return Err(self.too_deep(id));
            }
        }

        let _guards = self
            .locks
            .write_many(ctx, [id, old_parent_id.as_str(), new_parent_id])
            .await?;

        let (record, mut container) = self.load(id)?;
        if old_parent_id == new_parent_id {
            return Ok(container);
        }

        // Stage every change in memory first.
        let now = self.clock.now();
        container.reparent(new_parent_id, now)?;
        let mut new_parent = None;
        if !new_parent_id.is_empty() {
            let (parent_record, mut parent) = self.load(new_parent_id).map_err(|e| match e {
                RepositoryError::NotFound(_) => RepositoryError::ParentNotFound {
                    id: id.to_string(),
                    parent: new_parent_id.to_string(),
                },
                other => other,
            })?;
            parent.add_member(id, MemberType::Container, now)?;
            new_parent = Some((parent_record, parent));
        }
        let mut old_parent = None;
        if !old_parent_id.is_empty() {
            if let Some(parent_record) = self.store.read(&old_parent_id)? {
                let mut parent = parent_record.to_container()?;
                if parent.contains_member(id) {
                    parent.remove_member(id, now)?;
                    old_parent = Some((parent_record, parent));
                }
            }
        }

        ctx.check()?;

        let mut committed = Vec::new();
        let mut events = Vec::new();
        if let Some((parent_record, mut parent)) = new_parent {
            let member = Member::new(id, MemberType::Container, now);
            let next = self.commit(&parent_record, &parent, &[IndexChange::Insert(member)])?;
            events.extend(parent.take_events());
            committed.push((parent_record, next));
        }
        if let Some((parent_record, mut parent)) = old_parent {
            match self.commit(&parent_record, &parent, &[IndexChange::Remove(id.to_string())]) {
                Ok(next) => {
                    events.extend(parent.take_events());
                    committed.push((parent_record, next));
                }
                Err(e) => {
                    self.unwind(&committed);
                    return Err(e);
                }
            }
        }
        if let Err(e) = self.store.update(&record.next(&container), record.revision) {
            self.unwind(&committed);
            return Err(e.into());
        }
        events.extend(container.take_events());

        debug!(container = id, from = %old_parent_id, to = new_parent_id, "container moved");
        self.publish(events).await;
        Ok(container)
    }

    async fn rebuild_index(&self, ctx: &Context, id: &str) -> RepositoryResult<usize> {
        self.rebuild_one(ctx, id).await
    }

    async fn rebuild_all(&self, ctx: &Context) -> RepositoryResult<RebuildSummary> {
        self.rebuild_everything(ctx).await
    }

    async fn verify(&self, ctx: &Context) -> RepositoryResult<ConsistencyReport> {
        self.check_consistency(ctx).await
    }
}

impl std::fmt::Debug for StoreRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRepository")
            .field("locks", &self.locks)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}
