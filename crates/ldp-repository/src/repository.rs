use async_trait::async_trait;

use ldp_container::Container;
use ldp_index::IndexEntry;
use ldp_types::{Member, MemberType};

use crate::context::Context;
use crate::cursor::MemberCursor;
use crate::error::RepositoryResult;
use crate::options::{ListOptions, MemberPage, MetadataUpdate};
use crate::recovery::{ConsistencyReport, RebuildSummary};

/// The transactional contract over containers, their hierarchy and their
/// membership.
///
/// Every method is safe to call concurrently. Mutations on one container
/// are totally ordered; unrelated containers never wait on each other.
/// A mutation either commits to both the primary store and the membership
/// index or reports an error; if the context is cancelled before the
/// first durable write, nothing is written.
#[async_trait]
pub trait ContainerRepository: Send + Sync {
    // ---- Lifecycle ----

    /// Persist a new container, register it with its parent and seed its
    /// index partition. Returns the stored container.
    async fn create_container(&self, ctx: &Context, container: Container) -> RepositoryResult<Container>;

    async fn get_container(&self, ctx: &Context, id: &str) -> RepositoryResult<Container>;

    async fn container_exists(&self, ctx: &Context, id: &str) -> RepositoryResult<bool>;

    /// Delete an empty container and detach it from its parent. The id is
    /// retired: a later `create_container` with it fails with
    /// `AlreadyExists`.
    async fn delete_container(&self, ctx: &Context, id: &str) -> RepositoryResult<()>;

    async fn update_metadata(
        &self,
        ctx: &Context,
        id: &str,
        update: MetadataUpdate,
    ) -> RepositoryResult<Container>;

    // ---- Membership ----

    async fn add_member(&self, ctx: &Context, container_id: &str, member_id: &str) -> RepositoryResult<Member>;

    /// Remove a member. Child containers are rejected with
    /// `ChildContainer`; use `delete_container` or `move_container`.
    async fn remove_member(&self, ctx: &Context, container_id: &str, member_id: &str) -> RepositoryResult<Member>;

    /// One window of members, served from the membership index. Without a
    /// limit the window is `default_page_limit` entries; check
    /// [`MemberPage::has_more`] or use [`member_cursor`](Self::member_cursor)
    /// for a full listing.
    async fn list_members(
        &self,
        ctx: &Context,
        container_id: &str,
        options: ListOptions,
    ) -> RepositoryResult<MemberPage>;

    async fn count_members(
        &self,
        ctx: &Context,
        container_id: &str,
        member_type: Option<MemberType>,
    ) -> RepositoryResult<u64>;

    /// A streaming reader over a container's members in bounded batches.
    /// A `batch_size` of zero uses the configured default.
    fn member_cursor(&self, container_id: &str, options: ListOptions, batch_size: usize) -> MemberCursor;

    // ---- Hierarchy ----

    async fn get_children(&self, ctx: &Context, id: &str) -> RepositoryResult<Vec<Container>>;

    async fn get_parent(&self, ctx: &Context, id: &str) -> RepositoryResult<Container>;

    /// Container ids from the root down to `id`.
    async fn get_path(&self, ctx: &Context, id: &str) -> RepositoryResult<Vec<String>>;

    /// Resolve a slash-delimited path of container ids starting at a root.
    async fn find_by_path(&self, ctx: &Context, path: &str) -> RepositoryResult<Container>;

    /// Reparent a container. An empty `new_parent_id` makes it a root.
    /// Fails with `DepthExceeded` if the moved subtree would sit deeper
    /// than `max_depth`.
    async fn move_container(&self, ctx: &Context, id: &str, new_parent_id: &str) -> RepositoryResult<Container>;

    // ---- Recovery ----

    /// Re-derive one container's index partition from its primary record.
    async fn rebuild_index(&self, ctx: &Context, id: &str) -> RepositoryResult<usize>;

    /// Re-derive every partition and drop partitions with no container.
    async fn rebuild_all(&self, ctx: &Context) -> RepositoryResult<RebuildSummary>;

    /// Compare the index against the primary store without changing either.
    async fn verify(&self, ctx: &Context) -> RepositoryResult<ConsistencyReport>;
}

/// Collect every entry a cursor yields. Intended for tests and tools that
/// know the container is small.
pub async fn drain_cursor(ctx: &Context, mut cursor: MemberCursor) -> RepositoryResult<Vec<IndexEntry>> {
    let mut out = Vec::new();
    loop {
        let batch = cursor.next_batch(ctx).await?;
        if batch.is_empty() {
            return Ok(out);
        }
        out.extend(batch);
    }
}
