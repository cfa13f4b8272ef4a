//! Resource and content tables.
//!
//! Every operation is scoped to exactly one project: the same path in two
//! projects is two unrelated rows as far as this module is concerned. Deciding
//! *which* project a read or write should hit is the job of the caller (see the
//! copy-on-write resolver in `verso-vfs`).

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{ProjectId, Resource, ResourceKind, ResourceRow, ResourceState};
use exn::ResultExt;
use sqlx::sqlite::SqliteArguments;
use sqlx::{Sqlite, SqlitePool};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Folder paths always end with the separator.
const SEPARATOR: char = '/';

fn bind_resource(query: SqliteQuery<'_>, row: ResourceRow) -> SqliteQuery<'_> {
    query
        .bind(row.project_id)
        .bind(row.path)
        .bind(row.kind)
        .bind(row.flags)
        .bind(row.owner_id)
        .bind(row.group_id)
        .bind(row.access_flags)
        .bind(row.state)
        .bind(row.locked_by)
        .bind(row.launcher_type)
        .bind(row.launcher_class)
        .bind(row.created_at)
        .bind(row.modified_at)
        .bind(row.length)
}

fn bind_header_update(query: SqliteQuery<'_>, row: ResourceRow) -> SqliteQuery<'_> {
    query
        .bind(row.kind)
        .bind(row.flags)
        .bind(row.owner_id)
        .bind(row.group_id)
        .bind(row.access_flags)
        .bind(row.state)
        .bind(row.locked_by)
        .bind(row.launcher_type)
        .bind(row.launcher_class)
        .bind(row.created_at)
        .bind(row.modified_at)
        .bind(row.length)
        .bind(row.project_id)
        .bind(row.path)
}

fn digest(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

fn content_length(content: &[u8]) -> Result<u64> {
    u64::try_from(content.len()).or_raise(|| ErrorKind::InvalidData("content length"))
}

/// Whether `path` is a direct child of `parent` of the requested kind.
///
/// `parent` must end with the separator.
fn is_direct_child(parent: &str, path: &str, kind: ResourceKind) -> bool {
    let Some(rest) = path.strip_prefix(parent) else {
        return false;
    };
    match kind {
        ResourceKind::File => !rest.is_empty() && !rest.contains(SEPARATOR),
        ResourceKind::Folder => rest.len() > 1 && rest.find(SEPARATOR) == Some(rest.len() - 1),
    }
}

/// Durable resource metadata and content, keyed by `(project, path)`.
///
/// Single statements are atomic in SQLite, so concurrent writers to the same
/// row never interleave partial field updates. Multi-step operations
/// ([`create`](Self::create), [`commit_write`](Self::commit_write),
/// [`replace`](Self::replace)) run inside one transaction each.
///
/// The store never consults the [`LockTable`](crate::LockTable); enforcing
/// single-writer semantics is the caller's job.
#[derive(Debug, Clone)]
pub struct ResourceStore {
    pool: SqlitePool,
}
impl From<&Database> for ResourceStore {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl ResourceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Insert a resource into `project`, with optional content.
    ///
    /// This is an atomic insert-if-absent: [`ErrorKind::DuplicateKey`] is
    /// returned if a row already exists at `(project, path)`, even when two
    /// creators race. The resource's `project` field is overwritten with
    /// `project`.
    ///
    /// Passing `None` as content for a file inserts the header only. That is
    /// how staged (unchanged) resources defer their content to the online
    /// project. Content is ignored for folders, whose length is always zero.
    pub async fn create(&self, project: ProjectId, resource: &Resource, content: Option<&[u8]>) -> Result<Resource> {
        let mut resource = resource.clone();
        resource.project = project;
        let content = match resource.kind {
            ResourceKind::File => content,
            ResourceKind::Folder => None,
        };
        match content {
            Some(content) => resource.length = content_length(content)?,
            None if resource.is_folder() => resource.length = 0,
            None => {},
        }
        let row = ResourceRow::try_from(&resource)?;
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let inserted = bind_resource(sqlx::query(include_str!("../queries/insert_resource.sql")), row)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if inserted.rows_affected() == 0 {
            exn::bail!(ErrorKind::DuplicateKey(project, resource.path));
        }
        if let Some(content) = content {
            sqlx::query(include_str!("../queries/upsert_content.sql"))
                .bind(project.get())
                .bind(&resource.path)
                .bind(content)
                .bind(digest(content))
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(resource)
    }

    // =========================================================================
    // Get/Fetch
    // =========================================================================

    /// Read the header at `(project, path)`, if there is one.
    ///
    /// Logically deleted resources are returned as-is; hiding them is up to
    /// the caller.
    pub async fn find_header(&self, project: ProjectId, path: &str) -> Result<Option<Resource>> {
        let row: Option<ResourceRow> = sqlx::query_as(include_str!("../queries/get_resource.sql"))
            .bind(project.get())
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Resource::try_from).transpose()
    }

    /// Read the header at `(project, path)`.
    ///
    /// Returns [`ErrorKind::NotFound`] if the row does not exist.
    pub async fn read_header(&self, project: ProjectId, path: &str) -> Result<Resource> {
        match self.find_header(project, path).await? {
            Some(resource) => Ok(resource),
            None => exn::bail!(ErrorKind::NotFound(project, path.to_string())),
        }
    }

    /// Read the content row at `(project, path)`.
    ///
    /// Returns [`ErrorKind::ContentNotFound`] when there is no content row
    /// (folders, or files staged without content), and [`ErrorKind::Corrupt`]
    /// when the stored bytes no longer match their digest.
    pub async fn read_content(&self, project: ProjectId, path: &str) -> Result<Vec<u8>> {
        let row: Option<(Vec<u8>, String)> = sqlx::query_as(include_str!("../queries/get_content.sql"))
            .bind(project.get())
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let Some((data, hash)) = row else {
            exn::bail!(ErrorKind::ContentNotFound(project, path.to_string()));
        };
        if digest(&data) != hash {
            tracing::warn!(%project, path, "Stored content does not match its digest");
            exn::bail!(ErrorKind::Corrupt(project, path.to_string()));
        }
        Ok(data)
    }

    /// Number of content rows stored for `(project, path)`: zero or one.
    pub async fn count_content(&self, project: ProjectId, path: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count_content.sql"))
            .bind(project.get())
            .bind(path)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("content count"))
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// List the direct children of `parent` with the given kind.
    ///
    /// A resource is a direct child iff its path is `parent` plus exactly one
    /// segment (plus the trailing separator, for folders). Deleted resources
    /// are included. Results are ordered by path.
    pub async fn list_children(&self, project: ProjectId, parent: &str, kind: ResourceKind) -> Result<Vec<Resource>> {
        let parent = match parent.ends_with(SEPARATOR) {
            true => parent.to_string(),
            false => format!("{parent}{SEPARATOR}"),
        };
        let rows: Vec<ResourceRow> = sqlx::query_as(include_str!("../queries/list_children.sql"))
            .bind(project.get())
            .bind(kind.as_str())
            .bind(&parent)
            .bind(&parent)
            .bind(&parent)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter()
            .filter(|row| is_direct_child(&parent, &row.path, kind))
            .map(Resource::try_from)
            .collect()
    }

    /// List everything underneath `folder`, at any depth, ordered by path.
    pub async fn list_descendants(&self, project: ProjectId, folder: &str) -> Result<Vec<Resource>> {
        let rows: Vec<ResourceRow> = sqlx::query_as(include_str!("../queries/list_descendants.sql"))
            .bind(project.get())
            .bind(folder)
            .bind(folder)
            .bind(folder)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Resource::try_from).collect()
    }

    /// List every resource of one kind belonging to `project`, ordered by path.
    pub async fn list_by_kind(&self, project: ProjectId, kind: ResourceKind) -> Result<Vec<Resource>> {
        let rows: Vec<ResourceRow> = sqlx::query_as(include_str!("../queries/list_project_by_kind.sql"))
            .bind(project.get())
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Resource::try_from).collect()
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Overwrite every header field of the row at `(project, resource.path)`.
    ///
    /// Returns [`ErrorKind::NotFound`] if the row does not exist.
    pub async fn update_header(&self, project: ProjectId, resource: &Resource) -> Result<()> {
        let mut resource = resource.clone();
        resource.project = project;
        let row = ResourceRow::try_from(&resource)?;
        let updated = bind_header_update(sqlx::query(include_str!("../queries/update_resource.sql")), row)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if updated.rows_affected() == 0 {
            exn::bail!(ErrorKind::NotFound(project, resource.path));
        }
        Ok(())
    }

    /// Overwrite an existing content row.
    ///
    /// Returns [`ErrorKind::ContentNotFound`] if `(project, path)` has no
    /// content row yet; staged resources must be materialized first (see
    /// [`commit_write`](Self::commit_write)).
    pub async fn update_content(&self, project: ProjectId, path: &str, content: &[u8]) -> Result<()> {
        let updated = sqlx::query(include_str!("../queries/update_content.sql"))
            .bind(content)
            .bind(digest(content))
            .bind(project.get())
            .bind(path)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if updated.rows_affected() == 0 {
            exn::bail!(ErrorKind::ContentNotFound(project, path.to_string()));
        }
        Ok(())
    }

    /// Write a file header and its content as one atomic unit.
    ///
    /// The write only applies while the stored row is still in state
    /// `expected`. When `realize_from` is given, that project's content row is
    /// first copied into `project` (the copy-on-write materialization of a
    /// staged resource). The header length is taken from `content`.
    ///
    /// Nothing is written on failure: [`ErrorKind::NotFound`] if the header
    /// row does not exist, [`ErrorKind::StateChanged`] if its state is no
    /// longer `expected`.
    pub async fn commit_write(
        &self,
        project: ProjectId,
        header: &Resource,
        content: &[u8],
        expected: ResourceState,
        realize_from: Option<ProjectId>,
    ) -> Result<Resource> {
        let mut header = header.clone();
        header.project = project;
        header.length = content_length(content)?;
        let row = ResourceRow::try_from(&header)?;
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        if let Some(source) = realize_from {
            let realized = sqlx::query(include_str!("../queries/realize_content.sql"))
                .bind(project.get())
                .bind(source.get())
                .bind(&header.path)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            tracing::debug!(%project, %source, path = %header.path, rows = realized.rows_affected(), "Materialized content");
        }
        let updated = bind_header_update(sqlx::query(include_str!("../queries/commit_resource.sql")), row)
            .bind(expected.code())
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if updated.rows_affected() == 0 {
            let exists: bool = sqlx::query_scalar(include_str!("../queries/resource_exists.sql"))
                .bind(project.get())
                .bind(&header.path)
                .fetch_one(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            if exists {
                exn::bail!(ErrorKind::StateChanged(project, header.path));
            }
            exn::bail!(ErrorKind::NotFound(project, header.path));
        }
        sqlx::query(include_str!("../queries/upsert_content.sql"))
            .bind(project.get())
            .bind(&header.path)
            .bind(content)
            .bind(digest(content))
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(header)
    }

    /// Set the lifecycle state of a row.
    ///
    /// Returns [`ErrorKind::NotFound`] if the row does not exist.
    pub async fn set_state(&self, project: ProjectId, path: &str, state: ResourceState) -> Result<()> {
        let updated = sqlx::query(include_str!("../queries/set_state.sql"))
            .bind(state.code())
            .bind(project.get())
            .bind(path)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if updated.rows_affected() == 0 {
            exn::bail!(ErrorKind::NotFound(project, path.to_string()));
        }
        Ok(())
    }

    /// Logically delete a resource: the row stays, flagged
    /// [`Deleted`](ResourceState::Deleted). Deleting twice is a no-op.
    pub async fn mark_deleted(&self, project: ProjectId, path: &str) -> Result<()> {
        self.set_state(project, path, ResourceState::Deleted).await
    }

    /// Swap whatever is at `(target, resource.path)` for `resource`.
    ///
    /// Deletes the existing row (and content), then inserts `resource` with
    /// `project = target` and state [`Unchanged`](ResourceState::Unchanged),
    /// all in one transaction. This is the publish step for a single resource.
    pub async fn replace(&self, target: ProjectId, resource: &Resource, content: Option<&[u8]>) -> Result<Resource> {
        let mut resource = resource.clone();
        resource.project = target;
        resource.state = ResourceState::Unchanged;
        let content = match resource.kind {
            ResourceKind::File => content,
            ResourceKind::Folder => None,
        };
        if let Some(content) = content {
            resource.length = content_length(content)?;
        }
        let row = ResourceRow::try_from(&resource)?;
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/delete_resource.sql"))
            .bind(target.get())
            .bind(&resource.path)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        bind_resource(sqlx::query(include_str!("../queries/insert_resource.sql")), row)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if let Some(content) = content {
            sqlx::query(include_str!("../queries/upsert_content.sql"))
                .bind(target.get())
                .bind(&resource.path)
                .bind(content)
                .bind(digest(content))
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(resource)
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Remove the row at `(project, path)` and its content.
    ///
    /// Returns `true` if a row was deleted, `false` if there was nothing to
    /// delete (which is not an error).
    pub async fn physically_delete(&self, project: ProjectId, path: &str) -> Result<bool> {
        let deleted = sqlx::query(include_str!("../queries/delete_resource.sql"))
            .bind(project.get())
            .bind(path)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(deleted.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProjectKind, UserId};
    use crate::{Database, ProjectRepository};
    use rstest::rstest;
    use std::ops::Deref;

    async fn setup() -> (Database, ResourceStore, ProjectId, ProjectId) {
        seed(Database::connect_in_memory().await.unwrap()).await
    }

    async fn seed(db: Database) -> (Database, ResourceStore, ProjectId, ProjectId) {
        let projects = ProjectRepository::from(&db);
        let online = projects.create("Online", "admin", "admins", ProjectKind::Online).await.unwrap();
        let offline = projects.create("Work", "bob", "editors", ProjectKind::Offline).await.unwrap();
        (db.clone(), ResourceStore::from(&db), online.id, offline.id)
    }

    fn file(project: ProjectId, path: &str) -> Resource {
        Resource::file(project, path, "bob", "editors")
    }

    #[rstest]
    #[case("/", "/a.txt", ResourceKind::File, true)]
    #[case("/", "/docs/", ResourceKind::Folder, true)]
    #[case("/", "/docs/", ResourceKind::File, false)]
    #[case("/", "/docs/a.txt", ResourceKind::File, false)]
    #[case("/docs/", "/docs/a.txt", ResourceKind::File, true)]
    #[case("/docs/", "/docs/img/", ResourceKind::Folder, true)]
    #[case("/docs/", "/docs/img/b/", ResourceKind::Folder, false)]
    #[case("/docs/", "/docsx/a.txt", ResourceKind::File, false)]
    #[case("/docs/", "/docs/", ResourceKind::Folder, false)]
    fn test_is_direct_child(#[case] parent: &str, #[case] path: &str, #[case] kind: ResourceKind, #[case] expected: bool) {
        assert_eq!(is_direct_child(parent, path, kind), expected);
    }

    #[tokio::test]
    async fn test_create_and_read() {
        let (_db, store, _online, work) = setup().await;
        let created = store.create(work, &file(work, "/a.txt"), Some(b"hello".as_slice())).await.unwrap();
        assert_eq!(created.length, 5);
        let header = store.read_header(work, "/a.txt").await.unwrap();
        assert_eq!(header.state, ResourceState::New);
        assert_eq!(header.owner, UserId::from("bob"));
        assert_eq!(store.read_content(work, "/a.txt").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_create_is_scoped_to_project() {
        let (_db, store, online, work) = setup().await;
        // The resource claims to belong to `online`, but is created in `work`.
        store.create(work, &file(online, "/a.txt"), Some(b"x".as_slice())).await.unwrap();
        assert!(store.find_header(online, "/a.txt").await.unwrap().is_none());
        assert_eq!(store.read_header(work, "/a.txt").await.unwrap().project, work);
    }

    #[tokio::test]
    async fn test_create_duplicate() {
        let (_db, store, _online, work) = setup().await;
        store.create(work, &file(work, "/a.txt"), Some(b"one".as_slice())).await.unwrap();
        let err = store.create(work, &file(work, "/a.txt"), Some(b"two".as_slice())).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::DuplicateKey(p, path) if *p == work && path == "/a.txt"));
        // The failed insert must not have touched the existing content.
        assert_eq!(store.read_content(work, "/a.txt").await.unwrap(), b"one");
    }

    #[tokio::test]
    async fn test_folder_has_no_content() {
        let (_db, store, _online, work) = setup().await;
        let folder = Resource::folder(work, "/docs/", "bob", "editors");
        let created = store.create(work, &folder, Some(b"ignored".as_slice())).await.unwrap();
        assert_eq!(created.length, 0);
        assert_eq!(store.count_content(work, "/docs/").await.unwrap(), 0);
        let err = store.read_content(work, "/docs/").await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::ContentNotFound(_, _)));
    }

    #[tokio::test]
    async fn test_read_missing() {
        let (_db, store, _online, work) = setup().await;
        let err = store.read_header(work, "/missing").await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::NotFound(_, _)));
    }

    #[tokio::test]
    async fn test_update_header_and_content() {
        let (_db, store, _online, work) = setup().await;
        let mut header = store.create(work, &file(work, "/a.txt"), Some(b"one".as_slice())).await.unwrap();
        header.access = 0o700;
        header.locked_by = Some(UserId::from("bob"));
        store.update_header(work, &header).await.unwrap();
        store.update_content(work, "/a.txt", b"two").await.unwrap();
        let read = store.read_header(work, "/a.txt").await.unwrap();
        assert_eq!(read.access, 0o700);
        assert_eq!(read.locked_by, Some(UserId::from("bob")));
        assert_eq!(store.read_content(work, "/a.txt").await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_update_missing() {
        let (_db, store, _online, work) = setup().await;
        let err = store.update_header(work, &file(work, "/nope")).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::NotFound(_, _)));
        // Staged header without content: nothing to update yet.
        store.create(work, &file(work, "/staged"), None).await.unwrap();
        let err = store.update_content(work, "/staged", b"x").await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::ContentNotFound(_, _)));
    }

    #[tokio::test]
    async fn test_commit_write_realizes_once() {
        let (_db, store, online, work) = setup().await;
        store.replace(online, &file(online, "/a.txt"), Some(b"published".as_slice())).await.unwrap();
        let staged = file(work, "/a.txt").with_state(ResourceState::Unchanged);
        store.create(work, &staged, None).await.unwrap();
        assert_eq!(store.count_content(work, "/a.txt").await.unwrap(), 0);

        let changed = staged.clone().with_state(ResourceState::Changed);
        store.commit_write(work, &changed, b"draft 1", ResourceState::Unchanged, Some(online)).await.unwrap();
        store.commit_write(work, &changed, b"draft 2", ResourceState::Changed, None).await.unwrap();
        assert_eq!(store.count_content(work, "/a.txt").await.unwrap(), 1);
        assert_eq!(store.read_content(work, "/a.txt").await.unwrap(), b"draft 2");
        assert_eq!(store.read_header(work, "/a.txt").await.unwrap().length, 7);
        assert_eq!(store.read_content(online, "/a.txt").await.unwrap(), b"published");
    }

    #[tokio::test]
    async fn test_commit_write_missing_header_writes_nothing() {
        let (_db, store, _online, work) = setup().await;
        let err = store.commit_write(work, &file(work, "/ghost"), b"x", ResourceState::New, None).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::NotFound(_, _)));
        assert_eq!(store.count_content(work, "/ghost").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_commit_write_rejects_stale_state() {
        let (_db, store, online, work) = setup().await;
        store.replace(online, &file(online, "/a.txt"), Some(b"published".as_slice())).await.unwrap();
        let staged = file(work, "/a.txt").with_state(ResourceState::Unchanged);
        store.create(work, &staged, None).await.unwrap();
        // Deleted after the writer looked at the row, before it committed.
        store.mark_deleted(work, "/a.txt").await.unwrap();

        let changed = staged.with_state(ResourceState::Changed);
        let err = store
            .commit_write(work, &changed, b"draft", ResourceState::Unchanged, Some(online))
            .await
            .unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::StateChanged(p, path) if *p == work && path == "/a.txt"));
        assert_eq!(store.read_header(work, "/a.txt").await.unwrap().state, ResourceState::Deleted);
        // The materialized copy was rolled back with the rest.
        assert_eq!(store.count_content(work, "/a.txt").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_deleted_is_idempotent() {
        let (_db, store, _online, work) = setup().await;
        store.create(work, &file(work, "/a.txt"), Some(b"x".as_slice())).await.unwrap();
        store.mark_deleted(work, "/a.txt").await.unwrap();
        store.mark_deleted(work, "/a.txt").await.unwrap();
        let header = store.read_header(work, "/a.txt").await.unwrap();
        assert_eq!(header.state, ResourceState::Deleted);
        // The content row survives a logical delete.
        assert_eq!(store.count_content(work, "/a.txt").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_physically_delete() {
        let (_db, store, _online, work) = setup().await;
        store.create(work, &file(work, "/a.txt"), Some(b"x".as_slice())).await.unwrap();
        assert!(store.physically_delete(work, "/a.txt").await.unwrap());
        assert!(store.find_header(work, "/a.txt").await.unwrap().is_none());
        assert_eq!(store.count_content(work, "/a.txt").await.unwrap(), 0);
        // Absent rows are silently ignored.
        assert!(!store.physically_delete(work, "/a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_children() {
        let (_db, store, _online, work) = setup().await;
        for folder in ["/docs/", "/docs/img/", "/docs/img/raw/", "/other/"] {
            store.create(work, &Resource::folder(work, folder, "bob", "editors"), None).await.unwrap();
        }
        for path in ["/docs/b.txt", "/docs/a.txt", "/docs/img/c.png", "/top.txt"] {
            store.create(work, &file(work, path), Some(b"x".as_slice())).await.unwrap();
        }
        let files = store.list_children(work, "/docs/", ResourceKind::File).await.unwrap();
        let paths = files.iter().map(|r| r.path.as_str()).collect::<Vec<_>>();
        assert_eq!(paths, ["/docs/a.txt", "/docs/b.txt"]);
        let folders = store.list_children(work, "/docs", ResourceKind::Folder).await.unwrap();
        let paths = folders.iter().map(|r| r.path.as_str()).collect::<Vec<_>>();
        assert_eq!(paths, ["/docs/img/"]);
        let root = store.list_children(work, "/", ResourceKind::Folder).await.unwrap();
        assert_eq!(root.len(), 2);
        let all = store.list_descendants(work, "/docs/").await.unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn test_replace() {
        let (_db, store, online, work) = setup().await;
        store.replace(online, &file(online, "/a.txt"), Some(b"old".as_slice())).await.unwrap();
        let mut source = store.create(work, &file(work, "/a.txt"), Some(b"new!".as_slice())).await.unwrap();
        source.owner = UserId::from("alice");
        let published = store.replace(online, &source, Some(b"new!".as_slice())).await.unwrap();
        assert_eq!(published.project, online);
        assert_eq!(published.state, ResourceState::Unchanged);
        let header = store.read_header(online, "/a.txt").await.unwrap();
        assert_eq!(header.owner, UserId::from("alice"));
        assert_eq!(header.length, 4);
        assert_eq!(store.read_content(online, "/a.txt").await.unwrap(), b"new!");
        // The source row is untouched.
        assert_eq!(store.read_header(work, "/a.txt").await.unwrap().state, ResourceState::New);
    }

    #[tokio::test]
    async fn test_corrupt_content_detected() {
        let (db, store, _online, work) = setup().await;
        store.create(work, &file(work, "/a.txt"), Some(b"x".as_slice())).await.unwrap();
        sqlx::query("UPDATE contents SET data = ? WHERE path = ?")
            .bind(b"tampered".as_slice())
            .bind("/a.txt")
            .execute(db.pool())
            .await
            .unwrap();
        let err = store.read_content(work, "/a.txt").await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::Corrupt(_, _)));
    }

    /// Several pool connections against one file, so writers really race.
    async fn setup_file_backed(dir: &tempfile::TempDir) -> (Database, ResourceStore, ProjectId, ProjectId) {
        seed(Database::connect(dir.path().join("verso.db")).await.unwrap()).await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_create_has_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let (db, store, _online, work) = setup_file_backed(&dir).await;
        let tasks = (0..8u8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.create(work, &file(work, "/race.txt"), Some([i].as_slice())).await })
            })
            .collect::<Vec<_>>();

        let (mut created, mut duplicates) = (0, 0);
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(err) => {
                    assert!(matches!(err.deref(), ErrorKind::DuplicateKey(p, path) if *p == work && path == "/race.txt"));
                    duplicates += 1;
                },
            }
        }
        assert_eq!((created, duplicates), (1, 7));
        assert_eq!(store.count_content(work, "/race.txt").await.unwrap(), 1);
        db.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_keep_header_and_content_together() {
        let dir = tempfile::tempdir().unwrap();
        let (db, store, _online, work) = setup_file_backed(&dir).await;
        let header = store.create(work, &file(work, "/a.txt"), Some(b"seed".as_slice())).await.unwrap();
        let tasks = (1..=8u8)
            .map(|i| {
                let store = store.clone();
                let header = header.clone();
                let content = vec![i; usize::from(i)];
                tokio::spawn(async move { store.commit_write(work, &header, &content, ResourceState::New, None).await })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let content = store.read_content(work, "/a.txt").await.unwrap();
        let header = store.read_header(work, "/a.txt").await.unwrap();
        assert_eq!(header.length, u64::try_from(content.len()).unwrap());
        assert!(content.iter().all(|b| usize::from(*b) == content.len()));
        assert_eq!(store.count_content(work, "/a.txt").await.unwrap(), 1);
        db.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_writes_realize_once() {
        let dir = tempfile::tempdir().unwrap();
        let (db, store, online, work) = setup_file_backed(&dir).await;
        store.replace(online, &file(online, "/a.txt"), Some(b"published".as_slice())).await.unwrap();
        let staged = store.create(work, &file(work, "/a.txt").with_state(ResourceState::Unchanged), None).await.unwrap();
        let changed = staged.with_state(ResourceState::Changed);
        let tasks = (0..8u8)
            .map(|i| {
                let store = store.clone();
                let changed = changed.clone();
                tokio::spawn(async move {
                    store.commit_write(work, &changed, &[i], ResourceState::Unchanged, Some(online)).await
                })
            })
            .collect::<Vec<_>>();

        let mut applied = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => applied += 1,
                Err(err) => assert!(matches!(err.deref(), ErrorKind::StateChanged(_, _))),
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(store.read_header(work, "/a.txt").await.unwrap().state, ResourceState::Changed);
        assert_eq!(store.count_content(work, "/a.txt").await.unwrap(), 1);
        db.close().await;
    }
}
