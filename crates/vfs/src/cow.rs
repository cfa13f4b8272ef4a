//! Copy-on-write content resolution between an offline project and the
//! online project.
//!
//! Staged resources (state [`Unchanged`](ResourceState::Unchanged)) carry a
//! header in the offline project but no content; reads fall through to the
//! online project until the first write materializes a private copy.

use crate::error::{ErrorKind, Result};
use std::ops::Deref;
use time::UtcDateTime;
use verso_store::ResourceStore;
use verso_store::error::ErrorKind as StoreErrorKind;
use verso_store::models::{File, ProjectId, Resource, ResourceKind, ResourceState};

/// Read a file as seen from `project`.
///
/// - In the online project, header and content both come from online.
/// - Otherwise the header comes from `project`: deleted files are
///   [`NotFound`](ErrorKind::NotFound), unchanged files take their content
///   from online, changed and new files from `project`.
///
/// A changed or new file without content of its own is reported as
/// [`Corrupt`](ErrorKind::Corrupt).
pub async fn read_file(store: &ResourceStore, project: ProjectId, online: ProjectId, path: &str) -> Result<File> {
    let header = store.read_header(project, path).await.map_err(ErrorKind::store)?;
    let source = match (project == online, header.state) {
        (true, _) => online,
        (false, ResourceState::Deleted) => exn::bail!(ErrorKind::NotFound(path.to_string())),
        (false, ResourceState::Unchanged) => online,
        (false, ResourceState::Changed | ResourceState::New) => project,
    };
    if header.is_folder() {
        exn::bail!(ErrorKind::NotAFile(path.to_string()));
    }
    let content = match store.read_content(source, path).await {
        Ok(content) => content,
        Err(err) if source == project && matches!(err.deref(), StoreErrorKind::ContentNotFound(..)) => {
            return Err(err.raise(ErrorKind::Corrupt(path.to_string())));
        },
        Err(err) => return Err(ErrorKind::store(err)),
    };
    Ok(File { header, content })
}

/// Write a file's header and content into `project`.
///
/// The stored state decides what happens, not the state on `file.header`:
/// an unchanged (staged) file first gets the online content materialized and
/// becomes [`Changed`](ResourceState::Changed); a changed file stays changed;
/// a new file stays new. The modification time is refreshed and the length
/// taken from the content. Every other header field is written as given.
///
/// All of it happens in one transaction, and only if the stored state is
/// still the one read here; otherwise [`Conflict`](ErrorKind::Conflict).
pub async fn write_file(store: &ResourceStore, project: ProjectId, online: ProjectId, file: File) -> Result<Resource> {
    if project == online {
        exn::bail!(ErrorKind::ReadOnlyProject);
    }
    let File { mut header, content } = file;
    let current = store.read_header(project, &header.path).await.map_err(ErrorKind::store)?;
    if current.is_folder() {
        exn::bail!(ErrorKind::NotAFile(header.path));
    }
    let (state, realize_from) = match current.state {
        ResourceState::Unchanged => (ResourceState::Changed, Some(online)),
        ResourceState::Changed => (ResourceState::Changed, None),
        ResourceState::New => (ResourceState::New, None),
        ResourceState::Deleted => exn::bail!(ErrorKind::NotFound(header.path)),
    };
    if realize_from.is_some() {
        tracing::debug!(%project, path = %header.path, "Materializing staged file");
    }
    header.kind = ResourceKind::File;
    header.state = state;
    header.modified_at = UtcDateTime::now();
    store
        .commit_write(project, &header, &content, current.state, realize_from)
        .await
        .map_err(ErrorKind::store)
}

/// Insert a new file into `project` with state [`New`](ResourceState::New).
pub async fn create_file(
    store: &ResourceStore,
    project: ProjectId,
    online: ProjectId,
    header: Resource,
    content: &[u8],
) -> Result<Resource> {
    if project == online {
        exn::bail!(ErrorKind::ReadOnlyProject);
    }
    if header.is_folder() {
        exn::bail!(ErrorKind::NotAFile(header.path));
    }
    let header = header.with_state(ResourceState::New);
    store.create(project, &header, Some(content)).await.map_err(ErrorKind::store)
}

/// Insert a new folder into `project` with state [`New`](ResourceState::New).
pub async fn create_folder(
    store: &ResourceStore,
    project: ProjectId,
    online: ProjectId,
    header: Resource,
) -> Result<Resource> {
    if project == online {
        exn::bail!(ErrorKind::ReadOnlyProject);
    }
    if header.is_file() {
        exn::bail!(ErrorKind::NotAFolder(header.path));
    }
    let header = header.with_state(ResourceState::New);
    store.create(project, &header, None).await.map_err(ErrorKind::store)
}

/// Stage the online resource at `path` into `project`.
///
/// The header is copied with state [`Unchanged`](ResourceState::Unchanged)
/// and no content, so reads keep resolving to online until the first write.
pub async fn copy_resource_to_project(
    store: &ResourceStore,
    online: ProjectId,
    project: ProjectId,
    path: &str,
) -> Result<Resource> {
    if project == online {
        exn::bail!(ErrorKind::ReadOnlyProject);
    }
    let header = store.read_header(online, path).await.map_err(ErrorKind::store)?;
    let header = header.with_state(ResourceState::Unchanged);
    store.create(project, &header, None).await.map_err(ErrorKind::store)
}
