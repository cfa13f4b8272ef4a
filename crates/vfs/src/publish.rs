//! Merging an offline project into the online project.
//!
//! | source state | file                    | folder                  | recorded     |
//! |--------------|-------------------------|-------------------------|--------------|
//! | NEW          | replace online row      | replace online row      | yes          |
//! | CHANGED      | replace online row      | replace online row      | yes          |
//! | UNCHANGED    | nothing                 | replace online row      | folders only |
//! | DELETED      | delete online row       | delete online row       | yes          |
//!
//! Files are published before folders. The source project is left as it is.

use crate::error::{ErrorKind, Result};
use async_stream::stream;
use futures::{Stream, TryStreamExt};
use std::ops::Deref;
use tracing::instrument;
use verso_store::ResourceStore;
use verso_store::error::ErrorKind as StoreErrorKind;
use verso_store::models::{ProjectId, Resource, ResourceKind, ResourceState};

/// What publishing did with a single source resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// The online row was (re)created from the source resource.
    Replaced { path: String, kind: ResourceKind },
    /// The online row was removed because the source was deleted.
    Removed { path: String, kind: ResourceKind },
    /// Unchanged file; the online row already matches.
    Skipped { path: String },
}
impl Action {
    pub fn path(&self) -> &str {
        match self {
            Self::Replaced { path, .. } | Self::Removed { path, .. } | Self::Skipped { path } => path,
        }
    }

    /// Whether the path belongs in the list of changed paths.
    pub fn is_recorded(&self) -> bool {
        !matches!(self, Self::Skipped { .. })
    }
}

/// Progress events emitted by [`publish_stream`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started), exactly once.
/// 2. [`DiscoveryComplete`](Self::DiscoveryComplete), exactly once, with the
///    number of files and folders found in the source project.
/// 3. [`Published`](Self::Published), once per resource: files first, then
///    folders.
/// 4. [`Complete`](Self::Complete), exactly once.
///
/// The first error terminates the stream, in which case
/// [`Complete`](Self::Complete) is never emitted. Resources published before
/// the error stay published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishEvent {
    Started,
    DiscoveryComplete { files: u64, folders: u64 },
    Published(Action),
    Complete,
}

async fn publish_resource(store: &ResourceStore, online: ProjectId, resource: Resource) -> Result<Action> {
    let path = resource.path.clone();
    let kind = resource.kind;
    match (resource.state, kind) {
        (ResourceState::Unchanged, ResourceKind::File) => Ok(Action::Skipped { path }),
        (ResourceState::Deleted, _) => {
            store.physically_delete(online, &path).await.map_err(ErrorKind::store)?;
            Ok(Action::Removed { path, kind })
        },
        (_, ResourceKind::Folder) => {
            store.replace(online, &resource, None).await.map_err(ErrorKind::store)?;
            Ok(Action::Replaced { path, kind })
        },
        (ResourceState::New | ResourceState::Changed, ResourceKind::File) => {
            let content = match store.read_content(resource.project, &path).await {
                Ok(content) => content,
                Err(err) if matches!(err.deref(), StoreErrorKind::ContentNotFound(..)) => {
                    return Err(err.raise(ErrorKind::Corrupt(path)));
                },
                Err(err) => return Err(ErrorKind::store(err)),
            };
            store.replace(online, &resource, Some(content.as_slice())).await.map_err(ErrorKind::store)?;
            Ok(Action::Replaced { path, kind })
        },
    }
}

/// Streams [`PublishEvent`]s while merging `source` into `online`.
pub fn publish_stream<'a>(
    store: &'a ResourceStore,
    source: ProjectId,
    online: ProjectId,
) -> impl Stream<Item = Result<PublishEvent>> + 'a {
    // `rustfmt` does not format macros that use braces. Wrap in parentheses!
    stream!({
        yield Ok(PublishEvent::Started);
        if source == online {
            yield Err(exn::Exn::from(ErrorKind::ReadOnlyProject));
            return;
        }

        let files = match store.list_by_kind(source, ResourceKind::File).await.map_err(ErrorKind::store) {
            Ok(files) => files,
            Err(e) => {
                yield Err(e);
                return;
            },
        };
        let folders = match store.list_by_kind(source, ResourceKind::Folder).await.map_err(ErrorKind::store) {
            Ok(folders) => folders,
            Err(e) => {
                yield Err(e);
                return;
            },
        };
        // Infallible: a usize (either 32- or 64-bit) will always fit in a u64.
        yield Ok(PublishEvent::DiscoveryComplete {
            files: u64::try_from(files.len()).unwrap_or(0),
            folders: u64::try_from(folders.len()).unwrap_or(0),
        });

        for resource in files.into_iter().chain(folders) {
            match publish_resource(store, online, resource).await {
                Ok(action) => yield Ok(PublishEvent::Published(action)),
                Err(e) => {
                    yield Err(e);
                    return;
                },
            }
        }

        yield Ok(PublishEvent::Complete);
    })
}

/// Merge `source` into `online`, returning the changed paths in the order
/// they were published.
///
/// Publishing is not transactional as a whole: each resource is replaced
/// atomically, but a failure part-way leaves the earlier ones published.
#[instrument(skip(store))]
pub async fn publish(store: &ResourceStore, source: ProjectId, online: ProjectId) -> Result<Vec<String>> {
    let mut events = std::pin::pin!(publish_stream(store, source, online));
    let mut changed = Vec::new();
    let mut skipped = 0u64;
    while let Some(event) = events.try_next().await? {
        match event {
            PublishEvent::Published(action) if action.is_recorded() => changed.push(action.path().to_string()),
            PublishEvent::Published(_) => skipped += 1,
            _ => {},
        }
    }
    tracing::info!(changed = changed.len(), skipped, "Published project");
    Ok(changed)
}
