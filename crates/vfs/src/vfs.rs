use crate::error::{ErrorKind, Result};
use crate::path::{self, PathResolver, ROOT};
use crate::publish::{self, PublishEvent};
use crate::cow;
use futures::Stream;
use time::UtcDateTime;
use tracing::instrument;
use verso_config::VfsConfig;
use verso_store::models::{File, GroupId, Lock, Project, ProjectKind, Resource, ResourceKind, ResourceState, UserId};
use verso_store::{Database, LockTable, ProjectRepository, ResourceStore};

/// Owner recorded on the online project when it is created implicitly.
const SYSTEM_USER: &str = "system";
const SYSTEM_GROUP: &str = "system";

/// Entry point to the versioned file store.
///
/// Every path argument is a raw, caller-supplied path: it goes through the
/// [`PathResolver`] (mount point stripped, `.`/`..` resolved) before it
/// reaches the store. Paths ending with `/` are folders.
///
/// The online project is read-only here; it only changes through
/// [`publish`](Self::publish). Locks are exposed but never enforced: checking
/// them before a mutation is the caller's decision.
#[derive(Debug, Clone)]
pub struct Vfs {
    resources: ResourceStore,
    locks: LockTable,
    projects: ProjectRepository,
    resolver: PathResolver,
    online: Project,
}

impl Vfs {
    /// Build the handle on top of an open [`Database`], creating the online
    /// project as `online_project` if the store does not have one yet.
    #[instrument(skip(db, resolver))]
    pub async fn new(db: &Database, resolver: PathResolver, online_project: &str) -> Result<Self> {
        let projects = ProjectRepository::from(db);
        let online = projects
            .ensure_online(online_project, SYSTEM_USER, SYSTEM_GROUP)
            .await
            .map_err(ErrorKind::store)?;
        if online.name != online_project {
            tracing::warn!(configured = online_project, existing = %online.name, "Online project name differs");
        }
        Ok(Self {
            resources: ResourceStore::from(db),
            locks: LockTable::from(db),
            projects,
            resolver,
            online,
        })
    }

    pub async fn from_config(db: &Database, config: &VfsConfig) -> Result<Self> {
        Self::new(db, PathResolver::new(config.mount_point.as_deref()), &config.online_project).await
    }

    pub fn online(&self) -> &Project {
        &self.online
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    fn writable(&self, project: &Project) -> Result<()> {
        match project.id == self.online.id {
            true => exn::bail!(ErrorKind::ReadOnlyProject),
            false => Ok(()),
        }
    }

    // =========================================================================
    // Projects
    // =========================================================================

    /// Create an offline project.
    pub async fn create_project(
        &self,
        name: &str,
        description: &str,
        owner: &UserId,
        group: &GroupId,
    ) -> Result<Project> {
        self.projects
            .create_with_description(name, description, owner.clone(), group.clone(), ProjectKind::Offline)
            .await
            .map_err(ErrorKind::store)
    }

    /// Look a project up by name.
    pub async fn project(&self, name: &str) -> Result<Project> {
        match self.projects.get_by_name(name).await.map_err(ErrorKind::store)? {
            Some(project) => Ok(project),
            None => exn::bail!(ErrorKind::ProjectNotFound(name.to_string())),
        }
    }

    pub async fn projects(&self) -> Result<Vec<Project>> {
        self.projects.list().await.map_err(ErrorKind::store)
    }

    /// Delete an offline project and everything staged in it.
    pub async fn delete_project(&self, project: &Project) -> Result<()> {
        self.projects.delete(project.id).await.map_err(ErrorKind::store)
    }

    // =========================================================================
    // Files and folders
    // =========================================================================

    /// The raw header at `path` in `project`, deleted or not.
    pub async fn stat(&self, project: &Project, path: &str) -> Result<Option<Resource>> {
        let path = self.resolver.canonical(path)?;
        self.resources.find_header(project.id, &path).await.map_err(ErrorKind::store)
    }

    pub async fn read_file(&self, project: &Project, path: &str) -> Result<File> {
        let path = self.resolver.file(path)?;
        cow::read_file(&self.resources, project.id, self.online.id, &path).await
    }

    /// Write `file` into `project`; see [`cow::write_file`].
    pub async fn write_file(&self, project: &Project, mut file: File) -> Result<Resource> {
        self.writable(project)?;
        file.header.path = self.resolver.file(&file.header.path)?;
        cow::write_file(&self.resources, project.id, self.online.id, file).await
    }

    pub async fn create_file(
        &self,
        project: &Project,
        path: &str,
        owner: &UserId,
        group: &GroupId,
        content: &[u8],
    ) -> Result<Resource> {
        self.writable(project)?;
        let path = self.resolver.file(path)?;
        let header = Resource::file(project.id, path, owner.clone(), group.clone());
        cow::create_file(&self.resources, project.id, self.online.id, header, content).await
    }

    pub async fn create_folder(&self, project: &Project, path: &str, owner: &UserId, group: &GroupId) -> Result<Resource> {
        self.writable(project)?;
        let path = self.resolver.folder(path)?;
        if path == ROOT {
            exn::bail!(ErrorKind::DuplicateKey(path));
        }
        let header = Resource::folder(project.id, path, owner.clone(), group.clone());
        cow::create_folder(&self.resources, project.id, self.online.id, header).await
    }

    /// Stage the online resource at `path` into `project` without copying
    /// its content.
    pub async fn stage(&self, project: &Project, path: &str) -> Result<Resource> {
        self.writable(project)?;
        let path = self.resolver.canonical(path)?;
        cow::copy_resource_to_project(&self.resources, self.online.id, project.id, &path).await
    }

    /// Stage an online folder and everything underneath it.
    ///
    /// Resources already present in `project` are left alone. Returns the
    /// newly staged resources, parents before children.
    #[instrument(skip(self, project), fields(project = %project.id))]
    pub async fn stage_folder_tree(&self, project: &Project, folder: &str) -> Result<Vec<Resource>> {
        self.writable(project)?;
        let folder = self.resolver.folder(folder)?;
        let mut paths = Vec::new();
        if folder != ROOT {
            // Fails early when the folder is not online at all.
            let header = self.resources.read_header(self.online.id, &folder).await.map_err(ErrorKind::store)?;
            if !header.is_folder() {
                exn::bail!(ErrorKind::NotAFolder(folder));
            }
            paths.push(header.path);
        }
        let descendants = self.resources.list_descendants(self.online.id, &folder).await.map_err(ErrorKind::store)?;
        paths.extend(descendants.into_iter().map(|r| r.path));

        let mut staged = Vec::new();
        for path in paths {
            if self.resources.find_header(project.id, &path).await.map_err(ErrorKind::store)?.is_some() {
                continue;
            }
            staged.push(cow::copy_resource_to_project(&self.resources, self.online.id, project.id, &path).await?);
        }
        tracing::info!(%folder, staged = staged.len(), "Staged folder tree");
        Ok(staged)
    }

    /// Header of a visible folder.
    pub async fn read_folder(&self, project: &Project, path: &str) -> Result<Resource> {
        let path = self.resolver.folder(path)?;
        let header = self.resources.read_header(project.id, &path).await.map_err(ErrorKind::store)?;
        if header.is_deleted() {
            exn::bail!(ErrorKind::NotFound(path));
        }
        Ok(header)
    }

    /// Visible (not deleted) direct children of a folder, ordered by path.
    pub async fn list_folder(&self, project: &Project, path: &str, kind: ResourceKind) -> Result<Vec<Resource>> {
        let path = self.resolver.folder(path)?;
        let children = self.resources.list_children(project.id, &path, kind).await.map_err(ErrorKind::store)?;
        Ok(children.into_iter().filter(|r| !r.is_deleted()).collect())
    }

    /// Mark a file deleted; the removal reaches online on publish.
    pub async fn delete_file(&self, project: &Project, path: &str) -> Result<()> {
        self.writable(project)?;
        let path = self.resolver.file(path)?;
        let header = self.resources.read_header(project.id, &path).await.map_err(ErrorKind::store)?;
        if header.is_folder() {
            exn::bail!(ErrorKind::NotAFile(path));
        }
        self.resources.mark_deleted(project.id, &path).await.map_err(ErrorKind::store)
    }

    /// Mark an empty folder deleted.
    ///
    /// Fails with [`NotEmpty`](ErrorKind::NotEmpty) while any visible child
    /// remains in `project`, or while online still has a child that
    /// `project` has not staged (and so has not deleted either).
    pub async fn delete_folder(&self, project: &Project, path: &str) -> Result<()> {
        self.writable(project)?;
        let folder = self.read_folder(project, path).await?;
        for kind in [ResourceKind::File, ResourceKind::Folder] {
            if !self.list_folder(project, &folder.path, kind).await?.is_empty() {
                exn::bail!(ErrorKind::NotEmpty(folder.path));
            }
            let published = self
                .resources
                .list_children(self.online.id, &folder.path, kind)
                .await
                .map_err(ErrorKind::store)?;
            for child in published {
                let staged = self.resources.find_header(project.id, &child.path).await.map_err(ErrorKind::store)?;
                if staged.is_none() {
                    exn::bail!(ErrorKind::NotEmpty(folder.path));
                }
            }
        }
        self.resources.mark_deleted(project.id, &folder.path).await.map_err(ErrorKind::store)
    }

    /// Copy a file to `dst` as a new file, keeping the source's attributes.
    pub async fn copy_file(&self, project: &Project, src: &str, dst: &str) -> Result<Resource> {
        self.writable(project)?;
        let dst = self.resolver.file(dst)?;
        let File { header, content } = self.read_file(project, src).await?;
        let now = UtcDateTime::now();
        let copy = Resource {
            path: dst,
            project: project.id,
            state: ResourceState::New,
            locked_by: None,
            created_at: now,
            modified_at: now,
            ..header
        };
        self.resources.create(project.id, &copy, Some(content.as_slice())).await.map_err(ErrorKind::store)
    }

    /// Copy a file to `dst`, then delete the source.
    pub async fn move_file(&self, project: &Project, src: &str, dst: &str) -> Result<Resource> {
        let moved = self.copy_file(project, src, dst).await?;
        self.delete_file(project, src).await?;
        Ok(moved)
    }

    /// Physically remove a row from an offline project, discarding staged
    /// edits. Returns `false` when there was nothing to remove.
    pub async fn purge(&self, project: &Project, path: &str) -> Result<bool> {
        self.writable(project)?;
        let path = self.resolver.canonical(path)?;
        self.resources.physically_delete(project.id, &path).await.map_err(ErrorKind::store)
    }

    // =========================================================================
    // Locks
    // =========================================================================

    pub async fn lock(&self, path: &str, user: &UserId, force: bool) -> Result<()> {
        let path = self.resolver.canonical(path)?;
        self.locks.lock(&path, user, force).await.map_err(ErrorKind::store)
    }

    pub async fn unlock(&self, path: &str) -> Result<bool> {
        let path = self.resolver.canonical(path)?;
        self.locks.unlock(&path).await.map_err(ErrorKind::store)
    }

    pub async fn locked_by(&self, path: &str) -> Result<Option<UserId>> {
        let path = self.resolver.canonical(path)?;
        self.locks.locked_by(&path).await.map_err(ErrorKind::store)
    }

    pub async fn is_locked(&self, path: &str) -> Result<bool> {
        let path = self.resolver.canonical(path)?;
        self.locks.is_locked(&path).await.map_err(ErrorKind::store)
    }

    pub async fn locks_held_by(&self, user: &UserId) -> Result<Vec<Lock>> {
        self.locks.held_by(user).await.map_err(ErrorKind::store)
    }

    pub async fn unlock_all(&self, user: &UserId) -> Result<u64> {
        self.locks.unlock_all(user).await.map_err(ErrorKind::store)
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    /// Merge `project` into the online project; see [`publish`](crate::publish).
    pub async fn publish(&self, project: &Project) -> Result<Vec<String>> {
        publish::publish(&self.resources, project.id, self.online.id).await
    }

    pub fn publish_stream<'a>(&'a self, project: &Project) -> impl Stream<Item = Result<PublishEvent>> + 'a {
        publish::publish_stream(&self.resources, project.id, self.online.id)
    }
}

/// Name shown for a resource in listings: folders keep their trailing `/`.
pub fn display_name(resource: &Resource) -> String {
    match resource.kind {
        ResourceKind::File => path::name(&resource.path).to_string(),
        ResourceKind::Folder => format!("{}/", path::name(&resource.path)),
    }
}
