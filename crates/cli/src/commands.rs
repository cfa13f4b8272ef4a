use crate::cli::GlobalArgs;
use crate::error::{ErrorKind, Result};
use clap::Subcommand;
use exn::ResultExt;
use futures::TryStreamExt;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use verso_store::models::{File, GroupId, Project, Resource, ResourceKind, UserId};
use verso_vfs::{Action, PublishEvent, Vfs, display_name};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage projects.
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Stage an online resource into the working project.
    Stage {
        path: String,
        /// Stage a folder together with everything underneath it.
        #[arg(long, short)]
        recursive: bool,
    },
    /// Print a file.
    Cat { path: String },
    /// Replace a file's content, staging or creating it as needed.
    Write {
        path: String,
        /// Read content from this local file instead of stdin.
        #[arg(long, short)]
        from: Option<PathBuf>,
    },
    /// Create an empty file if it does not exist yet.
    Touch { path: String },
    /// Create a folder.
    Mkdir { path: String },
    /// Delete a file.
    Rm { path: String },
    /// Delete an empty folder.
    Rmdir { path: String },
    /// Move a file.
    Mv { src: String, dst: String },
    /// Copy a file.
    Cp { src: String, dst: String },
    /// List a folder.
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Lock a path for the current user.
    Lock {
        path: String,
        /// Take the lock over from another user.
        #[arg(long)]
        force: bool,
    },
    /// Release a lock.
    Unlock {
        path: Option<String>,
        /// Release every lock held by the current user.
        #[arg(long, conflicts_with = "path")]
        all: bool,
        /// Release a lock held by another user.
        #[arg(long)]
        force: bool,
    },
    /// Publish the working project and release the current user's locks.
    Publish,
}

#[derive(Debug, Subcommand)]
pub enum ProjectCommand {
    /// Create an offline project.
    Create {
        name: String,
        #[arg(long, short, default_value = "")]
        description: String,
    },
    /// List all projects.
    List,
    /// Delete an offline project and everything staged in it.
    Delete { name: String },
}

/// Who is running the command, and against which project.
pub struct Session {
    pub vfs: Vfs,
    pub user: UserId,
    pub group: GroupId,
    pub project: Option<String>,
}
impl Session {
    pub fn new(vfs: Vfs, args: &GlobalArgs) -> Self {
        Self {
            vfs,
            user: UserId::from(args.user.as_str()),
            group: GroupId::from(args.group.as_str()),
            project: args.project.clone(),
        }
    }

    /// The project mutations go to; there is no default.
    async fn working_project(&self) -> Result<Project> {
        match &self.project {
            Some(name) => self.vfs.project(name).await.or_raise(|| ErrorKind::Vfs),
            None => exn::bail!(ErrorKind::NoProject),
        }
    }

    /// The project reads come from: the working project, or online.
    async fn viewed_project(&self) -> Result<Project> {
        match &self.project {
            Some(name) => self.vfs.project(name).await.or_raise(|| ErrorKind::Vfs),
            None => Ok(self.vfs.online().clone()),
        }
    }

    /// Refuse to touch a path another user has locked.
    async fn ensure_unlocked(&self, path: &str) -> Result<()> {
        match self.vfs.locked_by(path).await.or_raise(|| ErrorKind::Vfs)? {
            Some(holder) if holder != self.user => {
                let path = self.vfs.resolver().canonical(path).or_raise(|| ErrorKind::Vfs)?;
                exn::bail!(ErrorKind::Locked(path, holder))
            },
            _ => Ok(()),
        }
    }

    /// Bring an online resource into `project` unless it is already there.
    async fn ensure_staged(&self, project: &Project, path: &str) -> Result<Option<Resource>> {
        if let Some(existing) = self.vfs.stat(project, path).await.or_raise(|| ErrorKind::Vfs)? {
            return Ok(Some(existing));
        }
        let online = self.vfs.online();
        match self.vfs.stat(online, path).await.or_raise(|| ErrorKind::Vfs)? {
            Some(_) => Ok(Some(self.vfs.stage(project, path).await.or_raise(|| ErrorKind::Vfs)?)),
            None => Ok(None),
        }
    }
}

async fn read_input(from: Option<&PathBuf>) -> Result<Vec<u8>> {
    match from {
        Some(path) => tokio::fs::read(path).await.or_raise(|| ErrorKind::Io),
        None => {
            let mut content = Vec::new();
            tokio::io::stdin().read_to_end(&mut content).await.or_raise(|| ErrorKind::Io)?;
            Ok(content)
        },
    }
}

fn print_resource(resource: &Resource) {
    println!("{:<9} {:>10} {}", resource.state.to_string(), resource.length, display_name(resource));
}

impl Command {
    pub async fn execute(&self, session: &Session) -> Result<()> {
        let vfs = &session.vfs;
        match self {
            Self::Project(command) => command.execute(session).await,
            Self::Stage { path, recursive } => {
                let project = session.working_project().await?;
                let staged = match recursive {
                    true => vfs.stage_folder_tree(&project, path).await,
                    false => vfs.stage(&project, path).await.map(|r| vec![r]),
                }
                .or_raise(|| ErrorKind::Vfs)?;
                for resource in &staged {
                    println!("{}", resource.path);
                }
                Ok(())
            },
            Self::Cat { path } => {
                let project = session.viewed_project().await?;
                let file = vfs.read_file(&project, path).await.or_raise(|| ErrorKind::Vfs)?;
                let mut stdout = tokio::io::stdout();
                stdout.write_all(&file.content).await.or_raise(|| ErrorKind::Io)?;
                stdout.flush().await.or_raise(|| ErrorKind::Io)
            },
            Self::Write { path, from } => {
                let project = session.working_project().await?;
                session.ensure_unlocked(path).await?;
                let content = read_input(from.as_ref()).await?;
                let written = match session.ensure_staged(&project, path).await? {
                    Some(header) => vfs.write_file(&project, File { header, content }).await,
                    None => vfs.create_file(&project, path, &session.user, &session.group, &content).await,
                }
                .or_raise(|| ErrorKind::Vfs)?;
                tracing::info!(path = %written.path, state = %written.state, length = written.length, "Wrote file");
                Ok(())
            },
            Self::Touch { path } => {
                let project = session.working_project().await?;
                session.ensure_unlocked(path).await?;
                if session.ensure_staged(&project, path).await?.is_none() {
                    vfs.create_file(&project, path, &session.user, &session.group, &[])
                        .await
                        .or_raise(|| ErrorKind::Vfs)?;
                }
                Ok(())
            },
            Self::Mkdir { path } => {
                let project = session.working_project().await?;
                session.ensure_unlocked(path).await?;
                vfs.create_folder(&project, path, &session.user, &session.group).await.or_raise(|| ErrorKind::Vfs)?;
                Ok(())
            },
            Self::Rm { path } => {
                let project = session.working_project().await?;
                session.ensure_unlocked(path).await?;
                session.ensure_staged(&project, path).await?;
                vfs.delete_file(&project, path).await.or_raise(|| ErrorKind::Vfs)
            },
            Self::Rmdir { path } => {
                let project = session.working_project().await?;
                session.ensure_unlocked(path).await?;
                // Stage online children too, so they count towards emptiness.
                let folder = vfs.resolver().folder(path).or_raise(|| ErrorKind::Vfs)?;
                if vfs.stat(vfs.online(), &folder).await.or_raise(|| ErrorKind::Vfs)?.is_some() {
                    vfs.stage_folder_tree(&project, &folder).await.or_raise(|| ErrorKind::Vfs)?;
                }
                vfs.delete_folder(&project, path).await.or_raise(|| ErrorKind::Vfs)
            },
            Self::Mv { src, dst } => {
                let project = session.working_project().await?;
                session.ensure_unlocked(src).await?;
                session.ensure_unlocked(dst).await?;
                session.ensure_staged(&project, src).await?;
                vfs.move_file(&project, src, dst).await.or_raise(|| ErrorKind::Vfs)?;
                Ok(())
            },
            Self::Cp { src, dst } => {
                let project = session.working_project().await?;
                session.ensure_unlocked(dst).await?;
                session.ensure_staged(&project, src).await?;
                vfs.copy_file(&project, src, dst).await.or_raise(|| ErrorKind::Vfs)?;
                Ok(())
            },
            Self::Ls { path } => {
                let project = session.viewed_project().await?;
                for kind in [ResourceKind::Folder, ResourceKind::File] {
                    for resource in vfs.list_folder(&project, path, kind).await.or_raise(|| ErrorKind::Vfs)? {
                        print_resource(&resource);
                    }
                }
                Ok(())
            },
            Self::Lock { path, force } => {
                vfs.lock(path, &session.user, *force).await.or_raise(|| ErrorKind::Vfs)
            },
            Self::Unlock { path: _, all: true, .. } => {
                let released = vfs.unlock_all(&session.user).await.or_raise(|| ErrorKind::Vfs)?;
                tracing::info!(released, "Released locks");
                Ok(())
            },
            Self::Unlock { path: Some(path), force, .. } => {
                if !force {
                    session.ensure_unlocked(path).await?;
                }
                vfs.unlock(path).await.or_raise(|| ErrorKind::Vfs)?;
                Ok(())
            },
            Self::Unlock { path: None, .. } => {
                for lock in vfs.locks_held_by(&session.user).await.or_raise(|| ErrorKind::Vfs)? {
                    println!("{}", lock.path);
                }
                Ok(())
            },
            Self::Publish => {
                let project = session.working_project().await?;
                let mut events = std::pin::pin!(vfs.publish_stream(&project));
                while let Some(event) = events.try_next().await.or_raise(|| ErrorKind::Vfs)? {
                    match event {
                        PublishEvent::DiscoveryComplete { files, folders } => {
                            tracing::info!(files, folders, project = %project.name, "Publishing");
                        },
                        PublishEvent::Published(Action::Replaced { path, .. }) => println!("+ {path}"),
                        PublishEvent::Published(Action::Removed { path, .. }) => println!("- {path}"),
                        PublishEvent::Published(Action::Skipped { .. }) | PublishEvent::Started => {},
                        PublishEvent::Complete => tracing::info!(project = %project.name, "Published"),
                    }
                }
                vfs.unlock_all(&session.user).await.or_raise(|| ErrorKind::Vfs)?;
                Ok(())
            },
        }
    }
}

impl ProjectCommand {
    async fn execute(&self, session: &Session) -> Result<()> {
        let vfs = &session.vfs;
        match self {
            Self::Create { name, description } => {
                let project = vfs
                    .create_project(name, description, &session.user, &session.group)
                    .await
                    .or_raise(|| ErrorKind::Vfs)?;
                println!("{}", project.id);
                Ok(())
            },
            Self::List => {
                for project in vfs.projects().await.or_raise(|| ErrorKind::Vfs)? {
                    println!("{:>4} {:<8} {} {}", project.id, project.kind.to_string(), project.name, project.owner);
                }
                Ok(())
            },
            Self::Delete { name } => {
                let project = vfs.project(name).await.or_raise(|| ErrorKind::Vfs)?;
                vfs.delete_project(&project).await.or_raise(|| ErrorKind::Vfs)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Deref;
    use verso_store::Database;
    use verso_vfs::PathResolver;

    async fn session(user: &str) -> Session {
        let db = Database::connect_in_memory().await.unwrap();
        let vfs = Vfs::new(&db, PathResolver::default(), "Online").await.unwrap();
        let user = UserId::from(user);
        let group = GroupId::from("editors");
        vfs.create_project("Work", "", &user, &group).await.unwrap();
        Session { vfs, user, group, project: Some("Work".to_string()) }
    }

    #[tokio::test]
    async fn test_locked_path_is_refused() {
        let session = session("alice").await;
        session.vfs.lock("/a.txt", &UserId::from("bob"), false).await.unwrap();
        let err = Command::Touch { path: "/a.txt".to_string() }.execute(&session).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::Locked(path, holder) if path == "/a.txt" && holder.as_str() == "bob"));
        // Own locks do not get in the way.
        session.vfs.lock("/b.txt", &session.user, false).await.unwrap();
        Command::Touch { path: "/b.txt".to_string() }.execute(&session).await.unwrap();
    }

    #[tokio::test]
    async fn test_mutations_need_a_project() {
        let mut session = session("alice").await;
        session.project = None;
        let err = Command::Mkdir { path: "/docs/".to_string() }.execute(&session).await.unwrap_err();
        assert!(matches!(*err, ErrorKind::NoProject));
    }

    #[tokio::test]
    async fn test_rm_stages_online_file() {
        let session = session("alice").await;
        let work = session.vfs.project("Work").await.unwrap();
        Command::Touch { path: "/a.txt".to_string() }.execute(&session).await.unwrap();
        Command::Publish.execute(&session).await.unwrap();
        // A second project deletes the now-online file without staging it first.
        session.vfs.create_project("Cleanup", "", &session.user, &session.group).await.unwrap();
        let cleanup = Session { project: Some("Cleanup".to_string()), ..session };
        Command::Rm { path: "/a.txt".to_string() }.execute(&cleanup).await.unwrap();
        Command::Publish.execute(&cleanup).await.unwrap();
        let online = cleanup.vfs.online().clone();
        assert!(cleanup.vfs.stat(&online, "/a.txt").await.unwrap().is_none());
        assert!(cleanup.vfs.stat(&work, "/a.txt").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rmdir_counts_online_children() {
        let session = session("alice").await;
        Command::Mkdir { path: "/docs/".to_string() }.execute(&session).await.unwrap();
        Command::Touch { path: "/docs/a.txt".to_string() }.execute(&session).await.unwrap();
        Command::Publish.execute(&session).await.unwrap();
        session.vfs.create_project("Cleanup", "", &session.user, &session.group).await.unwrap();
        let cleanup = Session { project: Some("Cleanup".to_string()), ..session };
        let err = Command::Rmdir { path: "/docs".to_string() }.execute(&cleanup).await.unwrap_err();
        assert!(matches!(*err, ErrorKind::Vfs));
        let cleanup_project = cleanup.vfs.project("Cleanup").await.unwrap();
        let folder = cleanup.vfs.read_folder(&cleanup_project, "/docs/").await.unwrap();
        assert!(!folder.is_deleted());
    }

    #[tokio::test]
    async fn test_publish_releases_own_locks() {
        let session = session("alice").await;
        session.vfs.lock("/a.txt", &session.user, false).await.unwrap();
        Command::Touch { path: "/a.txt".to_string() }.execute(&session).await.unwrap();
        Command::Publish.execute(&session).await.unwrap();
        assert!(!session.vfs.is_locked("/a.txt").await.unwrap());
    }
}
