use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{GroupId, Project, ProjectId, ProjectKind, ProjectRow, UserId};
use exn::ResultExt;
use sqlx::SqlitePool;
use time::UtcDateTime;

/// The set of projects: one online, any number offline.
#[derive(Debug, Clone)]
pub struct ProjectRepository {
    pool: SqlitePool,
}
impl From<&Database> for ProjectRepository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl ProjectRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        name: &str,
        owner: impl Into<UserId>,
        group: impl Into<GroupId>,
        kind: ProjectKind,
    ) -> Result<Project> {
        self.create_with_description(name, "", owner, group, kind).await
    }

    /// Create a project.
    ///
    /// Names are unique ([`ErrorKind::DuplicateProject`]), and so is the online
    /// project: creating a second one fails with [`ErrorKind::OnlineProject`].
    #[tracing::instrument(skip(self, description, owner, group))]
    pub async fn create_with_description(
        &self,
        name: &str,
        description: &str,
        owner: impl Into<UserId>,
        group: impl Into<GroupId>,
        kind: ProjectKind,
    ) -> Result<Project> {
        let owner = owner.into();
        let group = group.into();
        let result = sqlx::query(include_str!("../queries/insert_project.sql"))
            .bind(name)
            .bind(description)
            .bind(owner.as_str())
            .bind(group.as_str())
            .bind(ProjectRow::flags_for(kind))
            .bind(UtcDateTime::now().unix_timestamp())
            .execute(&self.pool)
            .await;
        let inserted = match result {
            Ok(inserted) => inserted,
            // Only the single-online-project index can still be violated here.
            Err(err) if err.as_database_error().is_some_and(|e| e.is_unique_violation()) => {
                exn::bail!(ErrorKind::OnlineProject);
            },
            Err(err) => return Err(err).or_raise(|| ErrorKind::Database),
        };
        if inserted.rows_affected() == 0 {
            exn::bail!(ErrorKind::DuplicateProject(name.to_string()));
        }
        let project = self.get(ProjectId::new(inserted.last_insert_rowid())).await?;
        tracing::info!(id = %project.id, kind = %project.kind, "Created project");
        Ok(project)
    }

    /// Fetch a project by id, failing with [`ErrorKind::ProjectNotFound`].
    pub async fn get(&self, id: ProjectId) -> Result<Project> {
        let row: Option<ProjectRow> = sqlx::query_as(include_str!("../queries/get_project.sql"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        match row {
            Some(row) => Project::try_from(row),
            None => exn::bail!(ErrorKind::ProjectNotFound(id.to_string())),
        }
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Project>> {
        let row: Option<ProjectRow> = sqlx::query_as(include_str!("../queries/get_project_by_name.sql"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Project::try_from).transpose()
    }

    /// The online project, if one has been created yet.
    pub async fn online(&self) -> Result<Option<Project>> {
        let row: Option<ProjectRow> = sqlx::query_as(include_str!("../queries/get_online_project.sql"))
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Project::try_from).transpose()
    }

    /// Return the online project, creating it under `name` on first use.
    ///
    /// An existing online project is returned as-is even when its name
    /// differs from `name`.
    pub async fn ensure_online(
        &self,
        name: &str,
        owner: impl Into<UserId>,
        group: impl Into<GroupId>,
    ) -> Result<Project> {
        if let Some(online) = self.online().await? {
            return Ok(online);
        }
        match self.create(name, owner, group, ProjectKind::Online).await {
            Ok(project) => Ok(project),
            // Lost a race against another process creating it.
            Err(err) if matches!(*err, ErrorKind::OnlineProject) => match self.online().await? {
                Some(online) => Ok(online),
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    /// Every project, ordered by id.
    pub async fn list(&self) -> Result<Vec<Project>> {
        let rows: Vec<ProjectRow> = sqlx::query_as(include_str!("../queries/list_projects.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Project::try_from).collect()
    }

    /// Delete an offline project together with all of its resources.
    ///
    /// The online project can never be deleted ([`ErrorKind::OnlineProject`]).
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: ProjectId) -> Result<()> {
        let project = self.get(id).await?;
        if project.is_online() {
            exn::bail!(ErrorKind::OnlineProject);
        }
        let deleted = sqlx::query(include_str!("../queries/delete_project.sql"))
            .bind(id.get())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if deleted.rows_affected() == 0 {
            exn::bail!(ErrorKind::ProjectNotFound(id.to_string()));
        }
        tracing::info!(name = %project.name, "Deleted project");
        Ok(())
    }
}
