use crate::error::{Error, ErrorKind};
use crate::models::{GroupId, ProjectId, UserId};
use derive_more::Display;
use exn::ResultExt;
use std::str::FromStr;
use time::UtcDateTime;

/// Whether a resource carries content (file) or children (folder).
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    #[display("file")]
    File,
    #[display("folder")]
    Folder,
}
impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Folder => "folder",
        }
    }
}
impl FromStr for ResourceKind {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Self::File),
            "folder" => Ok(Self::Folder),
            _ => exn::bail!(ErrorKind::InvalidData("resource kind")),
        }
    }
}

/// What has to happen to a resource when its project is published.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Identical to the online project; content is read from there.
    #[display("unchanged")]
    Unchanged,
    #[display("changed")]
    Changed,
    #[display("new")]
    New,
    /// Logically deleted; invisible to reads, removed online on publish.
    #[display("deleted")]
    Deleted,
}
impl ResourceState {
    pub fn code(&self) -> i64 {
        match self {
            Self::Unchanged => 0,
            Self::Changed => 1,
            Self::New => 2,
            Self::Deleted => 3,
        }
    }
}
impl TryFrom<i64> for ResourceState {
    type Error = Error;
    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Unchanged),
            1 => Ok(Self::Changed),
            2 => Ok(Self::New),
            3 => Ok(Self::Deleted),
            _ => exn::bail!(ErrorKind::InvalidData("resource state")),
        }
    }
}

/// Resource header: everything about a resource except its content.
///
/// A resource is identified by `(path, project)`. Folder paths end with `/`,
/// file paths never do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub path: String,
    pub project: ProjectId,
    pub kind: ResourceKind,
    /// Opaque bitmask (internal, visible, ...).
    pub flags: u32,
    pub owner: UserId,
    pub group: GroupId,
    /// Opaque permission bitmask, interpreted by the access-control layer.
    pub access: u32,
    pub state: ResourceState,
    pub locked_by: Option<UserId>,
    /// Content handler hints. Never interpreted by the store.
    pub launcher_type: i32,
    pub launcher_class: String,
    pub created_at: UtcDateTime,
    pub modified_at: UtcDateTime,
    /// Content length in bytes; always zero for folders.
    pub length: u64,
}
impl Resource {
    fn new(
        kind: ResourceKind,
        project: ProjectId,
        path: impl Into<String>,
        owner: impl Into<UserId>,
        group: impl Into<GroupId>,
    ) -> Self {
        let now = UtcDateTime::now();
        Self {
            path: path.into(),
            project,
            kind,
            flags: 0,
            owner: owner.into(),
            group: group.into(),
            access: 0,
            state: ResourceState::New,
            locked_by: None,
            launcher_type: 0,
            launcher_class: String::new(),
            created_at: now,
            modified_at: now,
            length: 0,
        }
    }

    /// A fresh file header in state [`New`](ResourceState::New).
    pub fn file(
        project: ProjectId,
        path: impl Into<String>,
        owner: impl Into<UserId>,
        group: impl Into<GroupId>,
    ) -> Self {
        Self::new(ResourceKind::File, project, path, owner, group)
    }

    /// A fresh folder header in state [`New`](ResourceState::New).
    pub fn folder(
        project: ProjectId,
        path: impl Into<String>,
        owner: impl Into<UserId>,
        group: impl Into<GroupId>,
    ) -> Self {
        Self::new(ResourceKind::Folder, project, path, owner, group)
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_access(mut self, access: u32) -> Self {
        self.access = access;
        self
    }

    pub fn with_launcher(mut self, launcher_type: i32, launcher_class: impl Into<String>) -> Self {
        self.launcher_type = launcher_type;
        self.launcher_class = launcher_class.into();
        self
    }

    pub fn with_state(mut self, state: ResourceState) -> Self {
        self.state = state;
        self
    }

    pub fn is_file(&self) -> bool {
        self.kind == ResourceKind::File
    }

    pub fn is_folder(&self) -> bool {
        self.kind == ResourceKind::Folder
    }

    pub fn is_deleted(&self) -> bool {
        self.state == ResourceState::Deleted
    }
}

/// A file header together with its resolved content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub header: Resource,
    pub content: Vec<u8>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct ResourceRow {
    pub(crate) project_id: i64,
    pub(crate) path: String,
    pub(crate) kind: String,
    pub(crate) flags: i64,
    pub(crate) owner_id: String,
    pub(crate) group_id: String,
    pub(crate) access_flags: i64,
    pub(crate) state: i64,
    #[sqlx(default)]
    pub(crate) locked_by: Option<String>,
    pub(crate) launcher_type: i64,
    pub(crate) launcher_class: String,
    pub(crate) created_at: i64,
    pub(crate) modified_at: i64,
    pub(crate) length: i64,
}
impl TryFrom<&Resource> for ResourceRow {
    type Error = Error;
    fn try_from(resource: &Resource) -> Result<Self, Self::Error> {
        Ok(Self {
            project_id: resource.project.get(),
            path: resource.path.clone(),
            kind: resource.kind.as_str().to_string(),
            flags: i64::from(resource.flags),
            owner_id: resource.owner.as_str().to_string(),
            group_id: resource.group.as_str().to_string(),
            access_flags: i64::from(resource.access),
            state: resource.state.code(),
            locked_by: resource.locked_by.as_ref().map(|user| user.as_str().to_string()),
            launcher_type: i64::from(resource.launcher_type),
            launcher_class: resource.launcher_class.clone(),
            created_at: resource.created_at.unix_timestamp(),
            modified_at: resource.modified_at.unix_timestamp(),
            length: i64::try_from(resource.length).or_raise(|| ErrorKind::InvalidData("length"))?,
        })
    }
}
impl TryFrom<ResourceRow> for Resource {
    type Error = Error;
    fn try_from(row: ResourceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            path: row.path,
            project: ProjectId::new(row.project_id),
            kind: row.kind.parse()?,
            flags: u32::try_from(row.flags).or_raise(|| ErrorKind::InvalidData("flags"))?,
            owner: UserId::from(row.owner_id),
            group: GroupId::from(row.group_id),
            access: u32::try_from(row.access_flags).or_raise(|| ErrorKind::InvalidData("access flags"))?,
            state: ResourceState::try_from(row.state)?,
            locked_by: row.locked_by.map(UserId::from),
            launcher_type: i32::try_from(row.launcher_type).or_raise(|| ErrorKind::InvalidData("launcher type"))?,
            launcher_class: row.launcher_class,
            created_at: UtcDateTime::from_unix_timestamp(row.created_at)
                .or_raise(|| ErrorKind::InvalidData("creation date"))?,
            modified_at: UtcDateTime::from_unix_timestamp(row.modified_at)
                .or_raise(|| ErrorKind::InvalidData("modification date"))?,
            length: u64::try_from(row.length).or_raise(|| ErrorKind::InvalidData("length"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn row() -> ResourceRow {
        ResourceRow {
            project_id: 2,
            path: "/docs/readme.txt".to_string(),
            kind: "file".to_string(),
            flags: 1,
            owner_id: "bob".to_string(),
            group_id: "editors".to_string(),
            access_flags: 0o754,
            state: 1,
            locked_by: Some("alice".to_string()),
            launcher_type: 3,
            launcher_class: "com.example.Plain".to_string(),
            created_at: 820450800,
            modified_at: 1771177811,
            length: 42,
        }
    }

    #[test]
    fn test_row_to_model() {
        let model = Resource::try_from(row()).unwrap();
        assert_eq!(model.project, ProjectId::new(2));
        assert_eq!(model.kind, ResourceKind::File);
        assert_eq!(model.state, ResourceState::Changed);
        assert_eq!(model.locked_by, Some(UserId::from("alice")));
        assert_eq!(model.length, 42);
    }

    #[test]
    fn test_model_to_row() {
        let now = UtcDateTime::now();
        let model = Resource::folder(ProjectId::new(7), "/docs/", "bob", "editors")
            .with_access(0o700)
            .with_launcher(1, "folder");
        let row = ResourceRow::try_from(&model).unwrap();
        assert_eq!(row.kind, "folder");
        assert_eq!(row.state, 2);
        assert_eq!(row.locked_by, None);
        // Converting to a Unix timestamp (measured in seconds) inherently strips the nanoseconds component.
        assert!(row.created_at >= now.unix_timestamp());
    }

    #[test]
    fn test_invalid_row() {
        let mut bad_state = row();
        bad_state.state = 9;
        assert!(Resource::try_from(bad_state).is_err());
        let mut bad_kind = row();
        bad_kind.kind = "symlink".to_string();
        assert!(Resource::try_from(bad_kind).is_err());
        let mut bad_length = row();
        bad_length.length = -1;
        assert!(Resource::try_from(bad_length).is_err());
    }

    #[rstest]
    #[case(0, ResourceState::Unchanged)]
    #[case(1, ResourceState::Changed)]
    #[case(2, ResourceState::New)]
    #[case(3, ResourceState::Deleted)]
    fn test_state_codes(#[case] code: i64, #[case] state: ResourceState) {
        assert_eq!(ResourceState::try_from(code).unwrap(), state);
        assert_eq!(state.code(), code);
    }
}
