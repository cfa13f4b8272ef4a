use crate::error::{Error, ErrorKind};
use crate::models::{GroupId, ProjectId, UserId};
use derive_more::Display;
use exn::ResultExt;
use time::UtcDateTime;

const FLAG_ONLINE: i64 = 1;

/// Published or working project.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectKind {
    /// The single published project.
    #[display("online")]
    Online,
    /// A workspace where edits are staged before publishing.
    #[display("offline")]
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub description: String,
    pub owner: UserId,
    pub group: GroupId,
    pub kind: ProjectKind,
    pub created_at: UtcDateTime,
}
impl Project {
    pub fn is_online(&self) -> bool {
        self.kind == ProjectKind::Online
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ProjectRow {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) owner_id: String,
    pub(crate) group_id: String,
    pub(crate) flags: i64,
    pub(crate) created_at: i64,
}
impl ProjectRow {
    pub(crate) fn flags_for(kind: ProjectKind) -> i64 {
        match kind {
            ProjectKind::Online => FLAG_ONLINE,
            ProjectKind::Offline => 0,
        }
    }
}
impl TryFrom<ProjectRow> for Project {
    type Error = Error;
    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ProjectId::new(row.id),
            name: row.name,
            description: row.description,
            owner: UserId::from(row.owner_id),
            group: GroupId::from(row.group_id),
            kind: match row.flags & FLAG_ONLINE {
                0 => ProjectKind::Offline,
                _ => ProjectKind::Online,
            },
            created_at: UtcDateTime::from_unix_timestamp(row.created_at)
                .or_raise(|| ErrorKind::InvalidData("project creation date"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_model() {
        let row = ProjectRow {
            id: 1,
            name: "Online".to_string(),
            description: String::new(),
            owner_id: "admin".to_string(),
            group_id: "administrators".to_string(),
            // Unknown bits are carried through without affecting the kind.
            flags: 0b101,
            created_at: 1771177811,
        };
        let project = Project::try_from(row).unwrap();
        assert!(project.is_online());
        assert_eq!(project.id, ProjectId::new(1));
    }

    #[test]
    fn test_flags_round_trip() {
        assert_eq!(ProjectRow::flags_for(ProjectKind::Online) & FLAG_ONLINE, FLAG_ONLINE);
        assert_eq!(ProjectRow::flags_for(ProjectKind::Offline) & FLAG_ONLINE, 0);
    }
}
