use crate::error::{Error, ErrorKind};
use crate::models::UserId;
use exn::ResultExt;
use time::UtcDateTime;

/// An exclusive write claim on a path, independent of any project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    pub path: String,
    pub holder: UserId,
    pub locked_at: UtcDateTime,
}

#[derive(sqlx::FromRow)]
pub(crate) struct LockRow {
    pub(crate) path: String,
    pub(crate) user_id: String,
    pub(crate) locked_at: i64,
}
impl TryFrom<LockRow> for Lock {
    type Error = Error;
    fn try_from(row: LockRow) -> Result<Self, Self::Error> {
        Ok(Self {
            path: row.path,
            holder: UserId::from(row.user_id),
            locked_at: UtcDateTime::from_unix_timestamp(row.locked_at)
                .or_raise(|| ErrorKind::InvalidData("lock date"))?,
        })
    }
}
