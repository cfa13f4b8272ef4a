use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{Lock, LockRow, UserId};
use exn::ResultExt;
use sqlx::SqlitePool;
use time::UtcDateTime;

/// Exclusive per-path write claims.
///
/// Locks are keyed by path alone, so a lock taken while editing in one project
/// also blocks the same path in every other project. The table is purely
/// advisory: nothing in the [`ResourceStore`](crate::ResourceStore) checks it.
#[derive(Debug, Clone)]
pub struct LockTable {
    pool: SqlitePool,
}
impl From<&Database> for LockTable {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl LockTable {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Claim `path` for `user`.
    ///
    /// Re-locking a path already held by the same user refreshes the lock. If
    /// another user holds it, [`ErrorKind::AlreadyLocked`] is returned unless
    /// `force` is set, in which case the lock is taken over.
    #[tracing::instrument(skip(self, user), fields(user = %user))]
    pub async fn lock(&self, path: &str, user: &UserId, force: bool) -> Result<()> {
        let query = match force {
            true => include_str!("../queries/force_lock.sql"),
            false => include_str!("../queries/lock.sql"),
        };
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let locked = sqlx::query(query)
            .bind(path)
            .bind(user.as_str())
            .bind(UtcDateTime::now().unix_timestamp())
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if locked.rows_affected() == 0 {
            let holder: Option<String> = sqlx::query_scalar("SELECT user_id FROM locks WHERE path = ?")
                .bind(path)
                .fetch_optional(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            let holder = holder.map(UserId::from).unwrap_or_else(|| user.clone());
            exn::bail!(ErrorKind::AlreadyLocked(path.to_string(), holder));
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Release the lock on `path`, whoever holds it.
    ///
    /// Returns `false` if the path was not locked.
    pub async fn unlock(&self, path: &str) -> Result<bool> {
        let deleted = sqlx::query(include_str!("../queries/unlock.sql"))
            .bind(path)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(deleted.rows_affected() > 0)
    }

    /// The lock on `path`, if any.
    pub async fn get(&self, path: &str) -> Result<Option<Lock>> {
        let row: Option<LockRow> = sqlx::query_as(include_str!("../queries/get_lock.sql"))
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Lock::try_from).transpose()
    }

    pub async fn locked_by(&self, path: &str) -> Result<Option<UserId>> {
        Ok(self.get(path).await?.map(|lock| lock.holder))
    }

    pub async fn is_locked(&self, path: &str) -> Result<bool> {
        Ok(self.get(path).await?.is_some())
    }

    /// Every lock currently held by `user`, ordered by path.
    pub async fn held_by(&self, user: &UserId) -> Result<Vec<Lock>> {
        let rows: Vec<LockRow> = sqlx::query_as(include_str!("../queries/list_locks_for_user.sql"))
            .bind(user.as_str())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Lock::try_from).collect()
    }

    /// Release every lock held by `user`, returning how many were released.
    pub async fn unlock_all(&self, user: &UserId) -> Result<u64> {
        let deleted = sqlx::query(include_str!("../queries/unlock_all_for_user.sql"))
            .bind(user.as_str())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(deleted.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Deref;

    async fn setup() -> LockTable {
        let db = Database::connect_in_memory().await.unwrap();
        LockTable::from(&db)
    }

    #[tokio::test]
    async fn test_lock_and_query() {
        let locks = setup().await;
        let bob = UserId::from("bob");
        assert!(!locks.is_locked("/a.txt").await.unwrap());
        locks.lock("/a.txt", &bob, false).await.unwrap();
        assert!(locks.is_locked("/a.txt").await.unwrap());
        assert_eq!(locks.locked_by("/a.txt").await.unwrap(), Some(bob.clone()));
        // Re-locking by the holder is a refresh, not a conflict.
        locks.lock("/a.txt", &bob, false).await.unwrap();
    }

    #[tokio::test]
    async fn test_conflicting_lock() {
        let locks = setup().await;
        let bob = UserId::from("bob");
        let alice = UserId::from("alice");
        locks.lock("/a.txt", &bob, false).await.unwrap();
        let err = locks.lock("/a.txt", &alice, false).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::AlreadyLocked(path, holder) if path == "/a.txt" && *holder == bob));
        assert_eq!(locks.locked_by("/a.txt").await.unwrap(), Some(bob));
    }

    #[tokio::test]
    async fn test_forced_lock_takes_over() {
        let locks = setup().await;
        locks.lock("/a.txt", &UserId::from("bob"), false).await.unwrap();
        locks.lock("/a.txt", &UserId::from("alice"), true).await.unwrap();
        assert_eq!(locks.locked_by("/a.txt").await.unwrap(), Some(UserId::from("alice")));
    }

    #[tokio::test]
    async fn test_unlock() {
        let locks = setup().await;
        locks.lock("/a.txt", &UserId::from("bob"), false).await.unwrap();
        assert!(locks.unlock("/a.txt").await.unwrap());
        assert!(!locks.unlock("/a.txt").await.unwrap());
        assert_eq!(locks.locked_by("/a.txt").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_held_by_and_unlock_all() {
        let locks = setup().await;
        let bob = UserId::from("bob");
        for path in ["/b", "/a", "/c"] {
            locks.lock(path, &bob, false).await.unwrap();
        }
        locks.lock("/d", &UserId::from("alice"), false).await.unwrap();
        let held = locks.held_by(&bob).await.unwrap();
        let paths = held.iter().map(|l| l.path.as_str()).collect::<Vec<_>>();
        assert_eq!(paths, ["/a", "/b", "/c"]);
        assert_eq!(locks.unlock_all(&bob).await.unwrap(), 3);
        assert!(locks.held_by(&bob).await.unwrap().is_empty());
        assert!(locks.is_locked("/d").await.unwrap());
    }
}
