//! Opening, migrating and closing the SQLite store.

use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use tracing::instrument;
use verso_config::{StoreConfig, StoreKind};

use crate::error::{ErrorKind, Result};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
// One writer at a time in WAL mode anyway; the rest serve concurrent readers.
const MAX_CONNECTIONS: u32 = 5;

/// Database connection pool for the store.
///
/// This is the single store handle of the process: open it once at startup,
/// hand it to every component constructor ([`ResourceStore`](crate::ResourceStore),
/// [`LockTable`](crate::LockTable), [`ProjectRepository`](crate::ProjectRepository))
/// and [`close`](Self::close) it at shutdown.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    async fn new(options: SqliteConnectOptions, pool: SqlitePoolOptions) -> Result<Self> {
        let pool = pool
            // Per-connection pragmas; a pool opens several connections.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Open the store selected by configuration.
    #[instrument(skip(config), fields(kind = %config.kind))]
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        match config.kind {
            StoreKind::Sqlite => {
                if let Some(parent) = config.path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Database)?;
                }
                let options = Self::base_options().filename(&config.path).create_if_missing(true);
                let pool = SqlitePoolOptions::new().max_connections(config.max_connections.unwrap_or(MAX_CONNECTIONS));
                Self::new(options, pool).await
            },
            StoreKind::Memory => Self::connect_in_memory().await,
        }
    }

    /// Open (or create) a store file at `path` with the default pool size.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let options = Self::base_options().filename(path).create_if_missing(true);
        Self::new(options, SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS)).await
    }

    /// A throwaway store living in memory, used by `StoreKind::Memory` and
    /// by the test suites of the crates built on top of this one.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        // Every `:memory:` connection is its own database, so the pool holds
        // exactly one and never lets it expire.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
        Self::new(options, pool).await
    }

    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            // Resources, contents and locks cascade from projects.
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            // Editors of different resources still queue behind the one WAL
            // writer; wait for it rather than fail.
            .busy_timeout(std::time::Duration::from_millis(1500))
    }

    /// Tuning that `SqliteConnectOptions` has no setter for.
    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA wal_autocheckpoint = 1000;
                PRAGMA cache_size = -16384;
                PRAGMA temp_store = MEMORY;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Bring the schema up to date; already applied migrations are skipped.
    #[instrument("migrating store schema", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Shut the store down once every handle cloned from it is done.
    ///
    /// Components built from this `Database` share its pool and stop working
    /// as well.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}
