//! SQLite persistence for the verso virtual file store.
//!
//! This crate owns every durable table and knows nothing about path
//! resolution or copy-on-write; those live in `verso-vfs`.
//!
//! # Architecture
//! - **Projects**: one online project holding the published tree, plus any
//!   number of offline projects where edits are staged.
//! - **Resources**: a header row per `(project, path)`. Folders end with `/`.
//!   Each row carries a lifecycle [`ResourceState`](models::ResourceState).
//! - **Contents**: the bytes of a file, at most one row per `(project, path)`,
//!   checked against a BLAKE3 digest on read. Staged files have no content
//!   row until their first write.
//! - **Locks**: per-path write claims shared by all projects.
//!
//! Open a [`Database`] once and build each component from it:
//!
//! ```no_run
//! # async fn run() -> verso_store::error::Result<()> {
//! let db = verso_store::Database::connect("verso.db").await?;
//! let resources = verso_store::ResourceStore::from(&db);
//! let locks = verso_store::LockTable::from(&db);
//! # Ok(())
//! # }
//! ```

mod db;
pub mod error;
mod locks;
pub mod models;
mod projects;
mod resources;

pub use crate::db::Database;
pub use crate::locks::LockTable;
pub use crate::projects::ProjectRepository;
pub use crate::resources::ResourceStore;
