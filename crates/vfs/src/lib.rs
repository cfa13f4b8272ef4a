//! Versioned virtual file system on top of `verso-store`.
//!
//! Resources live in an online (published) project and any number of
//! offline (working) projects. Editing happens offline with copy-on-write
//! semantics:
//!
//! 1. [`stage`](Vfs::stage) copies an online header into the working project
//!    without its content.
//! 2. Reads of a staged file fall through to online; the first
//!    [`write_file`](Vfs::write_file) materializes a private copy.
//! 3. [`publish`](Vfs::publish) merges every new, changed and deleted
//!    resource back into the online project.
//!
//! The [`cow`] and [`publish`] modules expose the same steps as free
//! functions over a bare [`ResourceStore`](verso_store::ResourceStore) for
//! callers that manage project ids themselves.

pub mod cow;
pub mod error;
pub mod path;
pub mod publish;
mod vfs;

pub use crate::path::PathResolver;
pub use crate::publish::{Action, PublishEvent};
pub use crate::vfs::{Vfs, display_name};
