//! VFS Error Types
//!
//! Store errors are re-raised into the matching kind here so callers only ever
//! match on one enum; the store's own frame stays in the error tree as a child.

use derive_more::{Display, Error};
use verso_store::error::{Error as StoreError, ErrorKind as StoreErrorKind};
use verso_store::models::UserId;

/// A VFS error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for VFS operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// ### Recoverable by the caller
/// - [`ErrorKind::NotFound`], [`ErrorKind::ProjectNotFound`]
/// - [`ErrorKind::DuplicateKey`]
/// - [`ErrorKind::AlreadyLocked`]
/// - [`ErrorKind::NotEmpty`]
/// - [`ErrorKind::NotAFile`], [`ErrorKind::NotAFolder`], [`ErrorKind::InvalidPath`]
/// - [`ErrorKind::ReadOnlyProject`], [`ErrorKind::OnlineProject`]
/// - [`ErrorKind::Conflict`]
///
/// ### Fatal to the current operation
/// - [`ErrorKind::Corrupt`]
/// - [`ErrorKind::Storage`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    #[display("project not found: {_0}")]
    ProjectNotFound(#[error(not(source))] String),
    /// A resource (or project name) is already taken.
    #[display("already exists: {_0}")]
    DuplicateKey(#[error(not(source))] String),
    #[display("{_0} is locked by {_1}")]
    AlreadyLocked(#[error(not(source))] String, UserId),
    /// Folders must be emptied before they can be deleted.
    #[display("folder is not empty: {_0}")]
    NotEmpty(#[error(not(source))] String),
    #[display("not a file: {_0}")]
    NotAFile(#[error(not(source))] String),
    #[display("not a folder: {_0}")]
    NotAFolder(#[error(not(source))] String),
    /// The online project only changes through publishing.
    #[display("the online project is read-only")]
    ReadOnlyProject,
    /// The online project cannot be deleted.
    #[display("operation not permitted on the online project")]
    OnlineProject,
    /// Another writer got to the resource first; re-read and try again.
    #[display("changed concurrently: {_0}")]
    Conflict(#[error(not(source))] String),
    /// Path escapes the root or contains invalid characters.
    #[display("invalid path: {_0}")]
    InvalidPath(#[error(not(source))] String),
    /// A changed or new file has no content, or its content fails the digest.
    #[display("corrupt content: {_0}")]
    Corrupt(#[error(not(source))] String),
    #[display("storage error")]
    Storage,
}

impl ErrorKind {
    /// Convert a store error into a VFS error, preserving the store crate's
    /// `Exn` frame as a child in the error tree.
    #[track_caller]
    pub fn store(err: StoreError) -> Error {
        let kind = match &*err {
            StoreErrorKind::NotFound(_, path) | StoreErrorKind::ContentNotFound(_, path) => {
                Self::NotFound(path.clone())
            },
            StoreErrorKind::ProjectNotFound(project) => Self::ProjectNotFound(project.clone()),
            StoreErrorKind::DuplicateKey(_, key) | StoreErrorKind::DuplicateProject(key) => {
                Self::DuplicateKey(key.clone())
            },
            StoreErrorKind::AlreadyLocked(path, holder) => Self::AlreadyLocked(path.clone(), holder.clone()),
            StoreErrorKind::OnlineProject => Self::OnlineProject,
            StoreErrorKind::StateChanged(_, path) => Self::Conflict(path.clone()),
            StoreErrorKind::Corrupt(_, path) => Self::Corrupt(path.clone()),
            StoreErrorKind::Database | StoreErrorKind::Migration | StoreErrorKind::InvalidData(_) => Self::Storage,
        };
        err.raise(kind)
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Conflict(_))
    }
}
