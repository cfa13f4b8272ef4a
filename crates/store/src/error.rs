//! Store Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use crate::models::{ProjectId, UserId};
use derive_more::{Display, Error};

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
///
/// ### Expected, recoverable by the caller
/// - [`ErrorKind::NotFound`], [`ErrorKind::ContentNotFound`]
/// - [`ErrorKind::ProjectNotFound`]
/// - [`ErrorKind::DuplicateKey`], [`ErrorKind::DuplicateProject`]
/// - [`ErrorKind::AlreadyLocked`]
/// - [`ErrorKind::OnlineProject`]
/// - [`ErrorKind::StateChanged`]
///
/// ### Fatal to the current operation
/// - [`ErrorKind::Database`], [`ErrorKind::Migration`]
/// - [`ErrorKind::Corrupt`], [`ErrorKind::InvalidData`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    #[display("resource not found: {_1} (project {_0})")]
    NotFound(#[error(not(source))] ProjectId, String),
    /// The resource row exists but no content row does.
    #[display("content not found: {_1} (project {_0})")]
    ContentNotFound(#[error(not(source))] ProjectId, String),
    #[display("project not found: {_0}")]
    ProjectNotFound(#[error(not(source))] String),
    #[display("resource already exists: {_1} (project {_0})")]
    DuplicateKey(#[error(not(source))] ProjectId, String),
    #[display("project already exists: {_0}")]
    DuplicateProject(#[error(not(source))] String),
    #[display("{_0} is locked by {_1}")]
    AlreadyLocked(#[error(not(source))] String, UserId),
    /// Another writer changed the row's state first.
    #[display("resource changed concurrently: {_1} (project {_0})")]
    StateChanged(#[error(not(source))] ProjectId, String),
    /// The online project cannot be deleted or replaced.
    #[display("operation not permitted on the online project")]
    OnlineProject,
    /// Stored content does not match its recorded digest.
    #[display("corrupt content: {_1} (project {_0})")]
    Corrupt(#[error(not(source))] ProjectId, String),
    #[display("invalid store data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database | Self::StateChanged(..))
    }
}
