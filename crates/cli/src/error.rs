use derive_more::{Display, Error};
use verso_store::models::UserId;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not open the store")]
    Store,
    #[display("file store operation failed")]
    Vfs,
    #[display("could not read or write local data")]
    Io,
    #[display("no working project selected (pass --project or set VERSO_PROJECT)")]
    NoProject,
    /// Another user holds the lock on a path this command would modify.
    #[display("{_0} is locked by {_1}")]
    Locked(#[error(not(source))] String, UserId),
}
