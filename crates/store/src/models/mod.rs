mod ids;
mod lock;
mod project;
mod resource;

pub use self::ids::{GroupId, ProjectId, UserId};
pub use self::lock::Lock;
pub(crate) use self::lock::LockRow;
pub use self::project::{Project, ProjectKind};
pub(crate) use self::project::ProjectRow;
pub use self::resource::{File, Resource, ResourceKind, ResourceState};
pub(crate) use self::resource::ResourceRow;
