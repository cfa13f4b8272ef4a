use derive_more::Display;

/// Database identifier of a project.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProjectId(i64);
impl ProjectId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

/// Opaque identity of a user, as handed over by the caller.
#[derive(Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(String);
impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Opaque identity of a group, as handed over by the caller.
#[derive(Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(String);
impl GroupId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<String> for GroupId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
impl From<&str> for GroupId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
