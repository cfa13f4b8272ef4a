//! Path resolution for externally supplied resource names.
//!
//! All paths inside the store are absolute, `/`-separated and free of `.` and
//! `..` segments. Folder paths keep a trailing `/`; file paths never have one.

use crate::error::{ErrorKind, Result};

const SEPARATOR: char = '/';
pub const ROOT: &str = "/";

/// Turns raw, possibly mount-prefixed, paths into canonical store paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathResolver {
    /// Mount point without a trailing separator; `None` when mounted at root.
    mount: Option<String>,
}
impl PathResolver {
    /// A mount point of `""` or `"/"` is the same as no mount point.
    pub fn new(mount: Option<&str>) -> Self {
        let mount = mount
            .map(|m| m.trim_end_matches(SEPARATOR))
            .filter(|m| !m.is_empty())
            .map(|m| match m.starts_with(SEPARATOR) {
                true => m.to_string(),
                false => format!("{SEPARATOR}{m}"),
            });
        Self { mount }
    }

    pub fn mount_point(&self) -> Option<&str> {
        self.mount.as_deref()
    }

    /// Strip the mount point from `raw`, if present on a segment boundary.
    ///
    /// Otherwise the input is returned unchanged, apart from gaining a leading
    /// separator when it has none. No other normalization happens here.
    ///
    /// ```
    /// use verso_vfs::PathResolver;
    /// let resolver = PathResolver::new(Some("/mnt"));
    /// assert_eq!(resolver.absolute("/mnt/x/y"), "/x/y");
    /// assert_eq!(resolver.absolute("/x/y"), "/x/y");
    /// assert_eq!(resolver.absolute("/mntx/y"), "/mntx/y");
    /// ```
    pub fn absolute(&self, raw: &str) -> String {
        let path = match raw.starts_with(SEPARATOR) {
            true => raw.to_string(),
            false => format!("{SEPARATOR}{raw}"),
        };
        if let Some(mount) = &self.mount
            && let Some(rest) = path.strip_prefix(mount.as_str())
        {
            if rest.is_empty() {
                return ROOT.to_string();
            }
            if rest.starts_with(SEPARATOR) {
                return rest.to_string();
            }
        }
        path
    }

    /// Resolve `raw` to a canonical store path.
    ///
    /// Empty and `.` segments are dropped and `..` pops the previous segment;
    /// popping past the root (or a NUL byte anywhere) is an
    /// [`InvalidPath`](ErrorKind::InvalidPath). A trailing separator is kept,
    /// marking the path as a folder.
    pub fn canonical(&self, raw: &str) -> Result<String> {
        if raw.contains('\0') {
            exn::bail!(ErrorKind::InvalidPath(raw.escape_default().to_string()));
        }
        let absolute = self.absolute(raw);
        let mut segments = Vec::new();
        for segment in absolute.split(SEPARATOR) {
            match segment {
                "" | "." => {},
                ".." => {
                    if segments.pop().is_none() {
                        exn::bail!(ErrorKind::InvalidPath(raw.to_string()));
                    }
                },
                segment => segments.push(segment),
            }
        }
        if segments.is_empty() {
            return Ok(ROOT.to_string());
        }
        let folder = absolute.ends_with(SEPARATOR) || absolute.ends_with("/.") || absolute.ends_with("/..");
        let mut path = String::with_capacity(absolute.len());
        for segment in segments {
            path.push(SEPARATOR);
            path.push_str(segment);
        }
        if folder {
            path.push(SEPARATOR);
        }
        Ok(path)
    }

    /// Canonical path of a file: must not be the root or end with `/`.
    pub fn file(&self, raw: &str) -> Result<String> {
        let path = self.canonical(raw)?;
        match is_folder_path(&path) {
            true => exn::bail!(ErrorKind::NotAFile(path)),
            false => Ok(path),
        }
    }

    /// Canonical path of a folder, adding the trailing `/` when missing.
    pub fn folder(&self, raw: &str) -> Result<String> {
        let mut path = self.canonical(raw)?;
        if !is_folder_path(&path) {
            path.push(SEPARATOR);
        }
        Ok(path)
    }
}

pub fn is_folder_path(path: &str) -> bool {
    path.ends_with(SEPARATOR)
}

/// Folder containing `path`, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    let trimmed = path.strip_suffix(SEPARATOR).unwrap_or(path);
    trimmed.rfind(SEPARATOR).map(|i| &path[..=i])
}

/// Last segment of `path`, without any trailing separator.
pub fn name(path: &str) -> &str {
    let trimmed = path.strip_suffix(SEPARATOR).unwrap_or(path);
    trimmed.rsplit(SEPARATOR).next().unwrap_or(trimmed)
}
