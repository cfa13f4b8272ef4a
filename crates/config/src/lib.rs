//! Configuration loading for verso.
//!
//! Configuration is layered with [`figment`], later layers overriding earlier
//! ones:
//!
//! 1. Built-in defaults ([`Config::default`]).
//! 2. A configuration file. Either the explicit path handed to
//!    [`Config::load`] (TOML, YAML or JSON, chosen by extension) or
//!    `verso.toml` in the platform configuration directory, if it exists.
//! 3. Environment variables prefixed with `VERSO_`, using `__` to separate
//!    nested keys (e.g. `VERSO_STORE__KIND=memory`).
//!
//! ```toml
//! [store]
//! kind = "sqlite"
//! path = "/var/lib/verso/verso.db"
//! max_connections = 5
//!
//! [vfs]
//! mount_point = "/mnt"
//! online_project = "Online"
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use derive_more::Display;
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "VERSO_";
const CONFIG_FILE_NAME: &str = "verso.toml";
const DATABASE_FILE_NAME: &str = "verso.db";
/// Name given to the online project when none is configured.
pub const DEFAULT_ONLINE_PROJECT: &str = "Online";

/// Which store implementation backs the resource tables.
///
/// Resolved once at startup from the `store.kind` key; there is no dynamic
/// lookup of store implementations after that.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// SQLite database file at [`StoreConfig::path`].
    #[default]
    #[display("sqlite")]
    Sqlite,
    /// Private in-memory SQLite database; everything is lost on exit.
    #[display("memory")]
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub kind: StoreKind,
    /// Database file, ignored for [`StoreKind::Memory`].
    pub path: PathBuf,
    /// Upper bound for pooled connections. Leave unset for the store default.
    pub max_connections: Option<u32>,
}
impl Default for StoreConfig {
    fn default() -> Self {
        let path = project_dirs()
            .map(|dirs| dirs.data_dir().join(DATABASE_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(DATABASE_FILE_NAME));
        Self {
            kind: StoreKind::default(),
            path,
            max_connections: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfsConfig {
    /// Prefix stripped from incoming paths before they reach the store.
    pub mount_point: Option<String>,
    /// Name of the single published project, created on first start.
    pub online_project: String,
}
impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            mount_point: None,
            online_project: DEFAULT_ONLINE_PROJECT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub vfs: VfsConfig,
}

impl Config {
    /// Load and validate the configuration.
    ///
    /// An explicit `path` must exist; the implicit platform configuration file
    /// is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let figment = match path {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::Load);
                }
                Self::figment(Some(path))
            },
            None => Self::figment(default_config_path().as_deref()),
        };
        let config: Config = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(store = %config.store.kind, online = %config.vfs.online_project, "Configuration loaded");
        Ok(config)
    }

    /// Build the layered provider without extracting it.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => figment.merge(Toml::file(path)),
            };
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.vfs.online_project.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("vfs.online_project"));
        }
        if let Some(mount) = &self.vfs.mount_point
            && !mount.starts_with('/')
        {
            exn::bail!(ErrorKind::Invalid("vfs.mount_point"));
        }
        if self.store.max_connections == Some(0) {
            exn::bail!(ErrorKind::Invalid("store.max_connections"));
        }
        Ok(())
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "verso")
}

/// Location of the implicit configuration file, if the platform has one.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    fn write_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.store.kind, StoreKind::Sqlite);
        assert_eq!(config.vfs.online_project, DEFAULT_ONLINE_PROJECT);
        assert!(config.vfs.mount_point.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_load_toml_file() {
        let file = write_config(
            ".toml",
            r#"
                [store]
                kind = "memory"
                max_connections = 2

                [vfs]
                mount_point = "/mnt"
                online_project = "Live"
            "#,
        );
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.store.kind, StoreKind::Memory);
        assert_eq!(config.store.max_connections, Some(2));
        assert_eq!(config.vfs.mount_point.as_deref(), Some("/mnt"));
        assert_eq!(config.vfs.online_project, "Live");
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let file = write_config(".json", r#"{"vfs": {"online_project": "Published"}}"#);
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.store, StoreConfig::default());
        assert_eq!(config.vfs.online_project, "Published");
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_unknown_store_kind() {
        let file = write_config(".toml", "[store]\nkind = \"postgres\"\n");
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(*err, ErrorKind::Load));
    }

    #[rstest]
    #[case("[vfs]\nonline_project = \"  \"\n", "vfs.online_project")]
    #[case("[vfs]\nmount_point = \"mnt\"\n", "vfs.mount_point")]
    #[case("[store]\nmax_connections = 0\n", "store.max_connections")]
    fn test_invalid_values(#[case] contents: &str, #[case] key: &str) {
        let file = write_config(".toml", contents);
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(*err, ErrorKind::Invalid(k) if k == key));
    }
}
