//! Deployment configuration.
//!
//! One RON document describes the whole instance. Every field has a
//! default, so `()` is a valid (demo) configuration:
//!
//! ```ron
//! (
//!     bind: "0.0.0.0:8000",
//!     default_protocol: "home",
//!     authenticator: (name: "static", users: [
//!         (username: "amy", password: "secret", groups: ["fs"]),
//!     ]),
//!     mounts: [
//!         (protocol: "home", transport: "local", root: Some("~/deskd/{username}")),
//!         (protocol: "apps", transport: "local", root: Some("dist/apps"), read_only: true),
//!     ],
//!     api_groups: {"settings": ["settings"]},
//! )
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::packages::PackageManifest;
use crate::vfs::SEPARATOR;

/// Errors reading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskConfig {
    /// Listen address.
    pub bind: SocketAddr,
    /// Client distribution directory served for static requests.
    pub dist_dir: PathBuf,
    /// Protocol assumed for paths without `protocol://`.
    pub default_protocol: String,
    pub authenticator: AuthenticatorConfig,
    pub storage: StorageConfig,
    pub mounts: Vec<MountConfig>,
    /// API method name to the groups required to call it.
    pub api_groups: HashMap<String, Vec<String>>,
    pub packages: Vec<PackageManifest>,
    pub session: SessionConfig,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            dist_dir: PathBuf::from("dist"),
            default_protocol: "home".to_string(),
            authenticator: AuthenticatorConfig::default(),
            storage: StorageConfig::default(),
            mounts: vec![
                MountConfig {
                    label: Some("Home".to_string()),
                    root: Some("vfs/home/{username}".to_string()),
                    ..MountConfig::new("home", "local")
                },
                MountConfig {
                    label: Some("Temporary".to_string()),
                    ..MountConfig::new("tmp", "memory")
                },
            ],
            api_groups: HashMap::new(),
            packages: Vec::new(),
            session: SessionConfig::default(),
        }
    }
}

impl DeskConfig {
    /// Parse a RON document and expand paths.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: DeskConfig = ron::from_str(text)?;
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron_str(&text)
    }

    /// Expand `~` in every filesystem path.
    pub fn expand_paths(&mut self) {
        self.dist_dir = expand(&self.dist_dir.to_string_lossy()).into();
        self.storage.root = expand(&self.storage.root);
        for mount in &mut self.mounts {
            if let Some(root) = mount.root.as_mut() {
                *root = expand(root);
            }
        }
    }

    /// Structural checks the loader relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for mount in &self.mounts {
            if mount.protocol.is_empty() || mount.protocol.contains(SEPARATOR) {
                return Err(ConfigError::Invalid(format!(
                    "mount protocol {:?} must be non-empty and contain no {:?}",
                    mount.protocol, SEPARATOR
                )));
            }
        }
        if self.default_protocol.contains(SEPARATOR) {
            return Err(ConfigError::Invalid(format!(
                "default_protocol {:?} contains {:?}",
                self.default_protocol, SEPARATOR
            )));
        }
        Ok(())
    }

    pub fn mount(&self, protocol: &str) -> Option<&MountConfig> {
        self.mounts.iter().find(|m| m.protocol == protocol)
    }
}

fn expand(path: &str) -> String {
    shellexpand::tilde(path).into_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticatorConfig {
    /// Authenticator module name (`demo`, `static`).
    pub name: String,
    /// Groups granted by authenticators that have no user database.
    pub default_groups: Vec<String>,
    pub users: Vec<UserConfig>,
}

impl Default for AuthenticatorConfig {
    fn default() -> Self {
        Self {
            name: "demo".to_string(),
            default_groups: vec![deskd_types::ADMIN_GROUP.to_string()],
            users: Vec::new(),
        }
    }
}

/// A user known to the `static` authenticator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage module name (`memory`, `file`).
    pub name: String,
    /// Root directory for file-backed storage.
    pub root: String,
    /// Initial package blacklists per username.
    pub blacklists: HashMap<String, Vec<String>>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            name: "memory".to_string(),
            root: "vfs/storage".to_string(),
            blacklists: HashMap::new(),
        }
    }
}

/// One entry of the mount table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    pub protocol: String,
    /// Transport module name (`local`, `memory`).
    pub transport: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub read_only: bool,
    /// Groups required to use this mount.
    #[serde(default)]
    pub groups: Vec<String>,
    /// Root for disk-backed transports; may contain `{username}`.
    #[serde(default)]
    pub root: Option<String>,
}

impl MountConfig {
    pub fn new(protocol: impl Into<String>, transport: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            transport: transport.into(),
            label: None,
            enabled: true,
            read_only: false,
            groups: Vec::new(),
            root: None,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub max_idle_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "deskd.sid".to_string(),
            max_idle_secs: 24 * 60 * 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = DeskConfig::from_ron_str("()").unwrap();
        assert_eq!(config.bind.port(), 8000);
        assert_eq!(config.default_protocol, "home");
        assert_eq!(config.authenticator.name, "demo");
        assert_eq!(config.storage.name, "memory");
        assert_eq!(config.session.cookie_name, "deskd.sid");

        let home = config.mount("home").unwrap();
        assert_eq!(home.transport, "local");
        assert_eq!(home.root.as_deref(), Some("vfs/home/{username}"));
        assert_eq!(config.mount("tmp").unwrap().transport, "memory");
    }

    #[test]
    fn test_full_document() {
        let text = r#"(
            bind: "0.0.0.0:9000",
            default_protocol: "tmp",
            authenticator: (name: "static", users: [
                (username: "amy", password: "pw", groups: ["fs"]),
            ]),
            mounts: [
                (protocol: "tmp", transport: "memory"),
                (protocol: "apps", transport: "local", root: Some("/srv/apps"), read_only: true, groups: ["apps"]),
                (protocol: "old", transport: "memory", enabled: false),
            ],
            api_groups: {"settings": ["settings"]},
            packages: [(path: "default/Editor", name: "Editor")],
        )"#;
        let config = DeskConfig::from_ron_str(text).unwrap();
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.authenticator.users[0].groups, vec!["fs"]);
        assert_eq!(config.mounts.len(), 3);

        let apps = config.mount("apps").unwrap();
        assert!(apps.read_only);
        assert!(apps.enabled);
        assert_eq!(apps.groups, vec!["apps"]);
        assert!(!config.mount("old").unwrap().enabled);
        assert_eq!(config.api_groups["settings"], vec!["settings"]);
        assert_eq!(config.packages[0].path, "default/Editor");
    }

    #[test]
    fn test_sample_config() {
        let config = DeskConfig::from_ron_str(include_str!("../../../deskd.ron")).unwrap();
        assert_eq!(config.authenticator.name, "static");
        assert_eq!(config.storage.name, "file");
        assert!(config.mount("apps").unwrap().read_only);
        assert_eq!(config.storage.blacklists["demo"], vec!["default/Terminal"]);
    }

    #[test]
    fn test_tilde_is_expanded() {
        let config = DeskConfig::from_ron_str(r#"(dist_dir: "~/dist")"#).unwrap();
        assert!(!config.dist_dir.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_protocol_with_separator_rejected() {
        let text = r#"(mounts: [(protocol: "a://b", transport: "memory")])"#;
        assert!(matches!(
            DeskConfig::from_ron_str(text),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            DeskConfig::from_ron_str("(bind: )"),
            Err(ConfigError::Ron(_))
        ));
    }
}
