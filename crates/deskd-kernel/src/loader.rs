//! Module loading.
//!
//! Modules are registered explicitly: a [`ModuleRegistry`] maps the names
//! used in configuration to constructors. [`load`] runs once at boot,
//! instantiates what the configuration asks for and freezes the result
//! into an [`Instance`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{register_builtins, ApiTable};
use crate::auth::{Authenticator, DemoAuthenticator, StaticAuthenticator};
use crate::config::{ConfigError, DeskConfig, MountConfig};
use crate::instance::Instance;
use crate::packages::{PackageApi, PackageManifest, PackageRegistry};
use crate::session::SessionStore;
use crate::spawner::SpawnerSet;
use crate::storage::{FileStorage, MemoryStorage, Storage};
use crate::vfs::{LocalTransport, MemoryTransport, Mount, MountTable, Transport, TransportRegistry};

/// Boot failures.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unknown {kind} module: {name}")]
    UnknownModule { kind: &'static str, name: String },

    #[error("protocol {protocol} is already served by the {owner} transport")]
    DuplicateProtocol { protocol: String, owner: String },

    #[error("API method {0} is registered twice")]
    DuplicateMethod(String),

    #[error("mount {0} needs a root directory")]
    MissingRoot(String),

    #[error("module {name} failed to start: {message}")]
    Module { name: String, message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type AuthenticatorFactory =
    Arc<dyn Fn(&DeskConfig) -> Result<Arc<dyn Authenticator>, LoadError> + Send + Sync>;
pub type StorageFactory =
    Arc<dyn Fn(&DeskConfig) -> Result<Arc<dyn Storage>, LoadError> + Send + Sync>;
pub type TransportFactory =
    Arc<dyn Fn(&MountConfig) -> Result<Arc<dyn Transport>, LoadError> + Send + Sync>;
/// Adds methods to the API table.
pub type ApiExtension = Arc<dyn Fn(&mut ApiTable) -> Result<(), LoadError> + Send + Sync>;

/// Name → constructor maps for every pluggable module kind.
#[derive(Default, Clone)]
pub struct ModuleRegistry {
    authenticators: HashMap<String, AuthenticatorFactory>,
    storages: HashMap<String, StorageFactory>,
    transports: HashMap<String, TransportFactory>,
    package_apis: Vec<(String, Arc<dyn PackageApi>)>,
    extensions: Vec<ApiExtension>,
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("authenticators", &self.authenticators.keys().collect::<Vec<_>>())
            .field("storages", &self.storages.keys().collect::<Vec<_>>())
            .field("transports", &self.transports.keys().collect::<Vec<_>>())
            .field(
                "package_apis",
                &self.package_apis.iter().map(|(p, _)| p).collect::<Vec<_>>(),
            )
            .field("extensions", &self.extensions.len())
            .finish()
    }
}

impl ModuleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every module shipped in this crate plus the built-in
    /// API methods.
    pub fn with_defaults() -> Self {
        let mut modules = Self::new();

        modules.authenticator(DemoAuthenticator::NAME, |config| {
            Ok(Arc::new(DemoAuthenticator::from_config(&config.authenticator)))
        });
        modules.authenticator(StaticAuthenticator::NAME, |config| {
            Ok(Arc::new(StaticAuthenticator::from_config(&config.authenticator)))
        });

        modules.storage(MemoryStorage::NAME, |config| {
            Ok(Arc::new(MemoryStorage::with_blacklists(
                config.storage.blacklists.clone(),
            )))
        });
        modules.storage(FileStorage::NAME, |config| {
            Ok(Arc::new(
                FileStorage::new(&config.storage.root)
                    .with_blacklists(config.storage.blacklists.clone()),
            ))
        });

        modules.transport(LocalTransport::NAME, |mount| {
            let root = mount
                .root
                .as_ref()
                .ok_or_else(|| LoadError::MissingRoot(mount.protocol.clone()))?;
            Ok(Arc::new(LocalTransport::new(&mount.protocol, root)))
        });
        modules.transport(MemoryTransport::NAME, |mount| {
            Ok(Arc::new(MemoryTransport::new(&mount.protocol)))
        });

        modules.extension(register_builtins);
        modules
    }

    pub fn authenticator<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&DeskConfig) -> Result<Arc<dyn Authenticator>, LoadError> + Send + Sync + 'static,
    {
        self.authenticators.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn storage<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&DeskConfig) -> Result<Arc<dyn Storage>, LoadError> + Send + Sync + 'static,
    {
        self.storages.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn transport<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&MountConfig) -> Result<Arc<dyn Transport>, LoadError> + Send + Sync + 'static,
    {
        self.transports.insert(name.into(), Arc::new(factory));
        self
    }

    /// Attach a server API to a package path.
    pub fn package_api(&mut self, path: impl Into<String>, api: Arc<dyn PackageApi>) -> &mut Self {
        self.package_apis.push((path.into(), api));
        self
    }

    /// Add API methods at load time.
    pub fn extension<F>(&mut self, extension: F) -> &mut Self
    where
        F: Fn(&mut ApiTable) -> Result<(), LoadError> + Send + Sync + 'static,
    {
        self.extensions.push(Arc::new(extension));
        self
    }
}

fn lookup<'a, T>(
    map: &'a HashMap<String, T>,
    kind: &'static str,
    name: &str,
) -> Result<&'a T, LoadError> {
    map.get(name).ok_or_else(|| LoadError::UnknownModule {
        kind,
        name: name.to_string(),
    })
}

/// Build the instance described by `config`.
pub async fn load(config: DeskConfig, modules: &ModuleRegistry) -> Result<Arc<Instance>, LoadError> {
    config.validate()?;

    let authenticator =
        lookup(&modules.authenticators, "authenticator", &config.authenticator.name)?(&config)?;
    authenticator
        .register()
        .await
        .map_err(|e| LoadError::Module {
            name: config.authenticator.name.clone(),
            message: e.to_string(),
        })?;

    let storage = lookup(&modules.storages, "storage", &config.storage.name)?(&config)?;
    storage.register().await.map_err(|e| LoadError::Module {
        name: config.storage.name.clone(),
        message: e.to_string(),
    })?;

    let mut transports = TransportRegistry::new();
    let mut mounts = MountTable::new(config.default_protocol.clone());
    for mount_config in &config.mounts {
        let transport = lookup(&modules.transports, "transport", &mount_config.transport)?(mount_config)?;
        transports.register(transport.clone())?;

        let mount = Mount::new(&mount_config.protocol, transport)
            .with_label(mount_config.label.clone().unwrap_or_else(|| mount_config.protocol.clone()))
            .enabled(mount_config.enabled)
            .read_only(mount_config.read_only)
            .with_groups(mount_config.groups.clone());
        debug!(?mount, "mounted");
        mounts.insert(mount);
    }
    if mounts.get(&config.default_protocol).is_none() {
        warn!(protocol = %config.default_protocol, "default protocol has no mount");
    }

    let mut api = ApiTable::new();
    for extension in &modules.extensions {
        extension(&mut api)?;
    }

    let mut packages = PackageRegistry::new();
    for manifest in &config.packages {
        packages.insert(manifest.clone());
    }
    for (path, package_api) in &modules.package_apis {
        if packages.get(path).is_none() {
            let name = path.rsplit('/').next().unwrap_or(path);
            packages.insert(PackageManifest::new(path, name));
        }
        packages.insert_api(path.clone(), package_api.clone());
    }

    let spawners = SpawnerSet::new();
    for manifest in packages.manifests() {
        if let Some(spawner) = &manifest.spawner {
            if let Err(e) = spawners.spawn(&manifest.path, spawner) {
                warn!(package = %manifest.path, error = %e, "spawner failed to start");
            }
        }
    }

    let sessions = Arc::new(SessionStore::new(Duration::from_secs(
        config.session.max_idle_secs,
    )));

    info!(
        authenticator = authenticator.name(),
        storage = storage.name(),
        mounts = mounts.len(),
        methods = api.len(),
        spawners = spawners.len(),
        "instance loaded"
    );

    Ok(Arc::new(Instance {
        config,
        authenticator,
        storage,
        transports,
        mounts,
        api,
        packages,
        sessions,
        spawners,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> DeskConfig {
        let mut config = DeskConfig::default();
        for mount in &mut config.mounts {
            if mount.transport == "local" {
                mount.root = Some(format!("{}/{{username}}", dir.path().display()));
            }
        }
        config
    }

    #[tokio::test]
    async fn test_load_defaults() {
        let dir = TempDir::new().unwrap();
        let instance = load(config_in(&dir), &ModuleRegistry::with_defaults())
            .await
            .unwrap();

        assert_eq!(instance.authenticator.name(), "demo");
        assert_eq!(instance.storage.name(), "memory");
        assert_eq!(instance.mounts.len(), 2);
        assert_eq!(instance.transports.transports().len(), 2);
        assert_eq!(instance.mounts.default_protocol(), "home");
        for method in ["login", "logout", "settings", "packages", "application"] {
            assert!(instance.api.contains(method), "missing {}", method);
        }
    }

    #[tokio::test]
    async fn test_unknown_module() {
        let mut config = DeskConfig::default();
        config.storage.name = "postgres".into();
        let err = load(config, &ModuleRegistry::with_defaults()).await.unwrap_err();
        assert!(matches!(err, LoadError::UnknownModule { kind: "storage", name } if name == "postgres"));
    }

    #[tokio::test]
    async fn test_duplicate_protocol() {
        let mut config = DeskConfig::default();
        config.mounts = vec![
            MountConfig::new("tmp", "memory"),
            MountConfig::new("tmp", "memory"),
        ];
        let err = load(config, &ModuleRegistry::with_defaults()).await.unwrap_err();
        assert!(matches!(err, LoadError::DuplicateProtocol { protocol, .. } if protocol == "tmp"));
    }

    #[tokio::test]
    async fn test_local_mount_needs_root() {
        let mut config = DeskConfig::default();
        config.mounts = vec![MountConfig::new("home", "local")];
        let err = load(config, &ModuleRegistry::with_defaults()).await.unwrap_err();
        assert!(matches!(err, LoadError::MissingRoot(p) if p == "home"));
    }

    #[tokio::test]
    async fn test_duplicate_extension_method() {
        let mut modules = ModuleRegistry::with_defaults();
        modules.extension(register_builtins);
        let err = load(DeskConfig::default(), &modules).await.unwrap_err();
        assert!(matches!(err, LoadError::DuplicateMethod(_)));
    }
}
