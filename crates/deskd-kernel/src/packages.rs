//! Packages.
//!
//! A package is a client application identified by a path such as
//! `default/Settings`. It may ship a server-side API reachable through the
//! `application` API method, and a spawner process started at boot.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::CoreResult;

/// Package metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    /// `<repository>/<name>`, e.g. `default/Settings`.
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawner: Option<SpawnerConfig>,
}

impl PackageManifest {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            description: String::new(),
            spawner: None,
        }
    }
}

/// Helper process started with the server and killed at shutdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Server-side API of a package.
#[async_trait]
pub trait PackageApi: Send + Sync {
    /// Handle `method` with `args`. Unknown methods are an
    /// `InvalidArgument` error.
    async fn call(&self, ctx: &RequestContext, method: &str, args: Value) -> CoreResult<Value>;
}

/// True if `path` is a blacklisted package or a file inside one.
pub fn is_blacklisted<S: AsRef<str>>(blacklist: &[S], path: &str) -> bool {
    let path = path.trim_matches('/');
    blacklist.iter().any(|entry| {
        let entry = entry.as_ref().trim_matches('/');
        !entry.is_empty()
            && (path == entry
                || path
                    .strip_prefix(entry)
                    .is_some_and(|rest| rest.starts_with('/')))
    })
}

/// Manifests and server APIs by package path.
#[derive(Default)]
pub struct PackageRegistry {
    manifests: BTreeMap<String, PackageManifest>,
    apis: HashMap<String, Arc<dyn PackageApi>>,
}

impl std::fmt::Debug for PackageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageRegistry")
            .field("manifests", &self.manifests.keys().collect::<Vec<_>>())
            .field("apis", &self.apis.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a manifest.
    pub fn insert(&mut self, manifest: PackageManifest) {
        self.manifests.insert(manifest.path.clone(), manifest);
    }

    /// Attach a server API to a package path.
    pub fn insert_api(&mut self, path: impl Into<String>, api: Arc<dyn PackageApi>) {
        self.apis.insert(path.into(), api);
    }

    pub fn get(&self, path: &str) -> Option<&PackageManifest> {
        self.manifests.get(path)
    }

    pub fn api(&self, path: &str) -> Option<Arc<dyn PackageApi>> {
        self.apis.get(path).cloned()
    }

    /// All manifests, sorted by path.
    pub fn manifests(&self) -> impl Iterator<Item = &PackageManifest> {
        self.manifests.values()
    }

    /// Manifests not matched by `blacklist`.
    pub fn visible<S: AsRef<str>>(&self, blacklist: &[S]) -> Vec<PackageManifest> {
        self.manifests
            .values()
            .filter(|m| !is_blacklisted(blacklist, &m.path))
            .cloned()
            .collect()
    }
}
