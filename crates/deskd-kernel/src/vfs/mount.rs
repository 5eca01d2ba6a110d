//! Mount table and virtual path resolution.
//!
//! Each mount binds one protocol to a transport plus its access policy.
//! The table is built once by the loader and never changes afterwards, so
//! lookups need no locking.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::path::VirtualPath;
use super::transport::Transport;
use crate::error::{CoreError, CoreResult};

/// A protocol bound to a transport.
#[derive(Clone)]
pub struct Mount {
    pub protocol: String,
    /// Human readable name shown to clients.
    pub label: String,
    pub enabled: bool,
    pub read_only: bool,
    /// Groups a caller needs to touch this mount (admin always passes).
    pub groups: Vec<String>,
    pub transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mount")
            .field("protocol", &self.protocol)
            .field("enabled", &self.enabled)
            .field("read_only", &self.read_only)
            .field("groups", &self.groups)
            .field("transport", &self.transport.name())
            .finish()
    }
}

impl Mount {
    pub fn new(protocol: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        let protocol = protocol.into();
        Self {
            label: protocol.clone(),
            protocol,
            enabled: true,
            read_only: false,
            groups: Vec::new(),
            transport,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }
}

/// Result of resolving a path string against the table.
#[derive(Debug, Clone)]
pub struct Resolved<'a> {
    pub path: VirtualPath,
    pub mount: &'a Mount,
}

/// Protocol-keyed mounts plus the deployment's default protocol.
#[derive(Debug)]
pub struct MountTable {
    mounts: BTreeMap<String, Mount>,
    default_protocol: String,
}

impl MountTable {
    pub fn new(default_protocol: impl Into<String>) -> Self {
        Self {
            mounts: BTreeMap::new(),
            default_protocol: default_protocol.into(),
        }
    }

    /// Add a mount. Returns the previous mount for the protocol, if any;
    /// the loader treats that as a configuration error.
    pub fn insert(&mut self, mount: Mount) -> Option<Mount> {
        self.mounts.insert(mount.protocol.clone(), mount)
    }

    pub fn default_protocol(&self) -> &str {
        &self.default_protocol
    }

    pub fn get(&self, protocol: &str) -> Option<&Mount> {
        self.mounts.get(protocol)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mount> {
        self.mounts.values()
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    /// Resolve a path string to its mount.
    ///
    /// Paths without `protocol://` get the default protocol. Fails with
    /// `UnknownProtocol` when no mount owns the scheme and with
    /// `MountDisabled` when the mount is switched off.
    pub fn resolve(&self, input: &str) -> CoreResult<Resolved<'_>> {
        let path = VirtualPath::parse(input, &self.default_protocol);
        let mount = self
            .mounts
            .get(&path.protocol)
            .ok_or_else(|| CoreError::UnknownProtocol(path.protocol.clone()))?;
        if !mount.enabled {
            return Err(CoreError::MountDisabled(path.protocol));
        }
        Ok(Resolved { path, mount })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::backends::MemoryTransport;

    fn table() -> MountTable {
        let mut table = MountTable::new("home");
        table.insert(Mount::new("home", Arc::new(MemoryTransport::new("home"))));
        table.insert(
            Mount::new("off", Arc::new(MemoryTransport::new("off"))).enabled(false),
        );
        table
    }

    #[test]
    fn test_resolve_with_protocol() {
        let table = table();
        let resolved = table.resolve("home:///a/b.txt").unwrap();
        assert_eq!(resolved.path.protocol, "home");
        assert_eq!(resolved.path.path, "/a/b.txt");
        assert_eq!(resolved.mount.protocol, "home");
    }

    #[test]
    fn test_resolve_uses_default_protocol() {
        let table = table();
        let resolved = table.resolve("/a/b.txt").unwrap();
        assert_eq!(resolved.path.protocol, "home");
        assert_eq!(resolved.path.path, "/a/b.txt");
    }

    #[test]
    fn test_default_protocol_is_configurable() {
        let mut table = MountTable::new("tmp");
        table.insert(Mount::new("tmp", Arc::new(MemoryTransport::new("tmp"))));
        assert_eq!(table.resolve("/x").unwrap().mount.protocol, "tmp");
    }

    #[test]
    fn test_unknown_protocol() {
        let table = table();
        let err = table.resolve("ftp:///x").unwrap_err();
        assert!(matches!(err, CoreError::UnknownProtocol(p) if p == "ftp"));
    }

    #[test]
    fn test_disabled_mount() {
        let table = table();
        let err = table.resolve("off:///x").unwrap_err();
        assert!(matches!(err, CoreError::MountDisabled(p) if p == "off"));
    }

    #[test]
    fn test_insert_reports_duplicate() {
        let mut table = table();
        let previous = table.insert(Mount::new("home", Arc::new(MemoryTransport::new("home"))));
        assert!(previous.is_some());
        assert_eq!(table.len(), 2);
    }
}
