//! Transport registry.
//!
//! Holds the transports built at boot in registration order and routes
//! operations on resolved virtual paths to the transport that owns the
//! protocol. Results and errors come back untouched; the registry never
//! retries.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::path::VirtualPath;
use super::transport::{OpContext, Transport};
use super::types::{FileInfo, UploadFile};
use super::VfsError;
use crate::error::{CoreError, CoreResult};
use crate::loader::LoadError;

/// Ordered transports plus a protocol index.
#[derive(Default)]
pub struct TransportRegistry {
    transports: Vec<Arc<dyn Transport>>,
    by_protocol: HashMap<String, usize>,
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("transports", &self.transports.len())
            .field("protocols", &self.by_protocol.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport for every protocol it declares.
    ///
    /// A protocol can only be owned once.
    pub fn register(&mut self, transport: Arc<dyn Transport>) -> Result<(), LoadError> {
        for protocol in transport.protocols() {
            if let Some(&index) = self.by_protocol.get(protocol) {
                return Err(LoadError::DuplicateProtocol {
                    protocol: protocol.clone(),
                    owner: self.transports[index].name().to_string(),
                });
            }
        }

        let index = self.transports.len();
        for protocol in transport.protocols() {
            self.by_protocol.insert(protocol.clone(), index);
        }
        debug!(
            transport = transport.name(),
            protocols = ?transport.protocols(),
            "registered transport"
        );
        self.transports.push(transport);
        Ok(())
    }

    /// Transports in registration order.
    pub fn transports(&self) -> &[Arc<dyn Transport>] {
        &self.transports
    }

    /// The transport owning `protocol`.
    pub fn get(&self, protocol: &str) -> CoreResult<&Arc<dyn Transport>> {
        self.by_protocol
            .get(protocol)
            .map(|&index| &self.transports[index])
            .ok_or_else(|| CoreError::UnknownProtocol(protocol.to_string()))
    }

    pub async fn exists(&self, cx: &OpContext, path: &VirtualPath) -> CoreResult<bool> {
        Ok(self.get(&path.protocol)?.exists(cx, &path.path).await?)
    }

    pub async fn read(&self, cx: &OpContext, path: &VirtualPath) -> CoreResult<Vec<u8>> {
        Ok(self.get(&path.protocol)?.read(cx, &path.path).await?)
    }

    pub async fn write(&self, cx: &OpContext, path: &VirtualPath, data: &[u8]) -> CoreResult<()> {
        Ok(self.get(&path.protocol)?.write(cx, &path.path, data).await?)
    }

    pub async fn mkdir(&self, cx: &OpContext, path: &VirtualPath) -> CoreResult<()> {
        Ok(self.get(&path.protocol)?.mkdir(cx, &path.path).await?)
    }

    pub async fn scandir(&self, cx: &OpContext, path: &VirtualPath) -> CoreResult<Vec<FileInfo>> {
        Ok(self.get(&path.protocol)?.scandir(cx, &path.path).await?)
    }

    pub async fn fileinfo(&self, cx: &OpContext, path: &VirtualPath) -> CoreResult<FileInfo> {
        Ok(self.get(&path.protocol)?.fileinfo(cx, &path.path).await?)
    }

    pub async fn delete(&self, cx: &OpContext, path: &VirtualPath) -> CoreResult<()> {
        Ok(self.get(&path.protocol)?.delete(cx, &path.path).await?)
    }

    pub async fn upload(
        &self,
        cx: &OpContext,
        dir: &VirtualPath,
        file: UploadFile,
    ) -> CoreResult<FileInfo> {
        Ok(self.get(&dir.protocol)?.upload(cx, &dir.path, file).await?)
    }

    pub async fn find(
        &self,
        cx: &OpContext,
        path: &VirtualPath,
        query: &str,
    ) -> CoreResult<Vec<FileInfo>> {
        Ok(self.get(&path.protocol)?.find(cx, &path.path, query).await?)
    }

    pub async fn free_space(&self, cx: &OpContext, path: &VirtualPath) -> CoreResult<Option<u64>> {
        Ok(self.get(&path.protocol)?.free_space(cx).await?)
    }

    /// Copy within one transport, or file-by-file across two.
    pub async fn copy(&self, cx: &OpContext, from: &VirtualPath, to: &VirtualPath) -> CoreResult<()> {
        let source = self.get(&from.protocol)?;
        let target = self.get(&to.protocol)?;
        if Arc::ptr_eq(source, target) {
            return Ok(source.copy(cx, &from.path, &to.path).await?);
        }
        self.transfer(cx, source, target, from, to).await
    }

    /// The `move` operation.
    pub async fn rename(
        &self,
        cx: &OpContext,
        from: &VirtualPath,
        to: &VirtualPath,
    ) -> CoreResult<()> {
        let source = self.get(&from.protocol)?;
        let target = self.get(&to.protocol)?;
        if Arc::ptr_eq(source, target) {
            return Ok(source.rename(cx, &from.path, &to.path).await?);
        }
        self.transfer(cx, source, target, from, to).await?;
        Ok(source.delete(cx, &from.path).await?)
    }

    async fn transfer(
        &self,
        cx: &OpContext,
        source: &Arc<dyn Transport>,
        target: &Arc<dyn Transport>,
        from: &VirtualPath,
        to: &VirtualPath,
    ) -> CoreResult<()> {
        if source.fileinfo(cx, &from.path).await?.is_dir() {
            return Err(VfsError::CrossTransport(format!("{} -> {}", from, to)).into());
        }
        if target.exists(cx, &to.path).await? {
            return Err(VfsError::already_exists(to.to_string()).into());
        }

        debug!(from = %from, to = %to, "cross-transport file transfer");
        let data = source.read(cx, &from.path).await?;
        cx.check_cancelled()?;
        target.write(cx, &to.path, &data).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::backends::MemoryTransport;

    fn registry() -> TransportRegistry {
        let mut registry = TransportRegistry::new();
        registry.register(Arc::new(MemoryTransport::new("home"))).unwrap();
        registry.register(Arc::new(MemoryTransport::new("tmp"))).unwrap();
        registry
    }

    fn vp(s: &str) -> VirtualPath {
        VirtualPath::parse(s, "home")
    }

    #[test]
    fn test_duplicate_protocol_rejected() {
        let mut registry = registry();
        let err = registry
            .register(Arc::new(MemoryTransport::new("tmp")))
            .unwrap_err();
        assert!(matches!(err, LoadError::DuplicateProtocol { protocol, .. } if protocol == "tmp"));
        assert_eq!(registry.transports().len(), 2);
    }

    #[tokio::test]
    async fn test_routes_by_protocol() {
        let registry = registry();
        let cx = OpContext::for_user("demo");
        registry.write(&cx, &vp("tmp:///a.txt"), b"x").await.unwrap();

        assert!(registry.exists(&cx, &vp("tmp:///a.txt")).await.unwrap());
        assert!(!registry.exists(&cx, &vp("home:///a.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_protocol() {
        let registry = registry();
        let cx = OpContext::default();
        let err = registry.read(&cx, &vp("ftp:///a")).await.unwrap_err();
        assert!(matches!(err, CoreError::UnknownProtocol(_)));
    }

    #[tokio::test]
    async fn test_errors_pass_through_unchanged() {
        let registry = registry();
        let cx = OpContext::default();
        let err = registry.read(&cx, &vp("home:///missing")).await.unwrap_err();
        assert!(matches!(err, CoreError::Vfs(VfsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_cross_transport_move_file() {
        let registry = registry();
        let cx = OpContext::default();
        registry.write(&cx, &vp("home:///a.txt"), b"data").await.unwrap();

        registry
            .rename(&cx, &vp("home:///a.txt"), &vp("tmp:///b.txt"))
            .await
            .unwrap();
        assert_eq!(registry.read(&cx, &vp("tmp:///b.txt")).await.unwrap(), b"data");
        assert!(!registry.exists(&cx, &vp("home:///a.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_cross_transport_directory_refused() {
        let registry = registry();
        let cx = OpContext::default();
        registry.mkdir(&cx, &vp("home:///dir")).await.unwrap();

        let err = registry
            .copy(&cx, &vp("home:///dir"), &vp("tmp:///dir"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Vfs(VfsError::CrossTransport(_))));
    }
}
