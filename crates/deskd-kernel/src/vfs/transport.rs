//! The transport trait.
//!
//! A transport is a storage backend for one or more protocols. All
//! operations take paths relative to the transport's root (the part after
//! `protocol://`) plus an [`OpContext`] naming the caller and carrying the
//! request's cancellation token.

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use super::path::join;
use super::types::{FileInfo, UploadFile};
use super::{VfsError, VfsResult};

/// Per-call context handed to every transport operation.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    /// Authenticated caller, used by transports with per-user roots.
    pub username: Option<String>,
    /// Cancelled when the originating request is abandoned.
    pub cancel: CancellationToken,
}

impl OpContext {
    pub fn new(username: Option<String>, cancel: CancellationToken) -> Self {
        Self { username, cancel }
    }

    /// Context for a named user with a token nobody cancels.
    pub fn for_user(username: impl Into<String>) -> Self {
        Self::new(Some(username.into()), CancellationToken::new())
    }

    /// Fail with [`VfsError::Cancelled`] once the token fires.
    pub fn check_cancelled(&self) -> VfsResult<()> {
        if self.cancel.is_cancelled() {
            Err(VfsError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Storage backend serving one or more protocols.
///
/// Errors are reported as [`VfsError`] and passed through the registry
/// unchanged. Implementations must be safe to call concurrently.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Module name this transport was registered under (e.g. `"local"`).
    fn name(&self) -> &str;

    /// Protocols this instance serves.
    fn protocols(&self) -> &[String];

    // ========================================================================
    // Reading
    // ========================================================================

    /// Check whether a path exists.
    async fn exists(&self, cx: &OpContext, path: &str) -> VfsResult<bool>;

    /// Read a whole file.
    async fn read(&self, cx: &OpContext, path: &str) -> VfsResult<Vec<u8>>;

    /// List a directory, sorted by name.
    async fn scandir(&self, cx: &OpContext, path: &str) -> VfsResult<Vec<FileInfo>>;

    /// Metadata for a single entry.
    async fn fileinfo(&self, cx: &OpContext, path: &str) -> VfsResult<FileInfo>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Create or replace a file. Parent directories are created as needed.
    async fn write(&self, cx: &OpContext, path: &str, data: &[u8]) -> VfsResult<()>;

    /// Create a directory (and its parents).
    async fn mkdir(&self, cx: &OpContext, path: &str) -> VfsResult<()>;

    /// The `move` operation: rename within this transport.
    async fn rename(&self, cx: &OpContext, from: &str, to: &str) -> VfsResult<()>;

    /// Copy a file or a directory tree within this transport.
    ///
    /// Directory copies check `cx.cancel` between entries.
    async fn copy(&self, cx: &OpContext, from: &str, to: &str) -> VfsResult<()>;

    /// Remove a file or a directory tree.
    async fn delete(&self, cx: &OpContext, path: &str) -> VfsResult<()>;

    /// Store an uploaded file inside directory `dir`.
    async fn upload(&self, cx: &OpContext, dir: &str, file: UploadFile) -> VfsResult<FileInfo>;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Recursive, case-insensitive search for entries whose name contains `query`.
    async fn find(&self, cx: &OpContext, path: &str, query: &str) -> VfsResult<Vec<FileInfo>> {
        let mut found = Vec::new();
        walk(self, cx, path.to_string(), query.to_lowercase(), &mut found).await?;
        Ok(found)
    }

    /// Free bytes on the backing store, if the transport can tell.
    async fn free_space(&self, cx: &OpContext) -> VfsResult<Option<u64>> {
        let _ = cx;
        Ok(None)
    }
}

fn walk<'a, T: Transport + ?Sized>(
    transport: &'a T,
    cx: &'a OpContext,
    dir: String,
    needle: String,
    found: &'a mut Vec<FileInfo>,
) -> BoxFuture<'a, VfsResult<()>> {
    Box::pin(async move {
        cx.check_cancelled()?;
        for entry in transport.scandir(cx, &dir).await? {
            let child = join(&dir, &entry.filename);
            let is_dir = entry.is_dir();
            if entry.filename.to_lowercase().contains(&needle) {
                found.push(entry);
            }
            if is_dir {
                walk(transport, cx, child, needle.clone(), found).await?;
            }
        }
        Ok(())
    })
}
