//! Local filesystem transport.
//!
//! Provides access to real directories, with path security to prevent
//! escaping the root directory.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::path::VirtualPath;
use crate::vfs::transport::{OpContext, Transport};
use crate::vfs::types::{FileInfo, UploadFile, millis};

/// Placeholder replaced by the caller's username in a root template.
pub const USERNAME_PLACEHOLDER: &str = "{username}";

/// Local filesystem transport.
///
/// All operations are relative to the root. The root may contain
/// `{username}`, in which case every caller gets their own directory,
/// created on first use. For example, with root `/srv/home/{username}`,
/// `read("/notes.txt")` by `amy` reads `/srv/home/amy/notes.txt`.
///
/// Path security is enforced: attempts to escape via `..` or symlinks are
/// blocked.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    protocols: Vec<String>,
    root: String,
}

impl LocalTransport {
    /// Module name used in configuration.
    pub const NAME: &'static str = "local";

    /// Create a transport serving `protocol` from `root`.
    pub fn new(protocol: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            protocols: vec![protocol.into()],
            root: root.into(),
        }
    }

    /// The unexpanded root template.
    pub fn root_template(&self) -> &str {
        &self.root
    }

    fn is_per_user(&self) -> bool {
        self.root.contains(USERNAME_PLACEHOLDER)
    }

    /// Expand the root for the calling user.
    async fn root_for(&self, cx: &OpContext) -> VfsResult<PathBuf> {
        if !self.is_per_user() {
            return Ok(PathBuf::from(&self.root));
        }

        let username = cx
            .username
            .as_deref()
            .ok_or_else(|| VfsError::permission_denied("per-user mount requires a user"))?;
        if username.is_empty() || username.contains(['/', '\\']) || username.starts_with('.') {
            return Err(VfsError::invalid_path(format!("username {:?}", username)));
        }

        let root = PathBuf::from(self.root.replace(USERNAME_PLACEHOLDER, username));
        fs::create_dir_all(&root).await?;
        Ok(root)
    }

    /// Lexically normalize a relative path, rejecting `..` past the root.
    fn normalize(path: &str) -> VfsResult<PathBuf> {
        let mut result = PathBuf::new();
        for component in path.split('/') {
            match component {
                "" | "." => {}
                ".." => {
                    if !result.pop() {
                        return Err(VfsError::path_escapes_root(path));
                    }
                }
                name => result.push(name),
            }
        }
        Ok(result)
    }

    /// Resolve a relative path to an absolute path within the root.
    ///
    /// Returns an error if the path escapes the root, including through
    /// symlinks that point outside of it.
    async fn resolve(&self, cx: &OpContext, path: &str) -> VfsResult<(PathBuf, PathBuf)> {
        let root = self.root_for(cx).await?;
        let relative = Self::normalize(path)?;
        let full = root.join(&relative);

        let canonical_root = fs::canonicalize(&root).await.unwrap_or_else(|_| root.clone());
        // For new files, check the nearest existing ancestor instead.
        let mut probe = full.as_path();
        loop {
            if let Ok(canonical) = fs::canonicalize(probe).await {
                if !canonical.starts_with(&canonical_root) {
                    return Err(VfsError::path_escapes_root(format!(
                        "{} is not under {}",
                        canonical.display(),
                        canonical_root.display()
                    )));
                }
                break;
            }
            match probe.parent() {
                Some(parent) if parent.starts_with(&root) => probe = parent,
                _ => break,
            }
        }

        Ok((full, relative))
    }

    fn vpath(&self, relative: &Path) -> String {
        let rel = relative.to_string_lossy();
        VirtualPath::new(self.protocols[0].clone(), format!("/{}", rel)).to_string()
    }

    fn to_info(&self, relative: &Path, meta: &std::fs::Metadata) -> FileInfo {
        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mtime = meta.modified().map(millis).unwrap_or(0);
        if meta.is_dir() {
            FileInfo::dir(name, self.vpath(relative), mtime)
        } else {
            FileInfo::file(name, self.vpath(relative), meta.len(), mtime)
        }
    }
}

/// Recursively copy `from` to `to`, checking for cancellation per entry.
///
/// Symlinks are skipped; their targets may lie outside the root.
fn copy_tree<'a>(cx: &'a OpContext, from: PathBuf, to: PathBuf) -> BoxFuture<'a, VfsResult<()>> {
    Box::pin(async move {
        cx.check_cancelled()?;
        let meta = fs::symlink_metadata(&from).await?;
        if meta.file_type().is_symlink() {
            debug!(path = %from.display(), "skipping symlink");
            return Ok(());
        }
        if !meta.is_dir() {
            fs::copy(&from, &to).await?;
            return Ok(());
        }

        fs::create_dir(&to).await?;
        let mut dir = fs::read_dir(&from).await?;
        while let Some(entry) = dir.next_entry().await? {
            copy_tree(cx, entry.path(), to.join(entry.file_name())).await?;
        }
        Ok(())
    })
}

#[async_trait]
impl Transport for LocalTransport {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn protocols(&self) -> &[String] {
        &self.protocols
    }

    async fn exists(&self, cx: &OpContext, path: &str) -> VfsResult<bool> {
        let (full, _) = self.resolve(cx, path).await?;
        Ok(fs::try_exists(&full).await?)
    }

    async fn read(&self, cx: &OpContext, path: &str) -> VfsResult<Vec<u8>> {
        let (full, _) = self.resolve(cx, path).await?;
        if fs::metadata(&full).await?.is_dir() {
            return Err(VfsError::is_a_directory(path));
        }
        Ok(fs::read(&full).await?)
    }

    async fn scandir(&self, cx: &OpContext, path: &str) -> VfsResult<Vec<FileInfo>> {
        let (full, relative) = self.resolve(cx, path).await?;
        if !fs::metadata(&full).await?.is_dir() {
            return Err(VfsError::not_a_directory(path));
        }

        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&full).await?;
        while let Some(entry) = dir.next_entry().await? {
            let meta = entry.metadata().await?;
            entries.push(self.to_info(&relative.join(entry.file_name()), &meta));
        }

        entries.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(entries)
    }

    async fn fileinfo(&self, cx: &OpContext, path: &str) -> VfsResult<FileInfo> {
        let (full, relative) = self.resolve(cx, path).await?;
        let meta = fs::metadata(&full).await?;
        Ok(self.to_info(&relative, &meta))
    }

    async fn write(&self, cx: &OpContext, path: &str, data: &[u8]) -> VfsResult<()> {
        cx.check_cancelled()?;
        let (full, _) = self.resolve(cx, path).await?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full, data).await?;
        Ok(())
    }

    async fn mkdir(&self, cx: &OpContext, path: &str) -> VfsResult<()> {
        let (full, _) = self.resolve(cx, path).await?;
        fs::create_dir_all(&full).await?;
        Ok(())
    }

    async fn rename(&self, cx: &OpContext, from: &str, to: &str) -> VfsResult<()> {
        let (from_path, _) = self.resolve(cx, from).await?;
        let (to_path, _) = self.resolve(cx, to).await?;
        if fs::try_exists(&to_path).await? {
            return Err(VfsError::already_exists(to));
        }

        // Ensure parent of destination exists
        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&from_path, &to_path).await?;
        Ok(())
    }

    async fn copy(&self, cx: &OpContext, from: &str, to: &str) -> VfsResult<()> {
        let (from_path, _) = self.resolve(cx, from).await?;
        let (to_path, _) = self.resolve(cx, to).await?;
        if fs::try_exists(&to_path).await? {
            return Err(VfsError::already_exists(to));
        }
        if to_path.starts_with(&from_path) {
            return Err(VfsError::invalid_path(format!("{} is inside {}", to, from)));
        }
        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        copy_tree(cx, from_path, to_path).await
    }

    async fn delete(&self, cx: &OpContext, path: &str) -> VfsResult<()> {
        let (full, relative) = self.resolve(cx, path).await?;
        if relative.as_os_str().is_empty() {
            return Err(VfsError::permission_denied("cannot remove root"));
        }
        if fs::symlink_metadata(&full).await?.is_dir() {
            fs::remove_dir_all(&full).await?;
        } else {
            fs::remove_file(&full).await?;
        }
        Ok(())
    }

    async fn upload(&self, cx: &OpContext, dir: &str, file: UploadFile) -> VfsResult<FileInfo> {
        cx.check_cancelled()?;
        if file.filename.is_empty() || file.filename.contains(['/', '\\']) || file.filename == ".." {
            return Err(VfsError::invalid_path(file.filename));
        }
        let (dir_path, dir_relative) = self.resolve(cx, dir).await?;
        if !fs::metadata(&dir_path).await?.is_dir() {
            return Err(VfsError::not_a_directory(dir));
        }

        let target = dir_path.join(&file.filename);
        fs::write(&target, &file.data).await?;
        let meta = fs::metadata(&target).await?;
        Ok(self.to_info(&dir_relative.join(&file.filename), &meta))
    }

    #[cfg(unix)]
    async fn free_space(&self, cx: &OpContext) -> VfsResult<Option<u64>> {
        let root = self.root_for(cx).await?;
        let stat = rustix::fs::statvfs(&root).map_err(std::io::Error::from)?;
        Ok(Some(stat.f_bavail.saturating_mul(stat.f_frsize)))
    }
}
