//! In-memory transport.
//!
//! Used for `tmp://` style scratch mounts and testing. All data is
//! ephemeral and shared by every user of the mount.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use deskd_types::now_millis;

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::path::VirtualPath;
use crate::vfs::transport::{OpContext, Transport};
use crate::vfs::types::{FileInfo, UploadFile};

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, mtime: u64 },
    Dir { mtime: u64 },
}

impl Entry {
    fn dir() -> Self {
        Entry::Dir { mtime: now_millis() }
    }
}

/// In-memory transport.
///
/// Keys are normalized relative paths without a leading slash; the root is
/// the empty string and always exists. A `BTreeMap` keeps scans ordered.
#[derive(Debug)]
pub struct MemoryTransport {
    protocols: Vec<String>,
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryTransport {
    /// Module name used in configuration.
    pub const NAME: &'static str = "memory";

    /// Create an empty filesystem serving `protocol`.
    pub fn new(protocol: impl Into<String>) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(String::new(), Entry::dir());
        Self {
            protocols: vec![protocol.into()],
            entries: RwLock::new(entries),
        }
    }

    /// Normalize a path: drop leading `/`, resolve `.` and `..`.
    fn normalize(path: &str) -> VfsResult<String> {
        let mut parts: Vec<&str> = Vec::new();
        for component in path.split('/') {
            match component {
                "" | "." => {}
                ".." => {
                    if parts.pop().is_none() {
                        return Err(VfsError::path_escapes_root(path));
                    }
                }
                name => parts.push(name),
            }
        }
        Ok(parts.join("/"))
    }

    fn parent(key: &str) -> Option<&str> {
        if key.is_empty() {
            None
        } else {
            Some(key.rsplit_once('/').map(|(p, _)| p).unwrap_or(""))
        }
    }

    fn filename(key: &str) -> &str {
        key.rsplit('/').next().unwrap_or("")
    }

    fn is_descendant(key: &str, ancestor: &str) -> bool {
        ancestor.is_empty() || key.strip_prefix(ancestor).is_some_and(|rest| rest.starts_with('/'))
    }

    fn vpath(&self, key: &str) -> String {
        VirtualPath::new(self.protocols[0].clone(), format!("/{}", key)).to_string()
    }

    fn info(&self, key: &str, entry: &Entry) -> FileInfo {
        match entry {
            Entry::File { data, mtime } => {
                FileInfo::file(Self::filename(key), self.vpath(key), data.len() as u64, *mtime)
            }
            Entry::Dir { mtime } => FileInfo::dir(Self::filename(key), self.vpath(key), *mtime),
        }
    }

    /// Ensure all parent directories of `key` exist.
    fn ensure_parents(entries: &mut BTreeMap<String, Entry>, key: &str) -> VfsResult<()> {
        let mut current = String::new();
        let Some(parent) = Self::parent(key) else {
            return Ok(());
        };
        for component in parent.split('/').filter(|c| !c.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(component);
            match entries.get(&current) {
                Some(Entry::Dir { .. }) => {}
                Some(Entry::File { .. }) => return Err(VfsError::not_a_directory(current)),
                None => {
                    entries.insert(current.clone(), Entry::dir());
                }
            }
        }
        Ok(())
    }

    /// Keys of `key` and everything below it, shallowest first.
    fn subtree(entries: &BTreeMap<String, Entry>, key: &str) -> Vec<String> {
        entries
            .keys()
            .filter(|k| k.as_str() == key || Self::is_descendant(k, key))
            .cloned()
            .collect()
    }

    fn rebase(key: &str, from: &str, to: &str) -> String {
        let rest = &key[from.len()..];
        format!("{}{}", to, rest)
    }

    fn check_transfer(entries: &BTreeMap<String, Entry>, from: &str, to: &str) -> VfsResult<()> {
        if from.is_empty() {
            return Err(VfsError::permission_denied("cannot move or copy the root"));
        }
        if !entries.contains_key(from) {
            return Err(VfsError::not_found(from));
        }
        if entries.contains_key(to) {
            return Err(VfsError::already_exists(to));
        }
        if Self::is_descendant(to, from) {
            return Err(VfsError::invalid_path(format!("{} is inside {}", to, from)));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn protocols(&self) -> &[String] {
        &self.protocols
    }

    async fn exists(&self, _cx: &OpContext, path: &str) -> VfsResult<bool> {
        let key = Self::normalize(path)?;
        Ok(self.entries.read().contains_key(&key))
    }

    async fn read(&self, _cx: &OpContext, path: &str) -> VfsResult<Vec<u8>> {
        let key = Self::normalize(path)?;
        match self.entries.read().get(&key) {
            Some(Entry::File { data, .. }) => Ok(data.clone()),
            Some(Entry::Dir { .. }) => Err(VfsError::is_a_directory(path)),
            None => Err(VfsError::not_found(path)),
        }
    }

    async fn scandir(&self, _cx: &OpContext, path: &str) -> VfsResult<Vec<FileInfo>> {
        let key = Self::normalize(path)?;
        let entries = self.entries.read();
        match entries.get(&key) {
            Some(Entry::Dir { .. }) => {}
            Some(Entry::File { .. }) => return Err(VfsError::not_a_directory(path)),
            None => return Err(VfsError::not_found(path)),
        }

        Ok(entries
            .iter()
            .filter(|(k, _)| !k.is_empty() && Self::parent(k) == Some(key.as_str()))
            .map(|(k, e)| self.info(k, e))
            .collect())
    }

    async fn fileinfo(&self, _cx: &OpContext, path: &str) -> VfsResult<FileInfo> {
        let key = Self::normalize(path)?;
        let entries = self.entries.read();
        entries
            .get(&key)
            .map(|e| self.info(&key, e))
            .ok_or_else(|| VfsError::not_found(path))
    }

    async fn write(&self, _cx: &OpContext, path: &str, data: &[u8]) -> VfsResult<()> {
        let key = Self::normalize(path)?;
        let mut entries = self.entries.write();
        if let Some(Entry::Dir { .. }) = entries.get(&key) {
            return Err(VfsError::is_a_directory(path));
        }
        Self::ensure_parents(&mut entries, &key)?;
        entries.insert(
            key,
            Entry::File {
                data: data.to_vec(),
                mtime: now_millis(),
            },
        );
        Ok(())
    }

    async fn mkdir(&self, _cx: &OpContext, path: &str) -> VfsResult<()> {
        let key = Self::normalize(path)?;
        let mut entries = self.entries.write();
        match entries.get(&key) {
            Some(Entry::Dir { .. }) => return Ok(()),
            Some(Entry::File { .. }) => return Err(VfsError::already_exists(path)),
            None => {}
        }
        Self::ensure_parents(&mut entries, &key)?;
        entries.insert(key, Entry::dir());
        Ok(())
    }

    async fn rename(&self, _cx: &OpContext, from: &str, to: &str) -> VfsResult<()> {
        let from = Self::normalize(from)?;
        let to = Self::normalize(to)?;
        let mut entries = self.entries.write();
        Self::check_transfer(&entries, &from, &to)?;
        Self::ensure_parents(&mut entries, &to)?;

        for key in Self::subtree(&entries, &from) {
            if let Some(entry) = entries.remove(&key) {
                entries.insert(Self::rebase(&key, &from, &to), entry);
            }
        }
        Ok(())
    }

    async fn copy(&self, cx: &OpContext, from: &str, to: &str) -> VfsResult<()> {
        let from = Self::normalize(from)?;
        let to = Self::normalize(to)?;
        let mut entries = self.entries.write();
        Self::check_transfer(&entries, &from, &to)?;

        // Snapshot first so a cancelled copy leaves the target untouched.
        let mut copied = Vec::new();
        for key in Self::subtree(&entries, &from) {
            cx.check_cancelled()?;
            if let Some(entry) = entries.get(&key) {
                copied.push((Self::rebase(&key, &from, &to), entry.clone()));
            }
        }
        Self::ensure_parents(&mut entries, &to)?;
        entries.extend(copied);
        Ok(())
    }

    async fn delete(&self, _cx: &OpContext, path: &str) -> VfsResult<()> {
        let key = Self::normalize(path)?;
        if key.is_empty() {
            return Err(VfsError::permission_denied("cannot remove root"));
        }
        let mut entries = self.entries.write();
        if !entries.contains_key(&key) {
            return Err(VfsError::not_found(path));
        }
        for k in Self::subtree(&entries, &key) {
            entries.remove(&k);
        }
        Ok(())
    }

    async fn upload(&self, cx: &OpContext, dir: &str, file: UploadFile) -> VfsResult<FileInfo> {
        cx.check_cancelled()?;
        let dir_key = Self::normalize(dir)?;
        if file.filename.contains('/') || file.filename.is_empty() {
            return Err(VfsError::invalid_path(file.filename));
        }
        let key = if dir_key.is_empty() {
            file.filename.clone()
        } else {
            format!("{}/{}", dir_key, file.filename)
        };

        let mut entries = self.entries.write();
        match entries.get(&dir_key) {
            Some(Entry::Dir { .. }) => {}
            Some(Entry::File { .. }) => return Err(VfsError::not_a_directory(dir)),
            None => return Err(VfsError::not_found(dir)),
        }
        let entry = Entry::File {
            data: file.data,
            mtime: now_millis(),
        };
        let info = self.info(&key, &entry);
        entries.insert(key, entry);
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cx() -> OpContext {
        OpContext::for_user("demo")
    }

    #[tokio::test]
    async fn test_write_read() {
        let fs = MemoryTransport::new("tmp");
        fs.write(&cx(), "/a/b.txt", b"hello").await.unwrap();
        assert_eq!(fs.read(&cx(), "/a/b.txt").await.unwrap(), b"hello");
        // Parent was created implicitly
        assert!(fs.fileinfo(&cx(), "/a").await.unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_exists_is_stable() {
        let fs = MemoryTransport::new("tmp");
        fs.mkdir(&cx(), "/.t").await.unwrap();
        assert!(fs.exists(&cx(), "/.t").await.unwrap());
        assert!(fs.exists(&cx(), "/.t").await.unwrap());
        fs.delete(&cx(), "/.t").await.unwrap();
        assert!(!fs.exists(&cx(), "/.t").await.unwrap());
    }

    #[tokio::test]
    async fn test_scandir_sorted_direct_children() {
        let fs = MemoryTransport::new("tmp");
        fs.write(&cx(), "/b.txt", b"").await.unwrap();
        fs.write(&cx(), "/a.txt", b"").await.unwrap();
        fs.write(&cx(), "/dir/nested.txt", b"").await.unwrap();

        let names: Vec<_> = fs
            .scandir(&cx(), "/")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.filename)
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "dir"]);

        let listing = fs.scandir(&cx(), "/dir").await.unwrap();
        assert_eq!(listing[0].path, "tmp:///dir/nested.txt");
    }

    #[tokio::test]
    async fn test_rename_moves_subtree() {
        let fs = MemoryTransport::new("tmp");
        fs.write(&cx(), "/src/a.txt", b"a").await.unwrap();
        fs.write(&cx(), "/src/deep/b.txt", b"b").await.unwrap();

        fs.rename(&cx(), "/src", "/dst").await.unwrap();
        assert!(!fs.exists(&cx(), "/src").await.unwrap());
        assert_eq!(fs.read(&cx(), "/dst/deep/b.txt").await.unwrap(), b"b");
    }

    #[tokio::test]
    async fn test_rename_into_itself_rejected() {
        let fs = MemoryTransport::new("tmp");
        fs.mkdir(&cx(), "/src").await.unwrap();
        let err = fs.rename(&cx(), "/src", "/src/inner").await.unwrap_err();
        assert!(matches!(err, VfsError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_copy_keeps_source() {
        let fs = MemoryTransport::new("tmp");
        fs.write(&cx(), "/src/a.txt", b"a").await.unwrap();
        fs.copy(&cx(), "/src", "/copy").await.unwrap();
        assert_eq!(fs.read(&cx(), "/src/a.txt").await.unwrap(), b"a");
        assert_eq!(fs.read(&cx(), "/copy/a.txt").await.unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_cancelled_copy_leaves_no_target() {
        let fs = MemoryTransport::new("tmp");
        fs.write(&cx(), "/src/a.txt", b"a").await.unwrap();
        let cx = cx();
        cx.cancel.cancel();
        let err = fs.copy(&cx, "/src", "/copy").await.unwrap_err();
        assert!(matches!(err, VfsError::Cancelled));
        assert!(!fs.exists(&cx, "/copy").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_root_rejected() {
        let fs = MemoryTransport::new("tmp");
        assert!(matches!(
            fs.delete(&cx(), "/").await,
            Err(VfsError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_escape_rejected() {
        let fs = MemoryTransport::new("tmp");
        assert!(matches!(
            fs.read(&cx(), "/../etc/passwd").await,
            Err(VfsError::PathEscapesRoot(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_into_directory() {
        let fs = MemoryTransport::new("tmp");
        fs.mkdir(&cx(), "/uploads").await.unwrap();
        let info = fs
            .upload(
                &cx(),
                "/uploads",
                UploadFile {
                    filename: "pic.png".into(),
                    data: vec![1, 2, 3],
                },
            )
            .await
            .unwrap();
        assert_eq!(info.path, "tmp:///uploads/pic.png");
        assert_eq!(info.mime.as_deref(), Some("image/png"));
        assert_eq!(info.size, 3);
    }

    #[tokio::test]
    async fn test_find_is_recursive_and_case_insensitive() {
        let fs = MemoryTransport::new("tmp");
        fs.write(&cx(), "/Notes.txt", b"").await.unwrap();
        fs.write(&cx(), "/deep/er/more-notes.md", b"").await.unwrap();
        fs.write(&cx(), "/other.txt", b"").await.unwrap();

        let found = fs.find(&cx(), "/", "NOTES").await.unwrap();
        let mut names: Vec<_> = found.into_iter().map(|f| f.filename).collect();
        names.sort();
        assert_eq!(names, vec!["Notes.txt", "more-notes.md"]);
    }
}
