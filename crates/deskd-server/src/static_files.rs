//! Static assets from the distribution directory.

use std::path::{Component, Path, PathBuf};

use deskd_kernel::vfs::mime_for;
use tokio::fs;
use tracing::debug;

use crate::constants::INDEX_FILE;

/// A file read from the distribution directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticFile {
    pub mime: &'static str,
    pub data: Vec<u8>,
}

/// Map a request path onto `dist_dir`.
///
/// `/` and directory paths map to `index.html`. Returns `None` for paths
/// that try to leave `dist_dir`.
pub fn resolve(dist_dir: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = request_path.trim_start_matches('/');
    let mut full = dist_dir.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => full.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if relative.is_empty() || relative.ends_with('/') {
        full.push(INDEX_FILE);
    }
    Some(full)
}

/// Read a static file. `None` when it does not exist or is not a file.
pub async fn load(dist_dir: &Path, request_path: &str) -> Option<StaticFile> {
    let path = resolve(dist_dir, request_path)?;
    let meta = fs::metadata(&path).await.ok()?;
    if !meta.is_file() {
        debug!(path = %path.display(), "not a file");
        return None;
    }

    let data = fs::read(&path).await.ok()?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Some(StaticFile {
        mime: mime_for(&name),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve() {
        let dist = Path::new("/srv/dist");
        assert_eq!(resolve(dist, "/"), Some(PathBuf::from("/srv/dist/index.html")));
        assert_eq!(
            resolve(dist, "/apps/"),
            Some(PathBuf::from("/srv/dist/apps/index.html"))
        );
        assert_eq!(
            resolve(dist, "/main.js"),
            Some(PathBuf::from("/srv/dist/main.js"))
        );
        assert_eq!(resolve(dist, "/../etc/passwd"), None);
        assert_eq!(resolve(dist, "/a/../../b"), None);
    }

    #[tokio::test]
    async fn test_load() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), b"<html>").unwrap();
        std::fs::create_dir(dir.path().join("css")).unwrap();

        let index = load(dir.path(), "/").await.unwrap();
        assert_eq!(index.mime, "text/html");
        assert_eq!(index.data, b"<html>");

        assert!(load(dir.path(), "/missing.js").await.is_none());
        // A directory without index.html.
        assert!(load(dir.path(), "/css").await.is_none());
    }
}
