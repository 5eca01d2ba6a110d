//! JSON file storage.
//!
//! Layout: `<root>/<username>/settings.json` and
//! `<root>/<username>/blacklist.json`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::fs;
use tracing::debug;

use super::{check_username, Storage, StorageResult};

const SETTINGS_FILE: &str = "settings.json";
const BLACKLIST_FILE: &str = "blacklist.json";

/// Storage persisted as JSON files under a root directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    /// Blacklists used for users with no `blacklist.json` yet.
    seed: HashMap<String, Vec<String>>,
}

impl FileStorage {
    pub const NAME: &'static str = "file";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            seed: HashMap::new(),
        }
    }

    pub fn with_blacklists(mut self, seed: HashMap<String, Vec<String>>) -> Self {
        self.seed = seed;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_file(&self, username: &str, file: &str) -> StorageResult<PathBuf> {
        check_username(username)?;
        Ok(self.root.join(username).join(file))
    }

    async fn load<T: DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn store<T: Serialize>(path: &Path, value: &T) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(value)?;
        // Readers never see a partial file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), "stored");
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn register(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn get_blacklist(&self, username: &str) -> StorageResult<Vec<String>> {
        let path = self.user_file(username, BLACKLIST_FILE)?;
        match Self::load(&path).await? {
            Some(list) => Ok(list),
            None => Ok(self.seed.get(username).cloned().unwrap_or_default()),
        }
    }

    async fn set_blacklist(&self, username: &str, list: Vec<String>) -> StorageResult<()> {
        let path = self.user_file(username, BLACKLIST_FILE)?;
        Self::store(&path, &list).await
    }

    async fn get_settings(&self, username: &str) -> StorageResult<Value> {
        let path = self.user_file(username, SETTINGS_FILE)?;
        Ok(Self::load(&path)
            .await?
            .unwrap_or_else(|| Value::Object(Default::default())))
    }

    async fn set_settings(&self, username: &str, settings: Value) -> StorageResult<()> {
        let path = self.user_file(username, SETTINGS_FILE)?;
        Self::store(&path, &settings).await
    }
}
