//! In-memory storage.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::{check_username, Storage, StorageResult};

/// Storage held in process memory. Lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blacklists: DashMap<String, Vec<String>>,
    settings: DashMap<String, Value>,
}

impl MemoryStorage {
    pub const NAME: &'static str = "memory";

    pub fn new() -> Self {
        Self::default()
    }

    /// Seed blacklists, e.g. from configuration.
    pub fn with_blacklists(blacklists: HashMap<String, Vec<String>>) -> Self {
        Self {
            blacklists: blacklists.into_iter().collect(),
            settings: DashMap::new(),
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn get_blacklist(&self, username: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .blacklists
            .get(username)
            .map(|list| list.clone())
            .unwrap_or_default())
    }

    async fn set_blacklist(&self, username: &str, list: Vec<String>) -> StorageResult<()> {
        check_username(username)?;
        self.blacklists.insert(username.to_string(), list);
        Ok(())
    }

    async fn get_settings(&self, username: &str) -> StorageResult<Value> {
        Ok(self
            .settings
            .get(username)
            .map(|v| v.clone())
            .unwrap_or_else(|| Value::Object(Default::default())))
    }

    async fn set_settings(&self, username: &str, settings: Value) -> StorageResult<()> {
        check_username(username)?;
        self.settings.insert(username.to_string(), settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_seeded_blacklist() {
        let storage = MemoryStorage::with_blacklists(HashMap::from([(
            "demo".to_string(),
            vec!["default/Draw".to_string()],
        )]));
        assert_eq!(storage.get_blacklist("demo").await.unwrap(), vec!["default/Draw"]);
        assert!(storage.get_blacklist("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_settings_default_to_empty_object() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get_settings("demo").await.unwrap(), json!({}));

        storage.set_settings("demo", json!({"theme": "dark"})).await.unwrap();
        assert_eq!(storage.get_settings("demo").await.unwrap()["theme"], "dark");
    }

    #[tokio::test]
    async fn test_rejects_path_like_usernames() {
        let storage = MemoryStorage::new();
        assert!(storage.set_settings("../x", json!({})).await.is_err());
    }
}
