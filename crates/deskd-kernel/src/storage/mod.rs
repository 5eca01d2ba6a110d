//! Storage collaborators.
//!
//! Storage keeps per-user data the dispatch core needs to query: the
//! package blacklist consulted by the last authorization stage, and the
//! settings blob returned at login.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Storage backend failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Per-user persistence.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Module name this storage was registered under.
    fn name(&self) -> &str;

    /// Called once by the loader before the instance is frozen.
    async fn register(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Called at shutdown.
    async fn destroy(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Package paths the user may not load.
    async fn get_blacklist(&self, username: &str) -> StorageResult<Vec<String>>;

    async fn set_blacklist(&self, username: &str, list: Vec<String>) -> StorageResult<()>;

    /// Settings blob; `{}` when nothing was stored yet.
    async fn get_settings(&self, username: &str) -> StorageResult<Value>;

    async fn set_settings(&self, username: &str, settings: Value) -> StorageResult<()>;
}

/// Reject usernames that cannot be used as a single path component.
pub(crate) fn check_username(username: &str) -> StorageResult<()> {
    if username.is_empty()
        || username.starts_with('.')
        || username.contains(['/', '\\', '\0'])
    {
        return Err(StorageError::Other(format!("invalid username {:?}", username)));
    }
    Ok(())
}
