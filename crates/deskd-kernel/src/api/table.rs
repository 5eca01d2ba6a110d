//! The API method table.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::CoreResult;
use crate::loader::LoadError;

/// An async API handler.
#[async_trait]
pub trait ApiMethod: Send + Sync {
    /// Run the method. `args` is the request's JSON body (or query string
    /// for GET), `null` when there was none.
    async fn call(&self, ctx: &RequestContext, args: Value) -> CoreResult<Value>;
}

/// Method name → handler. Names are unique.
#[derive(Default, Clone)]
pub struct ApiTable {
    methods: HashMap<String, Arc<dyn ApiMethod>>,
}

impl std::fmt::Debug for ApiTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiTable")
            .field("methods", &self.names())
            .finish()
    }
}

impl ApiTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method. Fails if the name is taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        method: Arc<dyn ApiMethod>,
    ) -> Result<(), LoadError> {
        let name = name.into();
        if self.methods.contains_key(&name) {
            return Err(LoadError::DuplicateMethod(name));
        }
        self.methods.insert(name, method);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ApiMethod>> {
        self.methods.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ApiMethod for Echo {
        async fn call(&self, _ctx: &RequestContext, args: Value) -> CoreResult<Value> {
            Ok(args)
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut table = ApiTable::new();
        table.register("echo", Arc::new(Echo)).unwrap();
        table.register("again", Arc::new(Echo)).unwrap();

        assert!(table.contains("echo"));
        assert!(table.get("nope").is_none());
        assert_eq!(table.names(), vec!["again", "echo"]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut table = ApiTable::new();
        table.register("echo", Arc::new(Echo)).unwrap();
        let err = table.register("echo", Arc::new(Echo)).unwrap_err();
        assert!(matches!(err, LoadError::DuplicateMethod(name) if name == "echo"));
        assert_eq!(table.len(), 1);
    }
}
