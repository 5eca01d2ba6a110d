//! Adapter for old-style callback handlers.
//!
//! Legacy handlers receive `(ctx, args, callback)` and report by calling
//! `callback(error, result)` exactly once, possibly from another task.
//! [`LegacyMethod`] turns that into an [`ApiMethod`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::warn;

use super::table::ApiMethod;
use crate::context::RequestContext;
use crate::error::{CoreError, CoreResult};

/// Completion callback: `Some(message)` on error, otherwise the result.
pub type LegacyCallback = Box<dyn FnOnce(Option<String>, Value) + Send>;

/// Old-style handler signature.
pub type LegacyFn = dyn Fn(RequestContext, Value, LegacyCallback) + Send + Sync;

/// An [`ApiMethod`] backed by a callback-style function.
#[derive(Clone)]
pub struct LegacyMethod {
    name: String,
    func: Arc<LegacyFn>,
}

impl LegacyMethod {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(RequestContext, Value, LegacyCallback) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl ApiMethod for LegacyMethod {
    async fn call(&self, ctx: &RequestContext, args: Value) -> CoreResult<Value> {
        let (tx, rx) = oneshot::channel();
        let callback: LegacyCallback = Box::new(move |error, result| {
            let _ = tx.send(match error {
                Some(message) => Err(message),
                None => Ok(result),
            });
        });

        (self.func)(ctx.clone(), args, callback);

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(CoreError::backend(message)),
            Err(_) => {
                warn!(method = %self.name, "legacy handler dropped its callback");
                Err(CoreError::backend(format!("{} did not respond", self.name)))
            }
        }
    }
}
