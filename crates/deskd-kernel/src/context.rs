//! Per-request context.

use std::sync::Arc;

use http::Method;
use tokio_util::sync::CancellationToken;

use deskd_types::User;

use crate::instance::Instance;
use crate::session::Session;
use crate::vfs::OpContext;

/// Everything a handler may know about the call it is serving.
///
/// Lives for one request and is never shared between requests.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Process-unique request number, for logs.
    pub id: u64,
    pub method: Method,
    /// Request path as received, e.g. `/API/login`.
    pub path: String,
    pub session: Session,
    /// Fires when the client goes away.
    pub cancel: CancellationToken,
    pub instance: Arc<Instance>,
}

impl RequestContext {
    pub fn new(
        id: u64,
        method: Method,
        path: impl Into<String>,
        session: Session,
        instance: Arc<Instance>,
    ) -> Self {
        Self {
            id,
            method,
            path: path.into(),
            session,
            cancel: CancellationToken::new(),
            instance,
        }
    }

    /// Replace the cancellation token (the HTTP layer owns the real one).
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The logged-in user, if any.
    pub fn user(&self) -> Option<User> {
        self.session.user()
    }

    /// Context handed to transport operations.
    pub fn op_context(&self) -> OpContext {
        OpContext::new(self.user().map(|u| u.username), self.cancel.clone())
    }
}
