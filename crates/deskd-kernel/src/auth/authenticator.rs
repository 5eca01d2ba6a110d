//! Authenticator collaborators.
//!
//! An authenticator owns login and logout, decides what a valid session
//! is, and may veto a request after the group checks have passed.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use deskd_types::User;

use super::pipeline::AuthRequest;
use crate::config::{AuthenticatorConfig, UserConfig};
use crate::context::RequestContext;
use crate::error::{CoreError, CoreResult};

/// Body of a `login` call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Module name this authenticator was registered under.
    fn name(&self) -> &str;

    /// Called once by the loader before the instance is frozen.
    async fn register(&self) -> CoreResult<()> {
        Ok(())
    }

    /// Called at shutdown.
    async fn destroy(&self) -> CoreResult<()> {
        Ok(())
    }

    /// Prepare session state at the start of every request.
    async fn init_session(&self, ctx: &RequestContext) -> CoreResult<()> {
        let _ = ctx;
        Ok(())
    }

    /// Succeeds when the session belongs to a logged-in user.
    async fn check_session(&self, ctx: &RequestContext) -> CoreResult<()> {
        match ctx.user() {
            Some(_) => Ok(()),
            None => Err(CoreError::NoSession),
        }
    }

    /// Extra veto run after the built-in group checks.
    async fn check_permission(&self, ctx: &RequestContext, request: &AuthRequest<'_>) -> CoreResult<()> {
        let _ = (ctx, request);
        Ok(())
    }

    /// Verify credentials and return the user to store in the session.
    async fn login(&self, ctx: &RequestContext, credentials: &Credentials) -> CoreResult<User>;

    /// Forget the session's user.
    async fn logout(&self, ctx: &RequestContext) -> CoreResult<()> {
        ctx.session.clear();
        Ok(())
    }
}

/// Accepts any non-empty username and grants a fixed set of groups.
#[derive(Debug, Clone)]
pub struct DemoAuthenticator {
    groups: Vec<String>,
}

impl DemoAuthenticator {
    pub const NAME: &'static str = "demo";

    pub fn new(groups: Vec<String>) -> Self {
        Self { groups }
    }

    pub fn from_config(config: &AuthenticatorConfig) -> Self {
        Self::new(config.default_groups.clone())
    }
}

#[async_trait]
impl Authenticator for DemoAuthenticator {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn login(&self, _ctx: &RequestContext, credentials: &Credentials) -> CoreResult<User> {
        let username = credentials.username.trim();
        if username.is_empty() {
            return Err(CoreError::access_denied("Invalid login"));
        }
        Ok(User::new(username).with_groups(self.groups.iter().cloned()))
    }
}

/// Users and passwords listed in configuration.
#[derive(Debug, Clone)]
pub struct StaticAuthenticator {
    users: HashMap<String, UserConfig>,
}

impl StaticAuthenticator {
    pub const NAME: &'static str = "static";

    pub fn new(users: impl IntoIterator<Item = UserConfig>) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|u| (u.username.clone(), u))
                .collect(),
        }
    }

    pub fn from_config(config: &AuthenticatorConfig) -> Self {
        Self::new(config.users.iter().cloned())
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn login(&self, _ctx: &RequestContext, credentials: &Credentials) -> CoreResult<User> {
        let entry = self
            .users
            .get(&credentials.username)
            .filter(|u| u.password == credentials.password);
        let Some(entry) = entry else {
            info!(username = %credentials.username, "login refused");
            return Err(CoreError::access_denied("Invalid login"));
        };

        let mut user = User::new(&entry.username).with_groups(entry.groups.iter().cloned());
        if let Some(name) = &entry.display_name {
            user = user.with_display_name(name);
        }
        Ok(user)
    }
}
