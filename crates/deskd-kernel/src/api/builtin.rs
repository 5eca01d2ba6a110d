//! Built-in API methods.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::table::{ApiMethod, ApiTable};
use crate::auth::{authorize, AuthRequest, Credentials, LOGIN_METHOD};
use crate::context::RequestContext;
use crate::error::{CoreError, CoreResult};
use crate::loader::LoadError;

/// Register `login`, `logout`, `settings`, `packages` and `application`.
pub fn register_builtins(table: &mut ApiTable) -> Result<(), LoadError> {
    table.register(LOGIN_METHOD, Arc::new(LoginMethod))?;
    table.register("logout", Arc::new(LogoutMethod))?;
    table.register("settings", Arc::new(SettingsMethod))?;
    table.register("packages", Arc::new(PackagesMethod))?;
    table.register("application", Arc::new(ApplicationMethod))?;
    Ok(())
}

fn parse_args<T: for<'de> Deserialize<'de> + Default>(args: Value) -> CoreResult<T> {
    if args.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(args).map_err(|e| CoreError::invalid_argument(e.to_string()))
}

fn username(ctx: &RequestContext) -> CoreResult<String> {
    ctx.user()
        .map(|u| u.username)
        .ok_or(CoreError::NoSession)
}

/// `login {username, password}` → `{user, settings}`.
pub struct LoginMethod;

#[async_trait]
impl ApiMethod for LoginMethod {
    async fn call(&self, ctx: &RequestContext, args: Value) -> CoreResult<Value> {
        let credentials: Credentials = parse_args(args)?;
        let user = ctx.instance.authenticator.login(ctx, &credentials).await?;
        ctx.session.set_user(&user);
        info!(user = %user, groups = ?user.groups, "logged in");

        let settings = ctx.instance.storage.get_settings(&user.username).await?;
        Ok(json!({ "user": user, "settings": settings }))
    }
}

/// `logout` → `true`.
pub struct LogoutMethod;

#[async_trait]
impl ApiMethod for LogoutMethod {
    async fn call(&self, ctx: &RequestContext, _args: Value) -> CoreResult<Value> {
        let user = ctx.user();
        ctx.instance.authenticator.logout(ctx).await?;
        if let Some(user) = user {
            info!(user = %user, "logged out");
        }
        Ok(Value::Bool(true))
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsArgs {
    #[serde(default)]
    settings: Value,
}

/// `settings {settings}` → `true`.
pub struct SettingsMethod;

#[async_trait]
impl ApiMethod for SettingsMethod {
    async fn call(&self, ctx: &RequestContext, args: Value) -> CoreResult<Value> {
        let args: SettingsArgs = parse_args(args)?;
        if !args.settings.is_object() {
            return Err(CoreError::invalid_argument("settings must be an object"));
        }
        let username = username(ctx)?;
        ctx.instance.storage.set_settings(&username, args.settings).await?;
        Ok(Value::Bool(true))
    }
}

/// `packages` → manifests the caller may load.
pub struct PackagesMethod;

#[async_trait]
impl ApiMethod for PackagesMethod {
    async fn call(&self, ctx: &RequestContext, _args: Value) -> CoreResult<Value> {
        let username = username(ctx)?;
        let blacklist = ctx.instance.storage.get_blacklist(&username).await?;
        let visible = ctx.instance.packages.visible(&blacklist);
        serde_json::to_value(visible).map_err(|e| CoreError::backend(e.to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ApplicationArgs {
    #[serde(default)]
    path: String,
    #[serde(default)]
    method: String,
    #[serde(default)]
    args: Value,
}

/// `application {path, method, args}` → whatever the package returns.
pub struct ApplicationMethod;

#[async_trait]
impl ApiMethod for ApplicationMethod {
    async fn call(&self, ctx: &RequestContext, args: Value) -> CoreResult<Value> {
        let args: ApplicationArgs = parse_args(args)?;
        if args.path.is_empty() || args.method.is_empty() {
            return Err(CoreError::invalid_argument("path and method are required"));
        }

        authorize(ctx, &AuthRequest::Package { path: &args.path }).await?;

        let api = ctx
            .instance
            .packages
            .api(&args.path)
            .ok_or_else(|| CoreError::invalid_argument(format!("No such package: {}", args.path)))?;
        api.call(ctx, &args.method, args.args).await
    }
}
