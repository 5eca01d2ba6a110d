//! The authorization pipeline.
//!
//! Four stages run in a fixed order and the first failure wins:
//!
//! 1. **session** - the caller has a live session (skipped for `login`)
//! 2. **group** - `fs` calls need the `fs` group; API methods need the
//!    groups listed in `api_groups`; then the authenticator may veto
//! 3. **mount** - for `fs` calls: disabled, then read-only, then mount groups
//! 4. **blacklist** - for `package` calls: the path is not blacklisted
//!
//! Stages that do not apply to a request kind pass immediately. The
//! pipeline holds no state of its own, so any number of requests can be
//! authorized concurrently.

use std::fmt;

use tracing::{debug, info};

use deskd_types::{User, FS_GROUP};

use crate::context::RequestContext;
use crate::error::{CoreError, CoreResult};
use crate::packages::is_blacklisted;
use crate::vfs::VfsOp;

/// The one API method callable without a session.
pub const LOGIN_METHOD: &str = "login";

/// What is being authorized.
#[derive(Debug, Clone, Copy)]
pub enum AuthRequest<'a> {
    /// An API method call.
    Api { method: &'a str },
    /// A VFS operation on one or more virtual paths.
    Fs { op: VfsOp, paths: &'a [String] },
    /// Loading a package asset or calling a package's server API.
    Package { path: &'a str },
}

impl AuthRequest<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Api { .. } => "api",
            Self::Fs { .. } => "fs",
            Self::Package { .. } => "package",
        }
    }

    fn is_login(&self) -> bool {
        matches!(self, Self::Api { method } if *method == LOGIN_METHOD)
    }
}

impl fmt::Display for AuthRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api { method } => write!(f, "api:{}", method),
            Self::Fs { op, paths } => write!(f, "fs:{} {:?}", op, paths),
            Self::Package { path } => write!(f, "package:{}", path),
        }
    }
}

/// Pipeline stage names, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    Session,
    Group,
    Mount,
    Blacklist,
}

/// Run every applicable stage for `request`.
pub async fn authorize(ctx: &RequestContext, request: &AuthRequest<'_>) -> CoreResult<()> {
    let result = run(ctx, request).await;
    match &result {
        Ok(()) => debug!(request = %request, "authorized"),
        Err((stage, err)) => info!(request = %request, %stage, error = %err, "rejected"),
    }
    result.map_err(|(_, err)| err)
}

async fn run(ctx: &RequestContext, request: &AuthRequest<'_>) -> Result<(), (Stage, CoreError)> {
    check_session(ctx, request)
        .await
        .map_err(|e| (Stage::Session, e))?;
    check_groups(ctx, request)
        .await
        .map_err(|e| (Stage::Group, e))?;
    check_mounts(ctx, request).map_err(|e| (Stage::Mount, e))?;
    check_blacklist(ctx, request)
        .await
        .map_err(|e| (Stage::Blacklist, e))?;
    Ok(())
}

/// Stage 1.
async fn check_session(ctx: &RequestContext, request: &AuthRequest<'_>) -> CoreResult<()> {
    if request.is_login() {
        return Ok(());
    }
    ctx.instance.authenticator.check_session(ctx).await
}

/// Stage 2.
async fn check_groups(ctx: &RequestContext, request: &AuthRequest<'_>) -> CoreResult<()> {
    match request {
        AuthRequest::Fs { .. } => require_groups(ctx.user().as_ref(), &[FS_GROUP])?,
        AuthRequest::Api { method } => {
            // Methods absent from the table are unrestricted.
            if let Some(required) = ctx.instance.config.api_groups.get(*method) {
                require_groups(ctx.user().as_ref(), required)?;
            }
        }
        AuthRequest::Package { .. } => {}
    }

    ctx.instance.authenticator.check_permission(ctx, request).await
}

fn require_groups<S: AsRef<str>>(user: Option<&User>, required: &[S]) -> CoreResult<()> {
    let Some(user) = user else {
        return Err(CoreError::access_denied("not logged in"));
    };
    if user.has_groups(required) {
        Ok(())
    } else {
        let needed: Vec<&str> = required.iter().map(AsRef::as_ref).collect();
        Err(CoreError::access_denied(format!(
            "{} needs group(s) {}",
            user.username,
            needed.join(", ")
        )))
    }
}

/// Stage 3. Order inside the stage: disabled, read-only, groups.
fn check_mounts(ctx: &RequestContext, request: &AuthRequest<'_>) -> CoreResult<()> {
    let AuthRequest::Fs { op, paths } = request else {
        return Ok(());
    };
    let user = ctx.user();

    for path in paths.iter() {
        let resolved = ctx.instance.mounts.resolve(path).map_err(|e| match e {
            CoreError::MountDisabled(p) => CoreError::access_denied(format!("mount {} is disabled", p)),
            other => other,
        })?;
        let mount = resolved.mount;

        if mount.read_only && op.is_mutating() {
            return Err(CoreError::access_denied(format!(
                "mount {} is read-only",
                mount.protocol
            )));
        }
        if !mount.groups.is_empty() {
            require_groups(user.as_ref(), &mount.groups)?;
        }
    }
    Ok(())
}

/// Stage 4.
async fn check_blacklist(ctx: &RequestContext, request: &AuthRequest<'_>) -> CoreResult<()> {
    let AuthRequest::Package { path } = request else {
        return Ok(());
    };
    let Some(user) = ctx.user() else {
        return Err(CoreError::access_denied("not logged in"));
    };

    let blacklist = ctx.instance.storage.get_blacklist(&user.username).await?;
    if is_blacklisted(&blacklist, path) {
        return Err(CoreError::access_denied(format!("package {} is blacklisted", path)));
    }
    Ok(())
}
