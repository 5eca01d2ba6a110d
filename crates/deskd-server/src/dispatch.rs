//! Request dispatch.
//!
//! Every inbound request, whatever its shape, goes through
//! [`Dispatcher::handle`]:
//!
//! ```text
//! Received → SessionInit → Classified → Authorizing → Dispatching → Responded
//!                              │             │
//!                              └─────────────┴──────────→ Rejected
//! ```
//!
//! Classification decides between a VFS call, an API call, a gated
//! package asset and a plain static asset. Authorization always runs
//! before any transport, handler or storage is touched. Every outcome is
//! normalized into a [`Response`]; no error crosses this boundary.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{Method, StatusCode};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use percent_encoding::percent_decode_str;
use serde_json::{json, Map, Value};
use strum::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use deskd_kernel::auth::{authorize, AuthRequest};
use deskd_kernel::vfs::{mime_for, UploadFile, VirtualPath};
use deskd_kernel::{CoreError, CoreResult, Instance, RequestContext, VfsOp};
use deskd_types::SessionId;

use crate::constants::{API_NAMESPACE, FS_GET, FS_NAMESPACE, PACKAGES_NAMESPACE, SESSION_SWEEP_INTERVAL};
use crate::static_files;

// ============================================================================
// Request / Response
// ============================================================================

/// Transport-neutral view of an inbound request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Path without the query string.
    pub path: String,
    /// Decoded query string parameters.
    pub query: Map<String, Value>,
    pub body: Bytes,
    /// Session id presented by the client, if any.
    pub session: Option<SessionId>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Map::new(),
            body: Bytes::new(),
            session: None,
        }
    }

    pub fn with_json(mut self, body: &Value) -> Self {
        self.body = Bytes::from(body.to_string());
        self
    }

    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = Some(session);
        self
    }

    /// Call arguments: the JSON body for POST, the query string otherwise.
    fn args(&self) -> CoreResult<Value> {
        if self.method == Method::GET || self.method == Method::HEAD {
            return Ok(Value::Object(self.query.clone()));
        }
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| CoreError::invalid_argument(format!("request body: {}", e)))
    }
}

/// Normalized result of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// `{"error": null|message, "result": ...}` envelope.
    Json { status: StatusCode, body: Value },
    /// Raw file contents (static assets, VFS reads).
    Raw { mime: &'static str, data: Vec<u8> },
    NotFound,
}

impl Response {
    pub fn ok(result: Value) -> Self {
        Self::Json {
            status: StatusCode::OK,
            body: json!({ "error": null, "result": result }),
        }
    }

    pub fn error(err: &CoreError) -> Self {
        Self::Json {
            status: err.status_code(),
            body: json!({ "error": err.to_string(), "result": null }),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Json { status, .. } => *status,
            Self::Raw { .. } => StatusCode::OK,
            Self::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

/// A response plus the session it ran under.
#[derive(Debug)]
pub struct Outcome {
    pub response: Response,
    pub session: SessionId,
    /// True when this request created the session and stored something in
    /// it; the client needs the new id.
    pub new_session: bool,
}

// ============================================================================
// Classification
// ============================================================================

/// What a request turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// VFS operation. `path` is set for `/FS/get/<path>`.
    Fs { op: VfsOp, path: Option<String> },
    Api { method: String },
    /// Asset under `/packages/`, gated by a package authorization.
    Package { path: String },
    Static { path: String },
    NotFound,
}

/// Decide what `method path` is. `path` is the raw, percent-encoded
/// request path.
///
/// The path is decoded and normalized once: empty and `.` segments are
/// dropped and any `..` segment makes the route [`Route::NotFound`]. The
/// target of `/FS/get/<path>` is taken verbatim after decoding.
///
/// Fails for undecodable paths, unknown VFS operations and mutating calls
/// to API methods that do not exist.
pub fn classify(instance: &Instance, method: &Method, path: &str) -> CoreResult<Route> {
    let decoded = percent_decode_str(path)
        .decode_utf8()
        .map_err(|e| CoreError::invalid_argument(format!("request path: {}", e)))?;
    let segments = Segments::parse(&decoded);

    if segments.first() == Some(FS_NAMESPACE) {
        if segments.get(1) == Some(FS_GET) {
            return Ok(Route::Fs {
                op: VfsOp::Read,
                path: Some(segments.remainder(2).to_string()),
            });
        }
        if segments.has_parent() {
            return Ok(Route::NotFound);
        }
        let rest = segments.join(1);
        let op = VfsOp::from_str(&rest)
            .map_err(|_| CoreError::invalid_argument(format!("No such VFS operation: {}", rest)))?;
        return Ok(Route::Fs { op, path: None });
    }

    if segments.has_parent() {
        return Ok(Route::NotFound);
    }

    let is_mutating = !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS);
    if is_mutating {
        if segments.first() == Some(API_NAMESPACE) {
            let name = segments.join(1);
            if instance.api.contains(&name) {
                return Ok(Route::Api { method: name });
            }
            return Err(CoreError::NoSuchMethod(name));
        }
        return Ok(Route::NotFound);
    }

    if segments.first() == Some(PACKAGES_NAMESPACE) {
        return Ok(Route::Package {
            path: segments.join(1),
        });
    }
    Ok(Route::Static {
        path: segments.normalized(),
    })
}

/// Non-empty, non-`.` segments of a decoded path, with their byte offsets.
struct Segments<'a> {
    source: &'a str,
    parts: Vec<(usize, &'a str)>,
}

impl<'a> Segments<'a> {
    fn parse(source: &'a str) -> Self {
        let mut parts = Vec::new();
        let mut offset = 0;
        for part in source.split('/') {
            if !part.is_empty() && part != "." {
                parts.push((offset, part));
            }
            offset += part.len() + 1;
        }
        Self { source, parts }
    }

    fn get(&self, index: usize) -> Option<&'a str> {
        self.parts.get(index).map(|(_, part)| *part)
    }

    fn first(&self) -> Option<&'a str> {
        self.get(0)
    }

    fn has_parent(&self) -> bool {
        self.parts.iter().any(|(_, part)| *part == "..")
    }

    /// Segments from `index` on, joined with `/`.
    fn join(&self, index: usize) -> String {
        self.parts
            .iter()
            .skip(index)
            .map(|(_, part)| *part)
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Everything after segment `index - 1`, untouched.
    fn remainder(&self, index: usize) -> &'a str {
        match self.parts.get(index) {
            Some((offset, _)) => &self.source[*offset..],
            None => "",
        }
    }

    /// `/a/b`, keeping a trailing slash so directories map to their index.
    fn normalized(&self) -> String {
        let mut path = format!("/{}", self.join(0));
        if !self.parts.is_empty() && self.source.ends_with('/') {
            path.push('/');
        }
        path
    }
}

// ============================================================================
// VFS arguments
// ============================================================================

/// Arguments of one VFS call, validated per operation.
#[derive(Debug, Clone)]
enum FsCall {
    Path(String),
    Transfer { from: String, to: String },
    Write { path: String, data: Vec<u8> },
    Upload { dir: String, file: UploadFile },
    Find { path: String, query: String },
}

impl FsCall {
    fn parse(op: VfsOp, url_path: Option<String>, args: &Value) -> CoreResult<Self> {
        let path = || -> CoreResult<String> {
            match &url_path {
                Some(p) => Ok(p.clone()),
                None => string_arg(args, "path"),
            }
        };

        Ok(match op {
            VfsOp::Move | VfsOp::Copy => Self::Transfer {
                from: string_arg(args, "from")?,
                to: string_arg(args, "to")?,
            },
            VfsOp::Write => {
                let data = string_arg(args, "data")?;
                let data = if bool_arg(args, "binary") {
                    BASE64
                        .decode(data.as_bytes())
                        .map_err(|e| CoreError::invalid_argument(format!("data: {}", e)))?
                } else {
                    data.into_bytes()
                };
                Self::Write { path: path()?, data }
            }
            VfsOp::Upload => {
                let data = BASE64
                    .decode(string_arg(args, "data")?.as_bytes())
                    .map_err(|e| CoreError::invalid_argument(format!("data: {}", e)))?;
                Self::Upload {
                    dir: path()?,
                    file: UploadFile {
                        filename: string_arg(args, "filename")?,
                        data,
                    },
                }
            }
            VfsOp::Find => Self::Find {
                path: path()?,
                query: string_arg(args, "query")?,
            },
            VfsOp::FreeSpace => Self::Path(path().unwrap_or_else(|_| "/".to_string())),
            VfsOp::Exists
            | VfsOp::Read
            | VfsOp::Mkdir
            | VfsOp::Delete
            | VfsOp::Scandir
            | VfsOp::Fileinfo => Self::Path(path()?),
        })
    }

    /// Every virtual path the call touches.
    fn paths(&self) -> Vec<String> {
        match self {
            Self::Path(path) | Self::Write { path, .. } | Self::Find { path, .. } => {
                vec![path.clone()]
            }
            Self::Transfer { from, to } => vec![from.clone(), to.clone()],
            Self::Upload { dir, .. } => vec![dir.clone()],
        }
    }
}

fn string_arg(args: &Value, key: &str) -> CoreResult<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CoreError::invalid_argument(format!("missing argument: {}", key)))
}

fn bool_arg(args: &Value, key: &str) -> bool {
    match args.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        _ => false,
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Per-request lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
pub enum RequestState {
    Received,
    SessionInit,
    Classified,
    Authorizing,
    Dispatching,
    Responded,
    Rejected,
}

/// Forward-only state tracker for one request.
#[derive(Debug)]
struct Lifecycle {
    state: RequestState,
}

impl Lifecycle {
    fn new() -> Self {
        debug!(state = %RequestState::Received, "request state");
        Self {
            state: RequestState::Received,
        }
    }

    fn advance(&mut self, next: RequestState) {
        debug_assert!(next > self.state, "{} -> {}", self.state, next);
        debug!(from = %self.state, to = %next, "request state");
        self.state = next;
    }

    /// Terminal transition for a request refused before dispatch.
    fn reject(&mut self, err: &CoreError) -> Response {
        self.advance(RequestState::Rejected);
        Response::error(err)
    }

    /// Terminal transition after dispatch, successful or not.
    fn respond(&mut self, result: CoreResult<Response>) -> Response {
        self.advance(RequestState::Responded);
        match result {
            Ok(response) => response,
            Err(err) => {
                if !err.is_authorization() {
                    warn!(error = ?err, "request failed");
                }
                Response::error(&err)
            }
        }
    }
}

/// The single entry point for every request.
#[derive(Debug)]
pub struct Dispatcher {
    instance: Arc<Instance>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new(instance: Arc<Instance>) -> Self {
        Self {
            instance,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    /// Handle one request. `cancel` fires when the client goes away.
    pub async fn handle(&self, request: Request, cancel: CancellationToken) -> Outcome {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let span = info_span!("request", id, method = %request.method, path = %request.path);
        self.run(id, request, cancel).instrument(span).await
    }

    async fn run(&self, id: u64, request: Request, cancel: CancellationToken) -> Outcome {
        let mut lifecycle = Lifecycle::new();

        // SessionInit
        lifecycle.advance(RequestState::SessionInit);
        if id % SESSION_SWEEP_INTERVAL == 0 {
            self.instance.sessions.evict_idle();
        }
        let (session, new_session) = self.instance.sessions.open(request.session);
        let session_id = session.id();
        let ctx = RequestContext::new(
            id,
            request.method.clone(),
            request.path.clone(),
            session,
            self.instance.clone(),
        )
        .with_cancel(cancel);
        // Fresh sessions only reach the client once something was stored.
        let outcome = |response| Outcome {
            response,
            session: session_id,
            new_session: new_session && ctx.session.is_stored(),
        };

        if let Err(err) = self.instance.authenticator.init_session(&ctx).await {
            return outcome(lifecycle.reject(&err));
        }

        // Classified
        let route = classify(&self.instance, &request.method, &request.path);
        lifecycle.advance(RequestState::Classified);
        let route = match route {
            Ok(route) => route,
            Err(err) => return outcome(lifecycle.reject(&err)),
        };
        debug!(?route, "classified");

        let response = match route {
            Route::Fs { op, path } => self.fs(&mut lifecycle, &ctx, &request, op, path).await,
            Route::Api { method } => self.api(&mut lifecycle, &ctx, &request, &method).await,
            Route::Package { path } => self.package(&mut lifecycle, &ctx, &path).await,
            Route::Static { path } => {
                lifecycle.advance(RequestState::Authorizing);
                lifecycle.advance(RequestState::Dispatching);
                let response = self.serve_static(&path).await;
                lifecycle.respond(Ok(response))
            }
            Route::NotFound => lifecycle.respond(Ok(Response::NotFound)),
        };
        outcome(response)
    }

    async fn api(
        &self,
        lifecycle: &mut Lifecycle,
        ctx: &RequestContext,
        request: &Request,
        method: &str,
    ) -> Response {
        lifecycle.advance(RequestState::Authorizing);
        if let Err(err) = authorize(ctx, &AuthRequest::Api { method }).await {
            return lifecycle.reject(&err);
        }

        lifecycle.advance(RequestState::Dispatching);
        let result = async {
            let handler = self
                .instance
                .api
                .get(method)
                .ok_or_else(|| CoreError::NoSuchMethod(method.to_string()))?;
            let args = request.args()?;
            handler.call(ctx, args).await.map(Response::ok)
        }
        .await;
        lifecycle.respond(result)
    }

    async fn fs(
        &self,
        lifecycle: &mut Lifecycle,
        ctx: &RequestContext,
        request: &Request,
        op: VfsOp,
        url_path: Option<String>,
    ) -> Response {
        // Malformed arguments are reported after authorization so an
        // anonymous caller still gets a 403.
        let call = request
            .args()
            .and_then(|args| FsCall::parse(op, url_path, &args));
        let paths = call.as_ref().map(FsCall::paths).unwrap_or_default();

        lifecycle.advance(RequestState::Authorizing);
        if let Err(err) = authorize(ctx, &AuthRequest::Fs { op, paths: &paths }).await {
            return lifecycle.reject(&err);
        }

        lifecycle.advance(RequestState::Dispatching);
        let result = match call {
            Ok(call) => self.run_fs(ctx, op, call).await,
            Err(err) => Err(err),
        };
        lifecycle.respond(result)
    }

    async fn run_fs(&self, ctx: &RequestContext, op: VfsOp, call: FsCall) -> CoreResult<Response> {
        let transports = &self.instance.transports;
        let cx = ctx.op_context();
        let resolve = |path: &str| -> CoreResult<VirtualPath> {
            Ok(self.instance.mounts.resolve(path)?.path)
        };

        let result = match (op, call) {
            (VfsOp::Exists, FsCall::Path(p)) => json!(transports.exists(&cx, &resolve(&p)?).await?),
            (VfsOp::Read, FsCall::Path(p)) => {
                let vpath = resolve(&p)?;
                let data = transports.read(&cx, &vpath).await?;
                return Ok(Response::Raw {
                    mime: mime_for(vpath.filename()),
                    data,
                });
            }
            (VfsOp::Mkdir, FsCall::Path(p)) => {
                transports.mkdir(&cx, &resolve(&p)?).await?;
                Value::Bool(true)
            }
            (VfsOp::Delete, FsCall::Path(p)) => {
                transports.delete(&cx, &resolve(&p)?).await?;
                Value::Bool(true)
            }
            (VfsOp::Scandir, FsCall::Path(p)) => json!(transports.scandir(&cx, &resolve(&p)?).await?),
            (VfsOp::Fileinfo, FsCall::Path(p)) => json!(transports.fileinfo(&cx, &resolve(&p)?).await?),
            (VfsOp::FreeSpace, FsCall::Path(p)) => json!(transports.free_space(&cx, &resolve(&p)?).await?),
            (VfsOp::Write, FsCall::Write { path, data }) => {
                transports.write(&cx, &resolve(&path)?, &data).await?;
                Value::Bool(true)
            }
            (VfsOp::Copy, FsCall::Transfer { from, to }) => {
                transports.copy(&cx, &resolve(&from)?, &resolve(&to)?).await?;
                Value::Bool(true)
            }
            (VfsOp::Move, FsCall::Transfer { from, to }) => {
                transports.rename(&cx, &resolve(&from)?, &resolve(&to)?).await?;
                Value::Bool(true)
            }
            (VfsOp::Upload, FsCall::Upload { dir, file }) => {
                json!(transports.upload(&cx, &resolve(&dir)?, file).await?)
            }
            (VfsOp::Find, FsCall::Find { path, query }) => {
                json!(transports.find(&cx, &resolve(&path)?, &query).await?)
            }
            (op, call) => {
                return Err(CoreError::backend(format!("{} cannot take {:?}", op, call)));
            }
        };
        Ok(Response::ok(result))
    }

    async fn package(&self, lifecycle: &mut Lifecycle, ctx: &RequestContext, path: &str) -> Response {
        lifecycle.advance(RequestState::Authorizing);
        if let Err(err) = authorize(ctx, &AuthRequest::Package { path }).await {
            return lifecycle.reject(&err);
        }

        lifecycle.advance(RequestState::Dispatching);
        let asset = format!("/{}/{}", PACKAGES_NAMESPACE, path);
        let response = self.serve_static(&asset).await;
        lifecycle.respond(Ok(response))
    }

    async fn serve_static(&self, path: &str) -> Response {
        match static_files::load(&self.instance.config.dist_dir, path).await {
            Some(file) => Response::Raw {
                mime: file.mime,
                data: file.data,
            },
            None => Response::NotFound,
        }
    }
}
