//! Authorization pipeline integration tests.
//!
//! A spy transport and a spy storage count every call they receive, so the
//! tests can prove that a rejected request never reached a backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use http::{Method, StatusCode};
use serde_json::Value;

use deskd_kernel::auth::{authorize, AuthRequest, Authenticator, Credentials};
use deskd_kernel::storage::{Storage, StorageResult};
use deskd_kernel::vfs::{FileInfo, MemoryTransport, OpContext, Transport, UploadFile, VfsOp, VfsResult};
use deskd_kernel::{
    load, CoreError, CoreResult, DeskConfig, Instance, ModuleRegistry, MountConfig, RequestContext,
};
use deskd_types::{User, ADMIN_GROUP, FS_GROUP};

// ============================================================================
// Spies
// ============================================================================

/// Memory transport that counts calls.
struct SpyTransport {
    inner: MemoryTransport,
    calls: Arc<AtomicUsize>,
}

impl SpyTransport {
    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for SpyTransport {
    fn name(&self) -> &str {
        "spy"
    }
    fn protocols(&self) -> &[String] {
        self.inner.protocols()
    }
    async fn exists(&self, cx: &OpContext, path: &str) -> VfsResult<bool> {
        self.hit();
        self.inner.exists(cx, path).await
    }
    async fn read(&self, cx: &OpContext, path: &str) -> VfsResult<Vec<u8>> {
        self.hit();
        self.inner.read(cx, path).await
    }
    async fn scandir(&self, cx: &OpContext, path: &str) -> VfsResult<Vec<FileInfo>> {
        self.hit();
        self.inner.scandir(cx, path).await
    }
    async fn fileinfo(&self, cx: &OpContext, path: &str) -> VfsResult<FileInfo> {
        self.hit();
        self.inner.fileinfo(cx, path).await
    }
    async fn write(&self, cx: &OpContext, path: &str, data: &[u8]) -> VfsResult<()> {
        self.hit();
        self.inner.write(cx, path, data).await
    }
    async fn mkdir(&self, cx: &OpContext, path: &str) -> VfsResult<()> {
        self.hit();
        self.inner.mkdir(cx, path).await
    }
    async fn rename(&self, cx: &OpContext, from: &str, to: &str) -> VfsResult<()> {
        self.hit();
        self.inner.rename(cx, from, to).await
    }
    async fn copy(&self, cx: &OpContext, from: &str, to: &str) -> VfsResult<()> {
        self.hit();
        self.inner.copy(cx, from, to).await
    }
    async fn delete(&self, cx: &OpContext, path: &str) -> VfsResult<()> {
        self.hit();
        self.inner.delete(cx, path).await
    }
    async fn upload(&self, cx: &OpContext, dir: &str, file: UploadFile) -> VfsResult<FileInfo> {
        self.hit();
        self.inner.upload(cx, dir, file).await
    }
}

/// Storage with a fixed blacklist that counts calls.
#[derive(Default)]
struct SpyStorage {
    blacklist: Vec<String>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Storage for SpyStorage {
    fn name(&self) -> &str {
        "spy"
    }
    async fn get_blacklist(&self, _username: &str) -> StorageResult<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.blacklist.clone())
    }
    async fn set_blacklist(&self, _username: &str, _list: Vec<String>) -> StorageResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    async fn get_settings(&self, _username: &str) -> StorageResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Object(Default::default()))
    }
    async fn set_settings(&self, _username: &str, _settings: Value) -> StorageResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Demo login, but refuses every request touching `secret://`.
struct VetoAuthenticator;

#[async_trait]
impl Authenticator for VetoAuthenticator {
    fn name(&self) -> &str {
        "veto"
    }

    async fn check_permission(&self, _ctx: &RequestContext, request: &AuthRequest<'_>) -> CoreResult<()> {
        match request {
            AuthRequest::Fs { paths, .. } if paths.iter().any(|p| p.starts_with("secret://")) => {
                Err(CoreError::access_denied("vetoed"))
            }
            _ => Ok(()),
        }
    }

    async fn login(&self, _ctx: &RequestContext, credentials: &Credentials) -> CoreResult<User> {
        Ok(User::new(&credentials.username))
    }
}

// ============================================================================
// Shared test setup
// ============================================================================

struct Harness {
    instance: Arc<Instance>,
    transport_calls: Arc<AtomicUsize>,
    storage_calls: Arc<AtomicUsize>,
}

impl Harness {
    async fn new() -> Self {
        Self::with_authenticator("demo").await
    }

    async fn with_authenticator(name: &str) -> Self {
        let transport_calls = Arc::new(AtomicUsize::new(0));
        let storage_calls = Arc::new(AtomicUsize::new(0));

        let mut modules = ModuleRegistry::with_defaults();
        let calls = transport_calls.clone();
        modules.transport("spy", move |mount| {
            Ok(Arc::new(SpyTransport {
                inner: MemoryTransport::new(&mount.protocol),
                calls: calls.clone(),
            }))
        });
        let calls = storage_calls.clone();
        modules.storage("spy", move |_| {
            Ok(Arc::new(SpyStorage {
                blacklist: vec!["default/Draw".to_string()],
                calls: calls.clone(),
            }))
        });
        modules.authenticator("veto", |_| Ok(Arc::new(VetoAuthenticator)));

        let mut config = DeskConfig::default();
        config.authenticator.name = name.to_string();
        config.storage.name = "spy".to_string();
        config.api_groups = HashMap::from([("curl".to_string(), vec!["network".to_string()])]);
        config.mounts = vec![
            MountConfig::new("home", "spy"),
            MountConfig {
                read_only: true,
                ..MountConfig::new("apps", "spy")
            },
            MountConfig {
                enabled: false,
                ..MountConfig::new("old", "spy")
            },
            MountConfig {
                groups: vec!["shared".to_string()],
                ..MountConfig::new("shared", "spy")
            },
            MountConfig {
                read_only: true,
                groups: vec!["shared".to_string()],
                ..MountConfig::new("archive", "spy")
            },
            MountConfig::new("secret", "spy"),
        ];

        let instance = load(config, &modules).await.unwrap();
        Self {
            instance,
            transport_calls,
            storage_calls,
        }
    }

    /// Context with no logged-in user.
    fn anonymous(&self) -> RequestContext {
        let (session, _) = self.instance.sessions.open(None);
        RequestContext::new(1, Method::POST, "/", session, self.instance.clone())
    }

    /// Context for a user in `groups`.
    fn as_user(&self, groups: &[&str]) -> RequestContext {
        let ctx = self.anonymous();
        ctx.session
            .set_user(&User::new("amy").with_groups(groups.iter().copied()));
        ctx
    }

    fn transport_calls(&self) -> usize {
        self.transport_calls.load(Ordering::SeqCst)
    }

    fn storage_calls(&self) -> usize {
        self.storage_calls.load(Ordering::SeqCst)
    }
}

fn fs<'a>(op: VfsOp, paths: &'a [String]) -> AuthRequest<'a> {
    AuthRequest::Fs { op, paths }
}

fn paths(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Stage 1: session
// ============================================================================

#[tokio::test]
async fn test_no_session_rejects_every_kind_without_side_effects() {
    let h = Harness::new().await;
    let ctx = h.anonymous();
    let p = paths(&["home:///a.txt"]);

    for request in [
        fs(VfsOp::Read, &p),
        fs(VfsOp::Write, &p),
        AuthRequest::Api { method: "settings" },
        AuthRequest::Package { path: "default/Settings" },
    ] {
        let err = authorize(&ctx, &request).await.unwrap_err();
        assert!(matches!(err, CoreError::NoSession), "{} gave {:?}", request, err);
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    assert_eq!(h.transport_calls(), 0);
    assert_eq!(h.storage_calls(), 0);
}

#[tokio::test]
async fn test_login_skips_session_check() {
    let h = Harness::new().await;
    let ctx = h.anonymous();
    authorize(&ctx, &AuthRequest::Api { method: "login" })
        .await
        .unwrap();
}

// ============================================================================
// Stage 2: groups
// ============================================================================

#[tokio::test]
async fn test_fs_requires_fs_group() {
    let h = Harness::new().await;
    let p = paths(&["home:///a.txt"]);

    let err = authorize(&h.as_user(&[]), &fs(VfsOp::Read, &p))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AccessDenied(_)));

    authorize(&h.as_user(&[FS_GROUP]), &fs(VfsOp::Read, &p))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_api_method_groups() {
    let h = Harness::new().await;

    // Not in the table: unrestricted.
    authorize(&h.as_user(&[]), &AuthRequest::Api { method: "packages" })
        .await
        .unwrap();

    let err = authorize(&h.as_user(&[FS_GROUP]), &AuthRequest::Api { method: "curl" })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AccessDenied(_)));

    authorize(&h.as_user(&["network"]), &AuthRequest::Api { method: "curl" })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_admin_passes_every_group_check() {
    let h = Harness::new().await;
    let admin = h.as_user(&[ADMIN_GROUP]);

    authorize(&admin, &AuthRequest::Api { method: "curl" })
        .await
        .unwrap();
    authorize(&admin, &fs(VfsOp::Write, &paths(&["shared:///x"])))
        .await
        .unwrap();
    authorize(&admin, &fs(VfsOp::Read, &paths(&["archive:///x"])))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_authenticator_veto_runs_after_groups() {
    let h = Harness::with_authenticator("veto").await;
    let err = authorize(&h.as_user(&[ADMIN_GROUP]), &fs(VfsOp::Read, &paths(&["secret:///k"])))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AccessDenied(ref m) if m == "vetoed"));

    // A group failure wins over the veto.
    let err = authorize(&h.as_user(&[]), &fs(VfsOp::Read, &paths(&["secret:///k"])))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AccessDenied(ref m) if m != "vetoed"));
}

// ============================================================================
// Stage 3: mounts
// ============================================================================

#[tokio::test]
async fn test_read_only_mount_refuses_every_mutation() {
    let h = Harness::new().await;
    let admin = h.as_user(&[ADMIN_GROUP]);

    for op in VfsOp::MUTATING {
        let p = paths(&["apps:///x"]);
        let err = authorize(&admin, &fs(op, &p)).await.unwrap_err();
        assert!(matches!(err, CoreError::AccessDenied(_)), "{} allowed", op);
    }

    // Copying out of a read-only mount still names it as a path.
    let p = paths(&["apps:///x", "home:///x"]);
    assert!(authorize(&admin, &fs(VfsOp::Copy, &p)).await.is_err());

    for op in [VfsOp::Read, VfsOp::Exists, VfsOp::Scandir, VfsOp::Fileinfo, VfsOp::Find] {
        let p = paths(&["apps:///x"]);
        authorize(&admin, &fs(op, &p)).await.unwrap();
    }
    assert_eq!(h.transport_calls(), 0);
}

#[tokio::test]
async fn test_mount_groups() {
    let h = Harness::new().await;
    let p = paths(&["shared:///doc"]);

    let err = authorize(&h.as_user(&[FS_GROUP]), &fs(VfsOp::Read, &p))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AccessDenied(_)));

    authorize(&h.as_user(&[FS_GROUP, "shared"]), &fs(VfsOp::Read, &p))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_read_only_checked_before_mount_groups() {
    let h = Harness::new().await;
    let err = authorize(&h.as_user(&[FS_GROUP]), &fs(VfsOp::Write, &paths(&["archive:///x"])))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AccessDenied(ref m) if m.contains("read-only")));
}

#[tokio::test]
async fn test_disabled_and_unknown_mounts() {
    let h = Harness::new().await;
    let user = h.as_user(&[ADMIN_GROUP]);

    let err = authorize(&user, &fs(VfsOp::Read, &paths(&["old:///x"])))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AccessDenied(ref m) if m.contains("disabled")));

    let err = authorize(&user, &fs(VfsOp::Read, &paths(&["ftp:///x"])))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::UnknownProtocol(_)));
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_bare_path_uses_default_mount() {
    let h = Harness::new().await;
    // `home` is writable, so a bare path must not be treated as `apps`.
    authorize(&h.as_user(&[FS_GROUP]), &fs(VfsOp::Write, &paths(&["/a.txt"])))
        .await
        .unwrap();
}

// ============================================================================
// Stage 4: blacklist
// ============================================================================

#[tokio::test]
async fn test_blacklisted_package_denied() {
    let h = Harness::new().await;
    let user = h.as_user(&[ADMIN_GROUP]);

    let err = authorize(&user, &AuthRequest::Package { path: "default/Draw/main.js" })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AccessDenied(_)));

    authorize(&user, &AuthRequest::Package { path: "default/Settings" })
        .await
        .unwrap();
    assert_eq!(h.storage_calls(), 2);
}

#[tokio::test]
async fn test_blacklist_only_consulted_for_packages() {
    let h = Harness::new().await;
    let user = h.as_user(&[ADMIN_GROUP]);
    authorize(&user, &fs(VfsOp::Read, &paths(&["home:///a"])))
        .await
        .unwrap();
    authorize(&user, &AuthRequest::Api { method: "packages" })
        .await
        .unwrap();
    assert_eq!(h.storage_calls(), 0);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_do_not_interfere() {
    let h = Harness::new().await;
    let mut tasks = Vec::new();
    for i in 0..64 {
        let ctx = if i % 2 == 0 {
            h.as_user(&[FS_GROUP])
        } else {
            h.anonymous()
        };
        tasks.push(tokio::spawn(async move {
            let p = vec!["home:///a".to_string()];
            authorize(&ctx, &AuthRequest::Fs { op: VfsOp::Read, paths: &p })
                .await
                .is_ok()
        }));
    }

    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap(), i % 2 == 0);
    }
}
