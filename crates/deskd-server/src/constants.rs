//! Server constants.
//!
//! Centralizes route prefixes and limits.

/// Namespace segment for VFS calls: `/FS/<op>`.
pub const FS_NAMESPACE: &str = "FS";

/// Sub-route of the VFS namespace that reads the rest of the path:
/// `/FS/get/<virtual path>`.
pub const FS_GET: &str = "get";

/// Namespace segment for API calls: `/API/<method>`.
pub const API_NAMESPACE: &str = "API";

/// Namespace segment for gated package assets:
/// `/packages/<repository>/<name>/<file>`.
pub const PACKAGES_NAMESPACE: &str = "packages";

/// File served for `GET /`.
pub const INDEX_FILE: &str = "index.html";

/// Largest accepted request body (uploads travel base64-encoded).
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Session cookie attributes appended after `name=value`.
pub const COOKIE_ATTRIBUTES: &str = "Path=/; HttpOnly; SameSite=Lax";

/// Evict idle sessions once every this many requests.
pub const SESSION_SWEEP_INTERVAL: u64 = 256;
