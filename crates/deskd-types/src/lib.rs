//! Shared identity types for deskd.
//!
//! This crate has **no internal deskd dependencies**. It holds the
//! vocabulary every other crate agrees on: who the caller is ([`User`]),
//! which groups they belong to, and how their session is addressed
//! ([`SessionId`]).
//!
//! |----------------|-----------------------------------------------|
//! | Type           | Purpose                                       |
//! |----------------|-----------------------------------------------|
//! | [`User`]       | Authenticated caller (id + name + groups)     |
//! | [`UserId`]     | Stable per-username identifier                |
//! | [`SessionId`]  | Opaque session token carried in a cookie      |
//! |----------------|-----------------------------------------------|

pub mod ids;
pub mod user;

pub use ids::{SessionId, UserId};
pub use user::{ADMIN_GROUP, FS_GROUP, User};

/// Current time as Unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
