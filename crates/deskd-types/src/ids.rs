//! Typed identifiers for users and sessions.
//!
//! `SessionId` wraps a random UUIDv4: it travels in a cookie, so it must not
//! be guessable. `UserId` is derived deterministically from the username
//! (UUIDv5) so that authenticators without a user database still hand out
//! stable ids.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A session identifier (UUIDv4).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(uuid::Uuid);

/// A user identifier (UUIDv5 of the username).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(uuid::Uuid);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// First 8 hex characters, for log lines only.
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }

            /// Full 32-character hex string (no hyphens).
            pub fn to_hex(&self) -> String {
                self.0.as_simple().to_string()
            }

            /// Parse from a hex string (32 chars, no hyphens) or standard UUID format.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                uuid::Uuid::parse_str(s).map(Self)
            }

            /// A nil / zero ID, for sentinel values only.
            pub fn nil() -> Self {
                Self(uuid::Uuid::nil())
            }

            /// Check if this is the nil ID.
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl From<uuid::Uuid> for $T {
            fn from(u: uuid::Uuid) -> Self {
                Self(u)
            }
        }

        impl From<$T> for uuid::Uuid {
            fn from(id: $T) -> uuid::Uuid {
                id.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_typed_id!(SessionId, "SessionId");
impl_typed_id!(UserId, "UserId");

impl SessionId {
    /// Create a fresh random session id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed namespace for deriving deterministic UserIds via UUIDv5.
const DESKD_USER_NS: uuid::Uuid = uuid::uuid!("3f6d2a4e-91c7-4b58-8e02-7d5a1c9b0f34");

impl UserId {
    /// Derive the id for a username. Same input, same id.
    pub fn for_username(username: &str) -> Self {
        Self(uuid::Uuid::new_v5(&DESKD_USER_NS, username.as_bytes()))
    }
}

// ============================================================================
// Tests
// ============================================================================
