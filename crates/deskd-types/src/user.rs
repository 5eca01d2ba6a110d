//! The authenticated caller.
//!
//! A `User` is what an authenticator hands back from a successful login and
//! what the session stores under the `"user"` key. Group membership drives
//! every group-gated authorization check.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Group that satisfies every group requirement.
pub const ADMIN_GROUP: &str = "admin";

/// Capability group required for any VFS operation.
pub const FS_GROUP: &str = "fs";

/// An authenticated caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Login name, also used as the storage key for settings/blacklists.
    pub username: String,
    pub display_name: String,
    #[serde(default)]
    pub groups: BTreeSet<String>,
}

impl User {
    /// Create a user with a deterministic id and no groups.
    pub fn new(username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            id: UserId::for_username(&username),
            display_name: username.clone(),
            username,
            groups: BTreeSet::new(),
        }
    }

    /// Builder: add groups.
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }

    /// Builder: set the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn is_admin(&self) -> bool {
        self.groups.contains(ADMIN_GROUP)
    }

    /// True if the user belongs to every group in `required`.
    ///
    /// Admins satisfy any requirement. An empty requirement is always met.
    pub fn has_groups<S: AsRef<str>>(&self, required: &[S]) -> bool {
        self.is_admin() || required.iter().all(|g| self.groups.contains(g.as_ref()))
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.username)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_satisfies_everything() {
        let admin = User::new("root").with_groups([ADMIN_GROUP]);
        assert!(admin.has_groups(&["fs", "curl", "anything"]));
    }

    #[test]
    fn test_requires_every_group() {
        let user = User::new("amy").with_groups(["fs", "curl"]);
        assert!(user.has_groups(&["fs"]));
        assert!(user.has_groups(&["fs", "curl"]));
        assert!(!user.has_groups(&["fs", "upload"]));
    }

    #[test]
    fn test_empty_requirement() {
        let user = User::new("guest");
        let none: [&str; 0] = [];
        assert!(user.has_groups(&none));
        assert!(!user.is_admin());
    }

    #[test]
    fn test_json_roundtrip() {
        let user = User::new("amy")
            .with_display_name("Amy")
            .with_groups(["fs"]);
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["username"], "amy");
        let parsed: User = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, user);
    }

    #[test]
    fn test_groups_default_when_missing() {
        let json = serde_json::json!({
            "id": UserId::for_username("x"),
            "username": "x",
            "display_name": "x",
        });
        let user: User = serde_json::from_value(json).unwrap();
        assert!(user.groups.is_empty());
    }
}
