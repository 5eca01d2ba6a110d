//! Session state.
//!
//! Sessions are per-caller key/value maps addressed by [`SessionId`]. The
//! authenticator reads and writes them; the authorization pipeline only
//! asks whether one holds a user.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::debug;

use deskd_types::{now_millis, SessionId, User};

/// Session key holding the logged-in [`User`].
pub const USER_KEY: &str = "user";

#[derive(Debug, Clone, Default)]
struct SessionData {
    values: Map<String, Value>,
    touched: u64,
}

/// All live sessions.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<SessionId, SessionData>,
    max_idle: Duration,
}

impl SessionStore {
    /// Default idle timeout: one day.
    pub const DEFAULT_MAX_IDLE: Duration = Duration::from_secs(24 * 60 * 60);

    pub fn new(max_idle: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            max_idle,
        }
    }

    /// Return a live session for `id`, or a fresh one when `id` is missing,
    /// unknown or expired. The returned flag is true for fresh sessions.
    ///
    /// A fresh session is not stored until something is written to it, so
    /// anonymous requests leave the store untouched.
    pub fn open(self: &Arc<Self>, id: Option<SessionId>) -> (Session, bool) {
        let now = now_millis();
        if let Some(id) = id {
            if let Some(mut data) = self.sessions.get_mut(&id) {
                if !self.is_expired(&data, now) {
                    data.touched = now;
                    return (Session::new(self.clone(), id), false);
                }
            }
            self.sessions.remove(&id);
        }

        (Session::new(self.clone(), SessionId::new()), true)
    }

    /// Drop sessions idle for longer than the timeout. Returns how many.
    pub fn evict_idle(&self) -> usize {
        let now = now_millis();
        let before = self.sessions.len();
        self.sessions.retain(|_, data| !self.is_expired(data, now));
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            debug!(evicted, "evicted idle sessions");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn is_expired(&self, data: &SessionData, now: u64) -> bool {
        now.saturating_sub(data.touched) > self.max_idle.as_millis() as u64
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_IDLE)
    }
}

/// Handle to one caller's session.
#[derive(Clone)]
pub struct Session {
    store: Arc<SessionStore>,
    id: SessionId,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}

impl Session {
    fn new(store: Arc<SessionStore>, id: SessionId) -> Self {
        Self { store, id }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.store
            .sessions
            .get(&self.id)
            .and_then(|data| data.values.get(key).cloned())
    }

    /// Store a value, persisting the session on its first write.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let mut data = self.store.sessions.entry(self.id).or_insert_with(|| {
            debug!(session = %self.id.short(), "session created");
            SessionData {
                values: Map::new(),
                touched: now_millis(),
            }
        });
        data.values.insert(key.into(), value);
    }

    /// True once the session has been written and lives in the store.
    pub fn is_stored(&self) -> bool {
        self.store.sessions.contains_key(&self.id)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.store
            .sessions
            .get_mut(&self.id)
            .and_then(|mut data| data.values.remove(key))
    }

    pub fn clear(&self) {
        if let Some(mut data) = self.store.sessions.get_mut(&self.id) {
            data.values.clear();
        }
    }

    /// The logged-in user, if any.
    pub fn user(&self) -> Option<User> {
        self.get(USER_KEY)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Store the logged-in user.
    pub fn set_user(&self, user: &User) {
        if let Ok(value) = serde_json::to_value(user) {
            self.set(USER_KEY, value);
        }
    }
}
