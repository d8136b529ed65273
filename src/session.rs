//! Session store keyed by the session cookie
//!
//! The store is the only per-client mutable state shared between requests.
//! Writes are last-writer-wins.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::auth::User;

/// Data bound to one session id
#[derive(Debug, Clone)]
struct SessionEntry {
    username: Option<String>,
    user_id: Option<u64>,
    last_seen: Instant,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            username: None,
            user_id: None,
            last_seen: Instant::now(),
        }
    }
}

/// Process-wide session store
#[derive(Clone)]
pub struct SessionStore {
    entries: Arc<DashMap<String, SessionEntry>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Look up a live session, or create a new one.
    ///
    /// Returns the session and whether it was created by this call.
    pub fn get_or_create(&self, sid: Option<&str>) -> (Session, bool) {
        if let Some(sid) = sid {
            if let Some(session) = self.get(sid) {
                session.touch();
                return (session, false);
            }
        }
        (self.create(), true)
    }

    /// Look up a live session by id
    pub fn get(&self, sid: &str) -> Option<Session> {
        let expired = {
            let entry = self.entries.get(sid)?;
            entry.last_seen.elapsed() > self.ttl
        };

        if expired {
            debug!("session {} expired", sid);
            self.entries.remove(sid);
            return None;
        }

        Some(Session {
            sid: sid.to_string(),
            store: self.clone(),
        })
    }

    /// Create and save a fresh (unauthenticated) session
    pub fn create(&self) -> Session {
        let sid = Uuid::new_v4().to_string();
        self.entries.insert(sid.clone(), SessionEntry::new());
        Session {
            sid,
            store: self.clone(),
        }
    }

    /// Drop every session idle longer than the ttl
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.last_seen.elapsed() <= ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

/// Handle to one session in a store
#[derive(Clone)]
pub struct Session {
    sid: String,
    store: SessionStore,
}

impl Session {
    /// A session that lives in its own private store, bound to `username`.
    ///
    /// Used for server-side requests that act on behalf of a user.
    pub fn detached(username: Option<&str>) -> Self {
        let store = SessionStore::new(Duration::MAX);
        let session = store.create();
        if let Some(mut entry) = store.entries.get_mut(&session.sid) {
            entry.username = username.map(str::to_string);
        }
        session
    }

    pub fn id(&self) -> &str {
        &self.sid
    }

    pub fn username(&self) -> Option<String> {
        self.store
            .entries
            .get(&self.sid)
            .and_then(|e| e.username.clone())
    }

    pub fn user_id(&self) -> Option<u64> {
        self.store.entries.get(&self.sid).and_then(|e| e.user_id)
    }

    /// Bind a user to the session, or clear it with `None`
    pub fn set_user(&self, user: Option<&User>) {
        let mut entry = self
            .store
            .entries
            .entry(self.sid.clone())
            .or_insert_with(SessionEntry::new);
        entry.username = user.map(|u| u.username.clone());
        entry.user_id = user.map(|u| u.id);
        entry.last_seen = Instant::now();
    }

    pub fn touch(&self) {
        if let Some(mut entry) = self.store.entries.get_mut(&self.sid) {
            entry.last_seen = Instant::now();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("sid", &self.sid)
            .field("username", &self.username())
            .finish()
    }
}
