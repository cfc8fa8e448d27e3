//! Live directory of reachable users.
//!
//! All access goes through [`ConnectionRegistry`]; the map and its lock are
//! private. The lock is never held across an `.await`: callers receive
//! `Arc<Session>` clones and do their I/O after the guard is dropped.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use courier_core::UserId;
use parking_lot::Mutex;

use crate::session::Session;

/// `UserId` → active [`Session`], at most one per user.
#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: Mutex<HashMap<UserId, Arc<Session>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `session` under its user, returning the session that lost the slot.
    ///
    /// The newest session wins: if the current entry was created after
    /// `session`, the entry is kept and `session` itself is returned. The
    /// caller is expected to close whatever comes back.
    pub fn register(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.lock();
        let current = sessions
            .get(session.user())
            .map(|current| current.id().cmp(session.id()));
        match current {
            Some(Ordering::Equal) => None,
            Some(Ordering::Greater) => Some(session),
            Some(Ordering::Less) | None => sessions.insert(session.user().clone(), session),
        }
    }

    /// Remove `user`'s entry only if it still refers to `session`.
    ///
    /// Returns `false` when a newer session has taken the slot.
    pub fn unregister(&self, user: &UserId, session: &Session) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get(user) {
            Some(current) if current.id() == session.id() => {
                let _ = sessions.remove(user);
                true
            }
            _ => false,
        }
    }

    /// The active session for `user`, if any.
    pub fn lookup(&self, user: &UserId) -> Option<Arc<Session>> {
        self.sessions.lock().get(user).cloned()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
