//! In-memory session table.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::expiry_after;
use crate::error::Result;
use crate::id::generate_session_id;
use crate::session::Session;

/// Concurrent mapping from session ID to session.
///
/// A single mutex covers every read-modify-write sequence. No operation
/// performs I/O while holding it; callers forward store side effects after
/// the call returns.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Whether `id` is present.
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.lock().contains_key(id)
    }

    /// All session IDs currently held.
    pub fn ids(&self) -> Vec<String> {
        self.sessions.lock().keys().cloned().collect()
    }

    /// Create and insert a new session named `name` living for `ttl`.
    ///
    /// The returned instance is the only one marked new.
    pub fn create(&self, name: &str, ttl: Duration) -> Result<Session> {
        let id = generate_session_id()?;

        let mut sessions = self.sessions.lock();
        let session = Session::created(id, name, expiry_after(Utc::now(), ttl));
        sessions.insert(session.id().to_string(), session.stored());

        debug!(
            session_id = %session.id(),
            name = %name,
            table_size = sessions.len(),
            "Session created"
        );

        Ok(session)
    }

    /// Look up a session by ID.
    pub fn lookup(&self, id: &str) -> Option<Session> {
        let session = self.sessions.lock().get(id).cloned();
        trace!(session_id = %id, hit = session.is_some(), "Session table lookup");
        session
    }

    /// Insert a session loaded from the store unless one already exists.
    ///
    /// Returns whichever session the table holds afterwards, so a
    /// concurrent in-memory entry always wins over the store copy.
    pub fn insert_if_absent(&self, session: Session) -> Session {
        let mut sessions = self.sessions.lock();
        sessions
            .entry(session.id().to_string())
            .or_insert_with(|| session.stored())
            .clone()
    }

    /// Write a saved session back into the table.
    pub fn commit(&self, session: &Session) {
        let mut sessions = self.sessions.lock();
        sessions.insert(session.id().to_string(), session.stored());
        trace!(session_id = %session.id(), "Session committed");
    }

    /// Remove a session. Removing an absent ID is a no-op.
    pub fn remove(&self, id: &str) -> Option<Session> {
        let removed = self.sessions.lock().remove(id);
        if removed.is_some() {
            debug!(session_id = %id, "Session removed from table");
        }
        removed
    }

    /// Remove every session that expired before `now`, returning their IDs.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut sessions = self.sessions.lock();
        let mut expired = Vec::new();

        sessions.retain(|id, session| {
            if session.is_expired_at(now) {
                expired.push(id.clone());
                false
            } else {
                true
            }
        });

        if !expired.is_empty() {
            debug!(
                count = expired.len(),
                remaining = sessions.len(),
                "Swept expired sessions"
            );
        }

        expired
    }
}
