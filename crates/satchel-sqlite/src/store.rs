use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use satchel_session::{SaveOutcome, Session, SessionStore, StoreError, StoreResult};
use tracing::{debug, trace};

use crate::{Result, SqliteError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id      TEXT PRIMARY KEY,
    name    TEXT NOT NULL,
    data    TEXT NOT NULL,
    expires TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires);
";

/// Session store over a single SQLite database.
///
/// Thread-safe via an internal `Mutex<Connection>`. Every async operation
/// runs on the blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        debug!(path = %path.display(), "Opened session database");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Number of stored records.
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Delete every record that expired before `now`, returning how many.
    ///
    /// The manager's sweeper only evicts sessions it holds in memory; this
    /// catches records left behind by earlier processes.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let removed = self.conn.lock().execute(
            "DELETE FROM sessions WHERE expires < ?1",
            params![format_dt(now)],
        )?;
        if removed > 0 {
            debug!(removed, "Purged expired session records");
        }
        Ok(removed)
    }

    fn save_blocking(&self, session: &Session) -> Result<SaveOutcome> {
        let expires = format_dt(session.expires());
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let existing = tx
            .query_row(
                "SELECT data, expires FROM sessions WHERE id = ?1",
                params![session.id()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        let outcome = match existing {
            None => {
                tx.execute(
                    "INSERT INTO sessions (id, name, data, expires)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        session.id(),
                        session.name(),
                        serde_json::to_string(session.values())?,
                        expires
                    ],
                )?;
                SaveOutcome::Inserted
            }
            Some((data, stored_expires)) => {
                let stored: HashMap<String, serde_json::Value> = serde_json::from_str(&data)?;
                if &stored == session.values() && stored_expires == expires {
                    return Err(SqliteError::NotModified(session.id().to_string()));
                }

                tx.execute(
                    "UPDATE sessions SET data = ?2, expires = ?3 WHERE id = ?1",
                    params![session.id(), serde_json::to_string(session.values())?, expires],
                )?;
                SaveOutcome::Updated
            }
        };

        tx.commit()?;
        trace!(session_id = %session.id(), ?outcome, "Session record written");
        Ok(outcome)
    }

    fn read_blocking(&self, id: &str) -> Result<Option<Session>> {
        let row = self
            .conn
            .lock()
            .query_row(
                "SELECT name, data, expires FROM sessions WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((name, data, expires)) = row else {
            return Ok(None);
        };

        let values = serde_json::from_str(&data)?;
        let expires = parse_dt(&expires).ok_or_else(|| SqliteError::Corrupt {
            id: id.to_string(),
            reason: format!("invalid expiry timestamp {expires:?}"),
        })?;

        Ok(Some(Session::from_parts(id, name, values, expires)))
    }

    fn delete_blocking(&self, id: &str) -> Result<()> {
        self.conn
            .lock()
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(())
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteStore) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store)).await?
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn save(&self, session: &Session) -> StoreResult<SaveOutcome> {
        let session = session.clone();
        self.blocking(move |store| store.save_blocking(&session))
            .await
            .map_err(StoreError::from)
    }

    async fn read(&self, id: &str) -> StoreResult<Option<Session>> {
        let id = id.to_string();
        self.blocking(move |store| store.read_blocking(&id))
            .await
            .map_err(StoreError::from)
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.blocking(move |store| store.delete_blocking(&id))
            .await
            .map_err(StoreError::from)
    }
}

/// Fixed-width UTC timestamps so text comparison orders them correctly.
fn format_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_dt(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
