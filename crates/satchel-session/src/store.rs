//! Durable store contract for mirroring sessions.
//!
//! The manager keeps every live session in memory and mirrors saves and
//! deletions to a [`SessionStore`] in the background. The store is only
//! consulted on a table miss, so it never overrides in-memory state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::session::Session;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A record matched on save but nothing changed.
    #[error("Session matched but was not modified: {0}")]
    NotModified(String),

    /// Backend-specific failure.
    #[error("Store backend error: {0}")]
    Backend(String),

    /// Encoding or decoding a record failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// What a successful save did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// No record existed; one was inserted.
    Inserted,
    /// An existing record's values and expiry were updated.
    Updated,
}

/// Trait for durable session backends.
///
/// Implementations must keep "not found" (`Ok(None)` from `read`) distinct
/// from transport failures (`Err`), and must report a save that matched a
/// record without changing it as [`StoreError::NotModified`].
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Insert the session if absent, otherwise update its values and expiry.
    async fn save(&self, session: &Session) -> StoreResult<SaveOutcome>;

    /// Read a session by ID. `Ok(None)` if no record exists.
    async fn read(&self, id: &str) -> StoreResult<Option<Session>>;

    /// Delete a session by ID. Deleting a missing record succeeds.
    async fn delete(&self, id: &str) -> StoreResult<()>;
}

#[async_trait]
impl<S: SessionStore + ?Sized> SessionStore for Arc<S> {
    async fn save(&self, session: &Session) -> StoreResult<SaveOutcome> {
        (**self).save(session).await
    }

    async fn read(&self, id: &str) -> StoreResult<Option<Session>> {
        (**self).read(id).await
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        (**self).delete(id).await
    }
}

/// In-process store holding JSON-encoded records.
///
/// Records go through the same serialize/deserialize round trip as a real
/// backend would, so reads return detached copies.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Whether a record exists for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.records.lock().contains_key(id)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn save(&self, session: &Session) -> StoreResult<SaveOutcome> {
        let mut records = self.records.lock();

        let Some(existing) = records.get(session.id()) else {
            let encoded = serde_json::to_vec(&session.stored())?;
            records.insert(session.id().to_string(), encoded);
            return Ok(SaveOutcome::Inserted);
        };

        let existing: Session = serde_json::from_slice(existing)?;
        if existing.values() == session.values() && existing.expires() == session.expires() {
            return Err(StoreError::NotModified(session.id().to_string()));
        }

        // Only values and expiry are updated; the stored name is kept.
        let updated = Session::from_parts(
            existing.id(),
            existing.name(),
            session.values().clone(),
            session.expires(),
        );
        records.insert(session.id().to_string(), serde_json::to_vec(&updated)?);
        Ok(SaveOutcome::Updated)
    }

    async fn read(&self, id: &str) -> StoreResult<Option<Session>> {
        let records = self.records.lock();
        records
            .get(id)
            .map(|bytes| serde_json::from_slice(bytes).map_err(StoreError::from))
            .transpose()
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.records.lock().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn session(id: &str) -> Session {
        Session::from_parts(id, "session", HashMap::new(), Utc::now() + Duration::minutes(5))
    }

    #[tokio::test]
    async fn test_insert_then_update() {
        let store = MemoryStore::new();
        let mut s = session("a");

        assert_eq!(store.save(&s).await.unwrap(), SaveOutcome::Inserted);

        s.set("counter", 1).unwrap();
        assert_eq!(store.save(&s).await.unwrap(), SaveOutcome::Updated);

        let read = store.read("a").await.unwrap().unwrap();
        assert_eq!(read.decode::<i32>("counter").unwrap(), 1);
        assert!(!read.is_new());
    }

    #[tokio::test]
    async fn test_unchanged_save_is_not_modified() {
        let store = MemoryStore::new();
        let s = session("a");

        store.save(&s).await.unwrap();
        let err = store.save(&s).await.unwrap_err();
        assert!(matches!(err, StoreError::NotModified(id) if id == "a"));
    }

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let store = MemoryStore::new();
        assert!(store.read("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        store.save(&session("a")).await.unwrap();
        assert!(store.contains("a"));

        store.delete("a").await.unwrap();
        assert!(!store.contains("a"));

        // Deleting again is fine.
        store.delete("a").await.unwrap();
    }

    #[tokio::test]
    async fn test_arc_store_delegates() {
        let store = Arc::new(MemoryStore::new());
        let shared: Arc<dyn SessionStore> = Arc::new(Arc::clone(&store));

        shared.save(&session("a")).await.unwrap();
        assert!(store.contains("a"));
    }
}
