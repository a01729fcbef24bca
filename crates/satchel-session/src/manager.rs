//! Session manager: identity resolution, saving and deletion.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::{SessionOptions, expiry_after};
use crate::cookie::{CookieSink, CookieSource, SessionCookie};
use crate::error::{Error, Result};
use crate::mirror::{MirrorJob, MirrorQueue, MirrorStats};
use crate::session::Session;
use crate::store::{SaveOutcome, SessionStore};
use crate::sweeper::Sweeper;
use crate::table::SessionTable;
use crate::value::Value;

struct ManagerInner {
    options: SessionOptions,
    table: Arc<SessionTable>,
    store: Option<Arc<dyn SessionStore>>,
    mirror: Option<MirrorQueue>,
    sweeper: Sweeper,
    sweeper_task: JoinHandle<()>,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        // Mirror workers drain what is queued and stop on their own once the
        // last queue handle goes away.
        self.sweeper_task.abort();
    }
}

/// Cookie-addressed session manager.
///
/// Owns the in-memory session table, the expiration sweeper and, when a
/// store is configured, the background mirror queue. Cloning is cheap and
/// every clone shares the same state. Several independent managers can
/// live in one process.
///
/// Must be constructed inside a tokio runtime: the sweeper and the mirror
/// workers are spawned immediately.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("options", &self.inner.options)
            .field("sessions", &self.inner.table.len())
            .field("store", &self.inner.store.is_some())
            .finish()
    }
}

impl SessionManager {
    /// Create a manager that keeps sessions in memory only.
    pub fn new(options: SessionOptions) -> Self {
        Self::build(options, None)
    }

    /// Create a manager that mirrors sessions to `store`.
    pub fn with_store<S: SessionStore>(options: SessionOptions, store: S) -> Self {
        Self::build(options, Some(Arc::new(store)))
    }

    /// Create a manager from an already shared store handle.
    pub fn with_shared_store(options: SessionOptions, store: Arc<dyn SessionStore>) -> Self {
        Self::build(options, Some(store))
    }

    fn build(options: SessionOptions, store: Option<Arc<dyn SessionStore>>) -> Self {
        let table = Arc::new(SessionTable::new());

        let mirror = store.as_ref().map(|store| {
            let (queue, _workers) = MirrorQueue::start(
                Arc::clone(store),
                options.mirror_capacity,
                options.mirror_workers,
            );
            queue
        });

        let sweeper = Sweeper::new(Arc::clone(&table), mirror.clone());
        let sweeper_task = sweeper.clone().spawn(options.effective_sweep_interval());

        debug!(
            max_age_secs = options.effective_max_age().as_secs(),
            store = store.is_some(),
            "Session manager started"
        );

        Self {
            inner: Arc::new(ManagerInner {
                options,
                table,
                store,
                mirror,
                sweeper,
                sweeper_task,
            }),
        }
    }

    /// The options this manager was built with.
    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    /// Whether a durable store is configured.
    pub fn has_store(&self) -> bool {
        self.inner.store.is_some()
    }

    /// Number of sessions held in memory.
    pub fn len(&self) -> usize {
        self.inner.table.len()
    }

    /// Whether no sessions are held in memory.
    pub fn is_empty(&self) -> bool {
        self.inner.table.is_empty()
    }

    /// Look up an in-memory session by ID without touching the store.
    pub fn lookup(&self, id: &str) -> Option<Session> {
        self.inner.table.lookup(id)
    }

    /// Resolve the session named `name` for a request.
    ///
    /// 1. No cookie: a new session is created and its cookie written.
    /// 2. Cookie present and the ID is in memory: that session is returned
    ///    as-is. Expiry is not re-checked here; the sweeper enforces it.
    /// 3. Cookie present but not in memory: the store (if any) is read.
    ///    A live record is adopted into the table; an expired one yields
    ///    [`Error::SessionExpired`] and is queued for deletion. A missing
    ///    record or a failed read falls through to creating a new session.
    pub async fn resolve<R, W>(&self, request: &R, response: &mut W, name: &str) -> Result<Session>
    where
        R: CookieSource + ?Sized,
        W: CookieSink + ?Sized,
    {
        self.resolve_for(request, response, name, self.inner.options.effective_max_age())
            .await
    }

    /// Like [`resolve`](Self::resolve), but a newly created session lives
    /// for `duration` instead of `max_age`. A zero duration means `max_age`.
    pub async fn resolve_with_duration<R, W>(
        &self,
        request: &R,
        response: &mut W,
        name: &str,
        duration: Duration,
    ) -> Result<Session>
    where
        R: CookieSource + ?Sized,
        W: CookieSink + ?Sized,
    {
        let ttl = if duration.is_zero() {
            self.inner.options.effective_max_age()
        } else {
            duration
        };
        self.resolve_for(request, response, name, ttl).await
    }

    async fn resolve_for<R, W>(
        &self,
        request: &R,
        response: &mut W,
        name: &str,
        ttl: Duration,
    ) -> Result<Session>
    where
        R: CookieSource + ?Sized,
        W: CookieSink + ?Sized,
    {
        let Some(id) = request.cookie(name).filter(|id| !id.is_empty()) else {
            return self.create(response, name, ttl);
        };

        if let Some(session) = self.inner.table.lookup(&id) {
            trace!(session_id = %id, name = %name, "Session resolved from table");
            return Ok(session);
        }

        if let Some(store) = &self.inner.store {
            match store.read(&id).await {
                Ok(Some(record)) => {
                    if record.is_expired_at(Utc::now()) {
                        debug!(session_id = %id, "Stored session has expired");
                        self.mirror_detached(MirrorJob::Delete(id.clone())).await;
                        return Err(Error::SessionExpired(id));
                    }

                    debug!(session_id = %id, name = %name, "Session loaded from store");
                    return Ok(self.inner.table.insert_if_absent(record));
                }
                Ok(None) => {
                    debug!(session_id = %id, "Session not found in store, creating new");
                }
                Err(e) => {
                    warn!(session_id = %id, error = %e, "Store read failed, creating new session");
                }
            }
        }

        self.create(response, name, ttl)
    }

    fn create<W>(&self, response: &mut W, name: &str, ttl: Duration) -> Result<Session>
    where
        W: CookieSink + ?Sized,
    {
        let session = self.inner.table.create(name, ttl)?;
        response.set_cookie(SessionCookie::for_session(&session, &self.inner.options));
        Ok(session)
    }

    /// Commit `session`: push its expiry to `now + max_age`, write it back
    /// to the table, queue a store upsert and refresh the cookie.
    ///
    /// The store upsert happens in the background. A request on another
    /// process path that falls back to the store may read a record that
    /// does not reflect this save yet; no ordering is guaranteed between
    /// the mirror and such a read. Failing to queue the upsert is logged
    /// and counted in [`MirrorStats::failed`], never returned.
    pub async fn save<W>(&self, session: &mut Session, response: &mut W) -> Result<()>
    where
        W: CookieSink + ?Sized,
    {
        session.touch(expiry_after(Utc::now(), self.inner.options.effective_max_age()));
        self.inner.table.commit(session);

        self.mirror_detached(MirrorJob::Save(session.stored())).await;

        response.set_cookie(SessionCookie::for_session(session, &self.inner.options));
        Ok(())
    }

    /// Store `content` under `key`, then [`save`](Self::save).
    ///
    /// The set is skipped for an empty key or `null` content; the save
    /// always happens and its errors are returned.
    pub async fn set_and_save<T, W>(
        &self,
        session: &mut Session,
        key: &str,
        content: T,
        response: &mut W,
    ) -> Result<()>
    where
        T: Serialize,
        W: CookieSink + ?Sized,
    {
        session.set(key, content)?;
        self.save(session, response).await
    }

    /// Merge `value` into the session, then [`save`](Self::save).
    pub async fn set_value<W>(
        &self,
        session: &mut Session,
        value: Value,
        response: &mut W,
    ) -> Result<()>
    where
        W: CookieSink + ?Sized,
    {
        session.set_value(value);
        self.save(session, response).await
    }

    /// Delete the session named `name` for a request.
    ///
    /// Without a cookie this is a no-op. Otherwise a removal cookie is
    /// written, the session leaves the table immediately and a store
    /// deletion is queued. Returns whether a cookie was present.
    pub async fn delete<R, W>(&self, request: &R, response: &mut W, name: &str) -> bool
    where
        R: CookieSource + ?Sized,
        W: CookieSink + ?Sized,
    {
        let Some(id) = request.cookie(name).filter(|id| !id.is_empty()) else {
            return false;
        };

        response.set_cookie(SessionCookie::removal(name, &self.inner.options));
        self.inner.table.remove(&id);
        self.mirror_detached(MirrorJob::Delete(id)).await;
        true
    }

    /// Run a sweep now, returning the number of sessions evicted.
    pub async fn sweep(&self) -> usize {
        self.inner.sweeper.sweep_once().await
    }

    /// Write `session` to the store directly and wait for the result.
    ///
    /// Unlike [`save`](Self::save) this bypasses the mirror queue and
    /// surfaces store errors, including [`StoreError::NotModified`](crate::StoreError::NotModified).
    pub async fn persist(&self, session: &Session) -> Result<SaveOutcome> {
        let store = self
            .inner
            .store
            .as_ref()
            .ok_or_else(|| Error::StoreUnavailable("no store configured".to_string()))?;
        Ok(store.save(&session.stored()).await?)
    }

    /// Mirror queue counters. All zero without a store.
    pub fn mirror_stats(&self) -> MirrorStats {
        self.inner
            .mirror
            .as_ref()
            .map(MirrorQueue::stats)
            .unwrap_or_default()
    }

    /// Wait until queued store operations have finished.
    pub async fn flush(&self) {
        if let Some(mirror) = &self.inner.mirror {
            mirror.wait_idle().await;
        }
    }

    /// Queue a store job whose failure must not reach the caller.
    async fn mirror_detached(&self, job: MirrorJob) {
        if let Some(mirror) = &self.inner.mirror
            && let Err(e) = mirror.submit(job).await
        {
            warn!(error = %e, "Failed to queue store operation");
        }
    }
}
