//! Bounded background queue mirroring sessions to the durable store.
//!
//! Saves and deletions are pushed onto bounded channels and drained by a
//! small pool of workers. Jobs are routed by session ID, so operations on
//! one session reach the store in the order they were queued. Enqueueing
//! waits when a worker's queue is full, and store failures are logged and
//! counted instead of reaching the caller.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::session::Session;
use crate::store::{SessionStore, StoreError, StoreResult};

/// A unit of store work.
#[derive(Debug)]
pub(crate) enum MirrorJob {
    /// Upsert a session.
    Save(Session),
    /// Delete a session by ID.
    Delete(String),
}

impl MirrorJob {
    fn session_id(&self) -> &str {
        match self {
            MirrorJob::Save(session) => session.id(),
            MirrorJob::Delete(id) => id,
        }
    }
}

/// Counters describing mirror activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorStats {
    /// Jobs accepted onto the queue.
    pub enqueued: u64,
    /// Jobs the store completed successfully.
    pub completed: u64,
    /// Jobs the store rejected.
    pub failed: u64,
    /// Jobs queued or in flight.
    pub pending: usize,
}

#[derive(Debug, Default)]
struct Shared {
    enqueued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    pending: AtomicUsize,
    idle: Notify,
}

impl Shared {
    fn finish(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Sending half of the mirror queue.
#[derive(Debug, Clone)]
pub(crate) struct MirrorQueue {
    senders: Arc<[mpsc::Sender<MirrorJob>]>,
    shared: Arc<Shared>,
}

impl MirrorQueue {
    /// Start `workers` tasks draining `capacity` queued jobs into `store`.
    ///
    /// The capacity is split evenly across workers. Workers exit once every
    /// queue handle has been dropped and their remaining jobs are drained.
    pub(crate) fn start(
        store: Arc<dyn SessionStore>,
        capacity: usize,
        workers: usize,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let workers = workers.max(1);
        let per_worker = (capacity / workers).max(1);
        let shared = Arc::new(Shared::default());

        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let (tx, rx) = mpsc::channel(per_worker);
            senders.push(tx);
            handles.push(tokio::spawn(run_worker(
                index,
                Arc::clone(&store),
                rx,
                Arc::clone(&shared),
            )));
        }

        (
            Self {
                senders: senders.into(),
                shared,
            },
            handles,
        )
    }

    fn route(&self, session_id: &str) -> &mpsc::Sender<MirrorJob> {
        let mut hasher = DefaultHasher::new();
        session_id.hash(&mut hasher);
        let index = (hasher.finish() % self.senders.len() as u64) as usize;
        &self.senders[index]
    }

    /// Queue a job, waiting for room if its worker's queue is full.
    ///
    /// Cancel-safe: nothing is counted until a slot has been reserved, so
    /// dropping this future while it waits leaves the counters untouched.
    /// A closed queue counts the job as failed.
    pub(crate) async fn submit(&self, job: MirrorJob) -> Result<()> {
        let tx = self.route(job.session_id());
        match tx.reserve().await {
            Ok(permit) => {
                self.shared.pending.fetch_add(1, Ordering::AcqRel);
                self.shared.enqueued.fetch_add(1, Ordering::Relaxed);
                permit.send(job);
                Ok(())
            }
            Err(mpsc::error::SendError(())) => {
                self.shared.failed.fetch_add(1, Ordering::Relaxed);
                Err(Error::StoreUnavailable(format!(
                    "mirror queue closed, dropped job for session {}",
                    job.session_id()
                )))
            }
        }
    }

    /// Snapshot of the counters.
    pub(crate) fn stats(&self) -> MirrorStats {
        MirrorStats {
            enqueued: self.shared.enqueued.load(Ordering::Relaxed),
            completed: self.shared.completed.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            pending: self.shared.pending.load(Ordering::Acquire),
        }
    }

    /// Wait until every queued job has been processed.
    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

async fn run_worker(
    index: usize,
    store: Arc<dyn SessionStore>,
    mut rx: mpsc::Receiver<MirrorJob>,
    shared: Arc<Shared>,
) {
    trace!(worker = index, "Mirror worker started");

    while let Some(job) = rx.recv().await {
        let session_id = job.session_id().to_string();

        // Each job runs in its own task so a panicking store fails the job,
        // not the worker.
        let result = match tokio::spawn(apply(Arc::clone(&store), job)).await {
            Ok(result) => result,
            Err(e) => Err(StoreError::Backend(format!("store task aborted: {e}"))),
        };

        match result {
            Ok(()) => {
                shared.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                shared.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    worker = index,
                    session_id = %session_id,
                    error = %e,
                    "Store mirror operation failed"
                );
            }
        }

        shared.finish();
    }

    debug!(worker = index, "Mirror worker stopped");
}

async fn apply(store: Arc<dyn SessionStore>, job: MirrorJob) -> StoreResult<()> {
    match job {
        MirrorJob::Save(session) => match store.save(&session).await {
            Ok(outcome) => {
                trace!(session_id = %session.id(), ?outcome, "Session mirrored");
                Ok(())
            }
            // Already identical in the store.
            Err(StoreError::NotModified(_)) => Ok(()),
            Err(e) => Err(e),
        },
        MirrorJob::Delete(id) => {
            store.delete(&id).await?;
            trace!(session_id = %id, "Session deleted from store");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, SaveOutcome, StoreError, StoreResult};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::collections::HashMap;
    use tokio::sync::Semaphore;

    struct FailingStore;

    #[async_trait]
    impl SessionStore for FailingStore {
        async fn save(&self, _session: &Session) -> StoreResult<SaveOutcome> {
            Err(StoreError::Unavailable("down".into()))
        }

        async fn read(&self, _id: &str) -> StoreResult<Option<Session>> {
            Err(StoreError::Unavailable("down".into()))
        }

        async fn delete(&self, _id: &str) -> StoreResult<()> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    /// Saves wait for a gate permit; `started` fires as each save begins.
    struct GatedStore {
        gate: Semaphore,
        started: Notify,
    }

    impl GatedStore {
        fn closed() -> Self {
            Self {
                gate: Semaphore::new(0),
                started: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl SessionStore for GatedStore {
        async fn save(&self, _session: &Session) -> StoreResult<SaveOutcome> {
            self.started.notify_one();
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            Ok(SaveOutcome::Inserted)
        }

        async fn read(&self, _id: &str) -> StoreResult<Option<Session>> {
            Ok(None)
        }

        async fn delete(&self, _id: &str) -> StoreResult<()> {
            Ok(())
        }
    }

    struct PanickingStore;

    #[async_trait]
    impl SessionStore for PanickingStore {
        async fn save(&self, _session: &Session) -> StoreResult<SaveOutcome> {
            panic!("store exploded");
        }

        async fn read(&self, _id: &str) -> StoreResult<Option<Session>> {
            Ok(None)
        }

        async fn delete(&self, _id: &str) -> StoreResult<()> {
            Ok(())
        }
    }

    fn session(id: &str) -> Session {
        Session::from_parts(id, "session", HashMap::new(), Utc::now() + Duration::minutes(5))
    }

    #[tokio::test]
    async fn test_jobs_reach_store() {
        let store = Arc::new(MemoryStore::new());
        let (queue, _workers) = MirrorQueue::start(store.clone(), 8, 2);

        queue.submit(MirrorJob::Save(session("a"))).await.unwrap();
        queue.submit(MirrorJob::Save(session("b"))).await.unwrap();
        queue.wait_idle().await;
        assert_eq!(store.len(), 2);

        queue.submit(MirrorJob::Delete("a".into())).await.unwrap();
        queue.wait_idle().await;
        assert!(!store.contains("a"));

        let stats = queue.stats();
        assert_eq!(stats.enqueued, 3);
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn test_jobs_for_one_session_stay_ordered() {
        let store = Arc::new(MemoryStore::new());
        let (queue, _workers) = MirrorQueue::start(store.clone(), 64, 4);

        for round in 0..20 {
            let mut s = session("same");
            s.set("round", round).unwrap();
            queue.submit(MirrorJob::Save(s)).await.unwrap();
        }
        queue.submit(MirrorJob::Delete("same".into())).await.unwrap();
        queue.wait_idle().await;

        assert!(!store.contains("same"));
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_surfaced() {
        let (queue, _workers) = MirrorQueue::start(Arc::new(FailingStore), 4, 1);

        queue.submit(MirrorJob::Delete("x".into())).await.unwrap();
        queue.wait_idle().await;

        let stats = queue.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 0);
    }

    #[tokio::test]
    async fn test_workers_stop_when_queue_dropped() {
        let (queue, workers) = MirrorQueue::start(Arc::new(MemoryStore::new()), 4, 3);
        drop(queue);

        for worker in workers {
            worker.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_cancelled_submit_on_full_queue_leaves_no_pending_job() {
        let store = Arc::new(GatedStore::closed());
        let (queue, _workers) = MirrorQueue::start(store.clone(), 1, 1);

        // First job occupies the worker, second fills the channel.
        queue.submit(MirrorJob::Save(session("a"))).await.unwrap();
        store.started.notified().await;
        queue.submit(MirrorJob::Save(session("b"))).await.unwrap();

        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            queue.submit(MirrorJob::Save(session("c"))),
        )
        .await;
        assert!(blocked.is_err(), "submit should wait while the queue is full");
        assert_eq!(queue.stats().pending, 2);

        store.gate.add_permits(8);
        tokio::time::timeout(std::time::Duration::from_secs(2), queue.wait_idle())
            .await
            .expect("queue should drain");

        let stats = queue.stats();
        assert_eq!(stats.enqueued, 2);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn test_panicking_store_fails_job_and_keeps_worker() {
        let (queue, _workers) = MirrorQueue::start(Arc::new(PanickingStore), 4, 1);

        queue.submit(MirrorJob::Save(session("a"))).await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), queue.wait_idle())
            .await
            .expect("queue should drain after a panic");

        queue.submit(MirrorJob::Save(session("b"))).await.unwrap();
        queue.submit(MirrorJob::Delete("b".into())).await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), queue.wait_idle())
            .await
            .expect("worker should survive the panic");

        let stats = queue.stats();
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 0);
    }
}
