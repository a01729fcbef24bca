//! Background eviction of expired sessions.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::mirror::{MirrorJob, MirrorQueue};
use crate::table::SessionTable;

/// Evicts expired sessions from the table and forwards deletions to the store.
#[derive(Debug, Clone)]
pub(crate) struct Sweeper {
    table: Arc<SessionTable>,
    mirror: Option<MirrorQueue>,
}

impl Sweeper {
    pub(crate) fn new(table: Arc<SessionTable>, mirror: Option<MirrorQueue>) -> Self {
        Self { table, mirror }
    }

    /// Run one pass, returning the number of sessions evicted.
    ///
    /// Store deletions are queued after the table lock is released.
    pub(crate) async fn sweep_once(&self) -> usize {
        let expired = self.table.sweep(Utc::now());
        let count = expired.len();

        if let Some(mirror) = &self.mirror {
            for id in expired {
                if let Err(e) = mirror.submit(MirrorJob::Delete(id)).await {
                    warn!(error = %e, "Failed to queue store deletion for expired session");
                }
            }
        }

        count
    }

    /// Sleep for `interval`, sweep, repeat. Runs until the task is aborted.
    pub(crate) fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            debug!(interval_ms = interval.as_millis() as u64, "Session sweeper started");
            loop {
                tokio::time::sleep(interval).await;
                let evicted = self.sweep_once().await;
                if evicted > 0 {
                    debug!(evicted, "Sweeper pass complete");
                }
            }
        })
    }
}
