//! Dirty-session flushing: the eviction path and the periodic scan.
//!
//! Both paths funnel through [`Flusher`]. A resident session that fails to
//! flush is simply re-marked dirty — its live state re-encodes on the next
//! pass. An evicted session has no next pass, so its already-encoded bytes
//! go to a bounded pending queue retried at the start of every pass; when
//! the queue overflows, the oldest payload is dropped with an error log.
//! Loss is bounded and observable instead of silent.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::cache::{Evicted, SessionCache};
use crate::id::SessionId;
use crate::store::{SessionStore, StoreRecord};

/// Maximum evicted payloads held for retry.
const PENDING_LIMIT: usize = 32;

/// Outcome of one flush pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub flushed: usize,
    pub failed: usize,
    /// Pending evicted payloads that were successfully retried.
    pub retried: usize,
}

impl FlushSummary {
    fn is_quiet(&self) -> bool {
        self.flushed == 0 && self.failed == 0 && self.retried == 0
    }
}

/// Writes dirty sessions to the backing store.
pub struct Flusher {
    cache: Arc<SessionCache>,
    store: Arc<dyn SessionStore>,
    ttl: chrono::Duration,
    persist: bool,
    pending: Mutex<VecDeque<(SessionId, Vec<u8>)>>,
}

impl Flusher {
    pub fn new(
        cache: Arc<SessionCache>,
        store: Arc<dyn SessionStore>,
        ttl: chrono::Duration,
        persist: bool,
    ) -> Self {
        Self {
            cache,
            store,
            ttl,
            persist,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn persist(&self) -> bool {
        self.persist
    }

    pub fn pending_len(&self) -> usize {
        self.lock_pending().len()
    }

    /// One full pass: retry pending evicted payloads, then flush every
    /// dirty resident session.
    pub async fn flush_pass(&self) -> FlushSummary {
        let mut summary = FlushSummary::default();
        if !self.persist {
            return summary;
        }

        self.retry_pending(&mut summary).await;

        for (id, session) in self.cache.snapshot() {
            let encoded = {
                let mut set = session.lock().expect("lock poisoned");
                if !set.is_dirty() {
                    continue;
                }
                match roster_archive::encode(&set) {
                    Ok(bytes) => {
                        set.clear_dirty();
                        bytes
                    }
                    Err(e) => {
                        error!(session_id = %id, error = %e, "Failed to encode session");
                        summary.failed += 1;
                        continue;
                    }
                }
            };
            match self.put(&id, encoded).await {
                Ok(()) => {
                    debug!(session_id = %id, "Flushed session");
                    summary.flushed += 1;
                }
                Err(e) => {
                    error!(session_id = %id, error = %e, "Failed to flush session; will retry");
                    session.lock().expect("lock poisoned").mark_dirty();
                    summary.failed += 1;
                }
            }
        }

        if !summary.is_quiet() {
            info!(
                flushed = summary.flushed,
                failed = summary.failed,
                retried = summary.retried,
                "Flush pass complete"
            );
        }
        summary
    }

    /// Flush entries the cache just evicted. One immediate attempt each;
    /// failures park the encoded bytes on the pending queue.
    pub async fn handle_evicted(&self, evicted: Vec<Evicted>) {
        if !self.persist {
            return;
        }
        for entry in evicted {
            let encoded = {
                let mut set = entry.session.lock().expect("lock poisoned");
                if !set.is_dirty() {
                    continue;
                }
                match roster_archive::encode(&set) {
                    Ok(bytes) => {
                        set.clear_dirty();
                        bytes
                    }
                    Err(e) => {
                        error!(session_id = %entry.id, error = %e, "Failed to encode evicted session");
                        continue;
                    }
                }
            };
            match self.put(&entry.id, encoded.clone()).await {
                Ok(()) => debug!(session_id = %entry.id, "Flushed evicted session"),
                Err(e) => {
                    error!(
                        session_id = %entry.id,
                        error = %e,
                        "Failed to flush evicted session; queueing for retry"
                    );
                    self.push_pending(entry.id, encoded);
                }
            }
        }
    }

    async fn retry_pending(&self, summary: &mut FlushSummary) {
        let batch: Vec<_> = self.lock_pending().drain(..).collect();
        for (id, bytes) in batch {
            match self.put(&id, bytes.clone()).await {
                Ok(()) => {
                    debug!(session_id = %id, "Flushed previously evicted session");
                    summary.retried += 1;
                }
                Err(e) => {
                    error!(session_id = %id, error = %e, "Retry flush failed");
                    summary.failed += 1;
                    self.push_pending(id, bytes);
                }
            }
        }
    }

    async fn put(&self, id: &SessionId, data: Vec<u8>) -> Result<(), crate::store::StoreError> {
        let now = Utc::now();
        self.store
            .put(
                id,
                StoreRecord {
                    data,
                    updated_at: now,
                    expires_at: now + self.ttl,
                },
            )
            .await
    }

    fn push_pending(&self, id: SessionId, bytes: Vec<u8>) {
        let mut pending = self.lock_pending();
        if pending.len() >= PENDING_LIMIT {
            if let Some((dropped, _)) = pending.pop_front() {
                error!(session_id = %dropped, "Pending flush queue full; dropping oldest payload");
            }
        }
        pending.push_back((id, bytes));
    }

    fn lock_pending(&self) -> MutexGuard<'_, VecDeque<(SessionId, Vec<u8>)>> {
        self.pending.lock().expect("lock poisoned")
    }
}

/// Background worker driving periodic flush passes.
pub struct FlushWorker {
    flusher: Arc<Flusher>,
    interval: Duration,
}

impl FlushWorker {
    pub fn new(flusher: Arc<Flusher>, interval: Duration) -> Self {
        Self { flusher, interval }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if !self.flusher.persist() {
            info!("Persistence disabled; flush worker idle");
            return;
        }

        info!(interval_secs = self.interval.as_secs(), "Starting flush worker");

        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.flusher.flush_pass().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Flush worker shutting down");
                        break;
                    }
                }
            }
        }
    }
}
