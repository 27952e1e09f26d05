//! Session service facade.
//!
//! Owns every long-lived object — store, cache, index, flusher — and
//! exposes the operation set an API layer would call. Constructed once at
//! startup and passed by handle; there are no process-wide globals.
//!
//! Error posture follows the engine's: user mistakes (unknown names, bad
//! slots, wrong span) come back as sentinel values, `Err` is reserved for
//! the store and for corrupt bundles.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, RwLock};

use roster_archive::ArchiveError;
use roster_grid::{calendar, AddNameOutcome, Day, GridKey, GridSet, Location, RenderTable};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{SessionCache, SharedSession};
use crate::config::Config;
use crate::flush::{FlushSummary, FlushWorker, Flusher};
use crate::id::SessionId;
use crate::reaper::ExpiryReaper;
use crate::store::{SessionStore, StoreError};

/// Hard failures surfaced to the caller. Everything else is a sentinel.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A bundle failed to decode: restore or import hit corruption.
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),
}

/// Which half (or both) of an hour pair an allocation click addresses.
///
/// The addressed slot names the hour; a `:30` slot argument is only
/// meaningful with `SecondHalf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationSpan {
    FirstHalf,
    SecondHalf,
    FullHour,
}

/// Ids believed to exist: created this process, restored from the store,
/// or imported. Backs [`SessionService::session_exists`] without a store
/// read; the reaper removes ids as their records expire.
pub struct SessionIndex {
    ids: RwLock<BTreeSet<SessionId>>,
}

impl SessionIndex {
    pub fn new() -> Self {
        Self {
            ids: RwLock::new(BTreeSet::new()),
        }
    }

    pub fn insert(&self, id: SessionId) {
        self.ids.write().expect("lock poisoned").insert(id);
    }

    pub fn remove(&self, id: &SessionId) {
        self.ids.write().expect("lock poisoned").remove(id);
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.ids.read().expect("lock poisoned").contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the cache, for operational endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub resident: usize,
    pub capacity: usize,
    /// Resident ids, least recently used first.
    pub ids: Vec<SessionId>,
}

/// The session service. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct SessionService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    config: Config,
    store: Arc<dyn SessionStore>,
    cache: Arc<SessionCache>,
    index: Arc<SessionIndex>,
    flusher: Arc<Flusher>,
}

impl SessionService {
    pub fn new(config: Config, store: Arc<dyn SessionStore>) -> Self {
        let cache = Arc::new(SessionCache::new(config.cache_capacity));
        let index = Arc::new(SessionIndex::new());
        let flusher = Arc::new(Flusher::new(
            cache.clone(),
            store.clone(),
            config.session_ttl(),
            config.persist,
        ));
        Self {
            inner: Arc::new(ServiceInner {
                config,
                store,
                cache,
                index,
                flusher,
            }),
        }
    }

    /// Resolve a session: cache hit, restore from the store, or a fresh
    /// set. Every hand-out conservatively marks the session dirty, since
    /// the caller may mutate it.
    pub async fn get_or_create(&self, id: &SessionId) -> Result<SharedSession, ServiceError> {
        if let Some(session) = self.inner.cache.get(id) {
            session.lock().expect("lock poisoned").mark_dirty();
            return Ok(session);
        }

        // Load outside the cache lock; a corrupt stored bundle is a hard
        // error and the cache is left untouched.
        let loaded = match self.inner.store.get(id).await? {
            Some(record) => {
                let mut set = roster_archive::decode(&record.data)?;
                set.mark_dirty();
                info!(session_id = %id, "Restored session from store");
                set
            }
            None => {
                let mut set = GridSet::new();
                set.mark_dirty();
                debug!(session_id = %id, "Created fresh session");
                set
            }
        };

        let (session, evicted) = self
            .inner
            .cache
            .insert_if_absent(id.clone(), Arc::new(Mutex::new(loaded)));
        self.inner.index.insert(id.clone());
        self.inner.flusher.handle_evicted(evicted).await;
        Ok(session)
    }

    /// Toggle-write the addressed half hour(s). The slot argument names
    /// the hour pair; a `:30` slot is rejected unless the span is
    /// `SecondHalf`.
    pub async fn allocate(
        &self,
        id: &SessionId,
        key: GridKey,
        location: Location,
        slot: &str,
        span: AllocationSpan,
        name: &str,
    ) -> Result<bool, ServiceError> {
        let Some(index) = calendar::slot_index(key.day(), slot) else {
            warn!(grid = %key, slot, "Unknown slot label");
            return Ok(false);
        };
        if index % 2 == 1 && span != AllocationSpan::SecondHalf {
            warn!(grid = %key, slot, ?span, "A :30 slot only addresses the second half");
            return Ok(false);
        }
        let Some((first, second)) = calendar::pair_slots(key.day(), index / 2) else {
            return Ok(false);
        };

        let session = self.get_or_create(id).await?;
        let mut set = session.lock().expect("lock poisoned");
        let ok = match span {
            AllocationSpan::FirstHalf => set.allocate(key, location, first, name),
            AllocationSpan::SecondHalf => set.allocate(key, location, second, name),
            AllocationSpan::FullHour => {
                let a = set.allocate(key, location, first, name);
                let b = set.allocate(key, location, second, name);
                a && b
            }
        };
        Ok(ok)
    }

    pub async fn add_name(
        &self,
        id: &SessionId,
        key: GridKey,
        name: &str,
    ) -> Result<AddNameOutcome, ServiceError> {
        let session = self.get_or_create(id).await?;
        let mut set = session.lock().expect("lock poisoned");
        Ok(set.add_name(key, name))
    }

    pub async fn remove_name(
        &self,
        id: &SessionId,
        key: GridKey,
        name: &str,
    ) -> Result<bool, ServiceError> {
        let session = self.get_or_create(id).await?;
        let mut set = session.lock().expect("lock poisoned");
        Ok(set.remove_name(key, name))
    }

    pub async fn rename_name(
        &self,
        id: &SessionId,
        key: GridKey,
        old: &str,
        new: &str,
    ) -> Result<bool, ServiceError> {
        let session = self.get_or_create(id).await?;
        let mut set = session.lock().expect("lock poisoned");
        Ok(set.rename_name(key, old, new))
    }

    pub async fn swap_names(
        &self,
        id: &SessionId,
        key: GridKey,
        a: &str,
        b: &str,
    ) -> Result<bool, ServiceError> {
        let session = self.get_or_create(id).await?;
        let mut set = session.lock().expect("lock poisoned");
        Ok(set.swap_names(key, a, b))
    }

    pub async fn remove_shift(
        &self,
        id: &SessionId,
        key: GridKey,
        slot: &str,
        name: &str,
    ) -> Result<bool, ServiceError> {
        let session = self.get_or_create(id).await?;
        let mut set = session.lock().expect("lock poisoned");
        Ok(set.remove_shift(key, slot, name))
    }

    pub async fn is_allocated(
        &self,
        id: &SessionId,
        key: GridKey,
        slot: &str,
        name: &str,
    ) -> Result<Option<bool>, ServiceError> {
        let session = self.get_or_create(id).await?;
        let set = session.lock().expect("lock poisoned");
        Ok(set.is_allocated(key, slot, name))
    }

    pub async fn render_day(
        &self,
        id: &SessionId,
        day: Day,
    ) -> Result<Vec<RenderTable>, ServiceError> {
        let session = self.get_or_create(id).await?;
        let set = session.lock().expect("lock poisoned");
        Ok(set.render_day(day))
    }

    pub async fn render_night_compact(&self, id: &SessionId) -> Result<RenderTable, ServiceError> {
        let session = self.get_or_create(id).await?;
        let set = session.lock().expect("lock poisoned");
        Ok(set.render_night_compact())
    }

    pub async fn ledger_table(&self, id: &SessionId) -> Result<RenderTable, ServiceError> {
        let session = self.get_or_create(id).await?;
        let set = session.lock().expect("lock poisoned");
        Ok(set.ledger_table())
    }

    pub async fn meal_violations(
        &self,
        id: &SessionId,
        day: Day,
    ) -> Result<Vec<String>, ServiceError> {
        let session = self.get_or_create(id).await?;
        let set = session.lock().expect("lock poisoned");
        Ok(set.meal_violations(day))
    }

    /// Encode the current state for download. Read-only; no flush side
    /// effect.
    pub async fn export(&self, id: &SessionId) -> Result<Vec<u8>, ServiceError> {
        let session = self.get_or_create(id).await?;
        let set = session.lock().expect("lock poisoned");
        Ok(roster_archive::encode(&set)?)
    }

    /// Replace a session with an uploaded bundle. Corrupt bundles fail
    /// hard and leave the existing session untouched.
    pub async fn import(&self, id: &SessionId, bytes: &[u8]) -> Result<(), ServiceError> {
        let mut set = roster_archive::decode(bytes)?;
        set.mark_dirty();
        let evicted = self
            .inner
            .cache
            .insert(id.clone(), Arc::new(Mutex::new(set)));
        self.inner.index.insert(id.clone());
        self.inner.flusher.handle_evicted(evicted).await;
        info!(session_id = %id, "Imported session bundle");
        Ok(())
    }

    /// Discard a session's state, replacing it with a fresh set. The store
    /// copy is overwritten on the next flush.
    pub async fn reset(&self, id: &SessionId) -> Result<(), ServiceError> {
        let mut set = GridSet::new();
        set.mark_dirty();
        let evicted = self
            .inner
            .cache
            .insert(id.clone(), Arc::new(Mutex::new(set)));
        self.inner.index.insert(id.clone());
        self.inner.flusher.handle_evicted(evicted).await;
        info!(session_id = %id, "Reset session");
        Ok(())
    }

    pub fn session_exists(&self, id: &SessionId) -> bool {
        self.inner.index.contains(id) || self.inner.cache.contains(id)
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            resident: self.inner.cache.len(),
            capacity: self.inner.cache.capacity(),
            ids: self.inner.cache.resident_ids(),
        }
    }

    /// Run one flush pass now (also used by the shutdown sequence).
    pub async fn flush_now(&self) -> FlushSummary {
        self.inner.flusher.flush_pass().await
    }

    /// Run one reap pass now.
    pub async fn reap_now(&self) -> usize {
        self.reaper().reap_pass().await
    }

    /// Spawn the flush worker and the expiry reaper.
    pub fn spawn_workers(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let flush_worker = FlushWorker::new(
            self.inner.flusher.clone(),
            self.inner.config.flush_interval(),
        );
        let reaper = self.reaper();

        let flush_handle = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { flush_worker.run(shutdown).await }
        });
        let reap_handle = tokio::spawn(async move { reaper.run(shutdown).await });

        vec![flush_handle, reap_handle]
    }

    /// Final step of the shutdown sequence, after workers have been
    /// signalled and joined: one last synchronous flush pass so dirty
    /// in-memory state reaches the store.
    pub async fn shutdown(&self) {
        let summary = self.flush_now().await;
        info!(
            flushed = summary.flushed,
            failed = summary.failed,
            "Shutdown flush complete"
        );
    }

    fn reaper(&self) -> ExpiryReaper {
        ExpiryReaper::new(
            self.inner.cache.clone(),
            self.inner.store.clone(),
            self.inner.index.clone(),
            self.inner.config.reap_interval(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn id(s: &str) -> SessionId {
        SessionId::parse(s).unwrap()
    }

    fn key(day: Day, location: Location) -> GridKey {
        GridKey::new(day, location).unwrap()
    }

    fn service() -> SessionService {
        SessionService::new(Config::default(), Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_get_or_create_is_stable_per_id() {
        let svc = service();
        let a = svc.get_or_create(&id("tab-1")).await.unwrap();
        let b = svc.get_or_create(&id("tab-1")).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(svc.session_exists(&id("tab-1")));
        assert!(!svc.session_exists(&id("tab-2")));
    }

    #[tokio::test]
    async fn test_allocate_full_hour_writes_both_subslots() {
        let svc = service();
        let sid = id("tab-1");
        let k = key(Day::Day1, Location::Mcc);
        svc.add_name(&sid, k, "alice").await.unwrap();

        assert!(svc
            .allocate(&sid, k, Location::Mcc, "09:00", AllocationSpan::FullHour, "alice")
            .await
            .unwrap());
        assert_eq!(
            svc.is_allocated(&sid, k, "09:00", "alice").await.unwrap(),
            Some(true)
        );
        assert_eq!(
            svc.is_allocated(&sid, k, "09:30", "alice").await.unwrap(),
            Some(true)
        );
    }

    #[tokio::test]
    async fn test_allocate_second_half_addresses_30_subslot() {
        let svc = service();
        let sid = id("tab-1");
        let k = key(Day::Day1, Location::Mcc);
        svc.add_name(&sid, k, "alice").await.unwrap();

        // The :00 label with SecondHalf writes the :30 cell.
        assert!(svc
            .allocate(&sid, k, Location::Mcc, "09:00", AllocationSpan::SecondHalf, "alice")
            .await
            .unwrap());
        assert_eq!(
            svc.is_allocated(&sid, k, "09:00", "alice").await.unwrap(),
            Some(false)
        );
        assert_eq!(
            svc.is_allocated(&sid, k, "09:30", "alice").await.unwrap(),
            Some(true)
        );

        // A :30 label is itself valid for SecondHalf.
        assert!(svc
            .allocate(&sid, k, Location::Mcc, "10:30", AllocationSpan::SecondHalf, "alice")
            .await
            .unwrap());
        assert_eq!(
            svc.is_allocated(&sid, k, "10:30", "alice").await.unwrap(),
            Some(true)
        );
    }

    #[tokio::test]
    async fn test_allocate_rejects_30_slot_for_other_spans() {
        let svc = service();
        let sid = id("tab-1");
        let k = key(Day::Day1, Location::Mcc);
        svc.add_name(&sid, k, "alice").await.unwrap();

        for span in [AllocationSpan::FirstHalf, AllocationSpan::FullHour] {
            assert!(!svc
                .allocate(&sid, k, Location::Mcc, "09:30", span, "alice")
                .await
                .unwrap());
        }
        assert!(!svc
            .allocate(&sid, k, Location::Mcc, "99:00", AllocationSpan::FirstHalf, "alice")
            .await
            .unwrap());
        assert_eq!(
            svc.is_allocated(&sid, k, "09:30", "alice").await.unwrap(),
            Some(false)
        );
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected_through_facade() {
        let svc = service();
        let sid = id("tab-1");
        svc.add_name(&sid, key(Day::Day1, Location::Mcc), "alice")
            .await
            .unwrap();
        let outcome = svc
            .add_name(&sid, key(Day::Day1, Location::Hcc1), "ALICE")
            .await
            .unwrap();
        assert_eq!(outcome, AddNameOutcome::DuplicateName);
    }

    #[tokio::test]
    async fn test_reset_discards_state() {
        let svc = service();
        let sid = id("tab-1");
        let k = key(Day::Day2, Location::Hcc1);
        svc.add_name(&sid, k, "alice").await.unwrap();
        svc.reset(&sid).await.unwrap();

        let table = svc.ledger_table(&sid).await.unwrap();
        // Only the TOTAL row remains.
        assert_eq!(table.rows.len(), 1);
    }

    #[tokio::test]
    async fn test_cache_stats() {
        let svc = service();
        svc.get_or_create(&id("a")).await.unwrap();
        svc.get_or_create(&id("b")).await.unwrap();
        let stats = svc.cache_stats();
        assert_eq!(stats.resident, 2);
        assert_eq!(stats.capacity, Config::default().cache_capacity);
        assert_eq!(stats.ids, vec![id("a"), id("b")]);
    }
}
