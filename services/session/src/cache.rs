//! Bounded LRU cache of live sessions.
//!
//! The cache maps session ids to shared [`GridSet`] handles. Its internal
//! mutex guards only the map and the recency order — never a session's own
//! lock and never an await point — so distinct sessions mutate without
//! blocking each other.
//!
//! Eviction is deterministic: inserting past capacity removes exactly the
//! least recently used entries and hands them back to the caller, which is
//! responsible for flushing the dirty ones. The cache itself never touches
//! the store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use roster_grid::GridSet;
use tracing::debug;

use crate::id::SessionId;

/// A session handle shared between the cache, workers and callers. All
/// business mutation happens under this per-session lock.
pub type SharedSession = Arc<Mutex<GridSet>>;

/// An entry pushed out by capacity pressure. Already removed from the
/// cache; the holder decides whether it still needs flushing.
pub struct Evicted {
    pub id: SessionId,
    pub session: SharedSession,
}

pub struct SessionCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    entries: HashMap<SessionId, SharedSession>,
    /// Recency order, front = least recently used.
    order: Vec<SessionId>,
}

impl SessionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.lock().entries.contains_key(id)
    }

    /// Resident ids, least recently used first.
    pub fn resident_ids(&self) -> Vec<SessionId> {
        self.lock().order.clone()
    }

    /// Look up a session, marking it most recently used on a hit.
    pub fn get(&self, id: &SessionId) -> Option<SharedSession> {
        let mut inner = self.lock();
        let session = inner.entries.get(id).cloned()?;
        inner.touch(id);
        Some(session)
    }

    /// Insert a session loaded outside the cache lock.
    ///
    /// If another task inserted the same id in the meantime, its session
    /// wins and `session` is dropped — there must never be two live copies
    /// of one session. Returns the resident handle plus any entries the
    /// insert pushed out.
    pub fn insert_if_absent(
        &self,
        id: SessionId,
        session: SharedSession,
    ) -> (SharedSession, Vec<Evicted>) {
        let mut inner = self.lock();
        if let Some(existing) = inner.entries.get(&id).cloned() {
            debug!(session_id = %id, "Session raced into cache; adopting resident copy");
            inner.touch(&id);
            return (existing, Vec::new());
        }
        inner.entries.insert(id.clone(), session.clone());
        inner.order.push(id);
        (session, inner.evict_overflow(self.capacity))
    }

    /// Insert or replace a session (upload and reset paths).
    pub fn insert(&self, id: SessionId, session: SharedSession) -> Vec<Evicted> {
        let mut inner = self.lock();
        if inner.entries.insert(id.clone(), session).is_some() {
            inner.touch(&id);
        } else {
            inner.order.push(id);
        }
        inner.evict_overflow(self.capacity)
    }

    /// Drop a session without flushing (reaper path).
    pub fn remove(&self, id: &SessionId) -> Option<SharedSession> {
        let mut inner = self.lock();
        let session = inner.entries.remove(id)?;
        inner.order.retain(|o| o != id);
        Some(session)
    }

    /// Every resident entry, least recently used first. Recency is not
    /// touched; the flush scan is not a use.
    pub fn snapshot(&self) -> Vec<(SessionId, SharedSession)> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id).map(|s| (id.clone(), s.clone())))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().expect("lock poisoned")
    }
}

impl CacheInner {
    fn touch(&mut self, id: &SessionId) {
        self.order.retain(|o| o != id);
        self.order.push(id.clone());
    }

    fn evict_overflow(&mut self, capacity: usize) -> Vec<Evicted> {
        let mut evicted = Vec::new();
        while self.entries.len() > capacity {
            let id = self.order.remove(0);
            if let Some(session) = self.entries.remove(&id) {
                debug!(session_id = %id, "Evicting least recently used session");
                evicted.push(Evicted { id, session });
            }
        }
        evicted
    }
}
