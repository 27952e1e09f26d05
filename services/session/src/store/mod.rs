//! Session persistence contract and implementations.
//!
//! The store holds encoded session bundles keyed by id, with update and
//! expiry timestamps. Semantics are last-writer-wins, no transactions:
//! concurrent writers for distinct sessions never conflict, and a session
//! has a single owner by construction.

mod sqlite;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::id::SessionId;

pub use sqlite::SqliteStore;

/// Errors from session store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// One stored session: the encoded bundle plus bookkeeping timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRecord {
    pub data: Vec<u8>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Backing store for encoded sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &SessionId) -> Result<Option<StoreRecord>, StoreError>;

    async fn put(&self, id: &SessionId, record: StoreRecord) -> Result<(), StoreError>;

    async fn delete(&self, id: &SessionId) -> Result<(), StoreError>;

    /// Ids of records whose expiry lies strictly before `cutoff`.
    async fn expired_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<SessionId>, StoreError>;
}

/// In-memory store for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<SessionId, StoreRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, id: &SessionId) -> Result<Option<StoreRecord>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn put(&self, id: &SessionId, record: StoreRecord) -> Result<(), StoreError> {
        self.records.write().await.insert(id.clone(), record);
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), StoreError> {
        self.records.write().await.remove(id);
        Ok(())
    }

    async fn expired_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<SessionId>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|(_, r)| r.expires_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(data: &[u8], expires_in: Duration) -> StoreRecord {
        let now = Utc::now();
        StoreRecord {
            data: data.to_vec(),
            updated_at: now,
            expires_at: now + expires_in,
        }
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let id = SessionId::parse("tab-1").unwrap();

        assert!(store.get(&id).await.unwrap().is_none());
        store.put(&id, record(b"abc", Duration::days(1))).await.unwrap();
        let fetched = store.get(&id).await.unwrap().unwrap();
        assert_eq!(fetched.data, b"abc");

        // Last writer wins.
        store.put(&id, record(b"xyz", Duration::days(1))).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap().unwrap().data, b"xyz");

        store.delete(&id).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_expired_before() {
        let store = MemoryStore::new();
        let stale = SessionId::parse("stale").unwrap();
        let fresh = SessionId::parse("fresh").unwrap();
        store
            .put(&stale, record(b"s", Duration::days(-1)))
            .await
            .unwrap();
        store
            .put(&fresh, record(b"f", Duration::days(1)))
            .await
            .unwrap();

        let expired = store.expired_before(Utc::now()).await.unwrap();
        assert_eq!(expired, vec![stale]);
    }
}
