//! SQLite-backed session store.
//!
//! Durable storage for encoded session bundles, enabling recovery after
//! service restarts. Timestamps are stored as Unix milliseconds so the
//! expiry query is a plain integer comparison.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::{SessionStore, StoreError, StoreRecord};
use crate::id::SessionId;

/// SQLite session store. Calls are short single-row statements, so the
/// connection sits behind one mutex rather than a pool.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                data BLOB NOT NULL,
                updated_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
            "#,
        )?;

        debug!("Session store schema initialized");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("lock poisoned")
    }
}

fn to_datetime(millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Backend(format!("timestamp out of range: {millis}")))
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn get(&self, id: &SessionId) -> Result<Option<StoreRecord>, StoreError> {
        let row = self
            .lock()
            .query_row(
                "SELECT data, updated_at, expires_at FROM sessions WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((data, updated_at, expires_at)) => Ok(Some(StoreRecord {
                data,
                updated_at: to_datetime(updated_at)?,
                expires_at: to_datetime(expires_at)?,
            })),
        }
    }

    async fn put(&self, id: &SessionId, record: StoreRecord) -> Result<(), StoreError> {
        self.lock().execute(
            r#"
            INSERT INTO sessions (id, data, updated_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at,
                expires_at = excluded.expires_at
            "#,
            params![
                id.as_str(),
                record.data,
                record.updated_at.timestamp_millis(),
                record.expires_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), StoreError> {
        self.lock()
            .execute("DELETE FROM sessions WHERE id = ?1", params![id.as_str()])?;
        Ok(())
    }

    async fn expired_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<SessionId>, StoreError> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT id FROM sessions WHERE expires_at < ?1 ORDER BY expires_at")?;
        let ids = stmt
            .query_map(params![cutoff.timestamp_millis()], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        ids.into_iter()
            .map(|s| {
                SessionId::parse(&s)
                    .map_err(|e| StoreError::Backend(format!("stored id {s:?} is invalid: {e}")))
            })
            .collect()
    }
}
