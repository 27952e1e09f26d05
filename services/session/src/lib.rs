//! # roster-session
//!
//! Session layer for the roster grid engine: a bounded LRU cache of live
//! [`roster_grid::GridSet`]s over a durable key/value store, with
//! write-back on eviction, a periodic dirty-session flush, and
//! expiry-driven cleanup.
//!
//! The [`service::SessionService`] facade is the boundary an API layer
//! would call; everything long-lived hangs off it — no globals.

pub mod cache;
pub mod config;
pub mod flush;
pub mod id;
pub mod reaper;
pub mod service;
pub mod store;

pub use cache::{SessionCache, SharedSession};
pub use config::Config;
pub use flush::{FlushSummary, FlushWorker, Flusher};
pub use id::{SessionId, SessionIdError};
pub use reaper::ExpiryReaper;
pub use service::{AllocationSpan, CacheStats, ServiceError, SessionIndex, SessionService};
pub use store::{MemoryStore, SessionStore, SqliteStore, StoreError, StoreRecord};
