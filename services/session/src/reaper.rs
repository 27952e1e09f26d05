//! Expiry reaper: deletes stored sessions past their TTL and drops any
//! still-resident copy.
//!
//! A deletion failure leaves the record in place; the next pass sees it
//! again. The cache and index removals are unconditional once the store
//! delete succeeds, so a reaped id behaves exactly like one never seen.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info};

use crate::cache::SessionCache;
use crate::service::SessionIndex;
use crate::store::SessionStore;

pub struct ExpiryReaper {
    cache: Arc<SessionCache>,
    store: Arc<dyn SessionStore>,
    index: Arc<SessionIndex>,
    interval: Duration,
}

impl ExpiryReaper {
    pub fn new(
        cache: Arc<SessionCache>,
        store: Arc<dyn SessionStore>,
        index: Arc<SessionIndex>,
        interval: Duration,
    ) -> Self {
        Self {
            cache,
            store,
            index,
            interval,
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Starting expiry reaper");

        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.reap_pass().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Expiry reaper shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One pass: delete every expired record and evict its resident copy.
    /// Returns the number of sessions reaped.
    pub async fn reap_pass(&self) -> usize {
        let expired = match self.store.expired_before(Utc::now()).await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "Failed to query expired sessions");
                return 0;
            }
        };

        let mut reaped = 0;
        for id in expired {
            if let Err(e) = self.store.delete(&id).await {
                // Left in place for the next pass.
                error!(session_id = %id, error = %e, "Failed to delete expired session");
                continue;
            }
            self.cache.remove(&id);
            self.index.remove(&id);
            info!(session_id = %id, "Reaped expired session");
            reaped += 1;
        }

        if reaped > 0 {
            info!(reaped, "Reap pass complete");
        }
        reaped
    }
}
