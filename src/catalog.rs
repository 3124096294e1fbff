//! Time-boxed catalog snapshots and the refresh protocol.
//!
//! A [`Snapshot`] is never mutated after it is built. Readers clone the
//! `Arc` out of the slot and traverse it without holding any lock; only the
//! swap itself takes the write lock. At most one rebuild runs at a time.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{ContentError, Result},
    tree::{until_cancelled, Catalog},
};

/// What a caller gets when a snapshot is stale and another rebuild is
/// already running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Wait for the running rebuild and return its result
    #[default]
    Wait,
    /// Return the stale snapshot immediately
    ServeStale,
}

/// Immutable point-in-time catalog
#[derive(Debug)]
pub struct Snapshot {
    catalog: Catalog,
    generation: u64,
    /// Invalidation epoch observed when the build started
    epoch: u64,
    built_at: DateTime<Utc>,
    expires_at: Instant,
}

impl Snapshot {
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Monotonic build counter, starting at 1
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn item_count(&self) -> usize {
        self.catalog.items().len()
    }

    pub fn directory_count(&self) -> usize {
        self.catalog.directories().len()
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Owns the current snapshot of one provider
pub struct CatalogCache {
    slot: RwLock<Option<Arc<Snapshot>>>,
    /// Held for the whole of a rebuild; remembers why the last attempt failed
    rebuild: Mutex<Option<ContentError>>,
    /// Rebuild attempts that ran to completion, successful or not
    attempts: AtomicU64,
    epoch: AtomicU64,
    generation: AtomicU64,
    ttl: Duration,
    policy: RefreshPolicy,
}

impl CatalogCache {
    pub fn new(ttl: Duration, policy: RefreshPolicy) -> Self {
        Self {
            slot: RwLock::new(None),
            rebuild: Mutex::new(None),
            attempts: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            ttl,
            policy,
        }
    }

    /// The installed snapshot, fresh or not
    pub async fn current(&self) -> Option<Arc<Snapshot>> {
        self.slot.read().await.clone()
    }

    /// Mark the current snapshot expired without rebuilding.
    ///
    /// Also covers a rebuild already in flight: its snapshot is installed
    /// stale.
    pub fn invalidate(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(epoch, "Catalog snapshot invalidated");
    }

    pub fn is_fresh(&self, snapshot: &Snapshot) -> bool {
        snapshot.epoch == self.epoch.load(Ordering::SeqCst) && !snapshot.is_expired()
    }

    /// Return a fresh snapshot, rebuilding through `load` when needed.
    ///
    /// Callers that queue behind a running rebuild share its outcome instead
    /// of starting another one. When a rebuild fails, plain reads fall back
    /// to the previous snapshot if one exists; a forced refresh reports the
    /// failure. Cancellation never falls back and never installs anything.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        force_refresh: bool,
        cancel: &CancellationToken,
        load: F,
    ) -> Result<Arc<Snapshot>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Catalog>>,
    {
        let observed = self.current().await;
        if let Some(snapshot) = &observed {
            if !force_refresh && self.is_fresh(snapshot) {
                return Ok(snapshot.clone());
            }
        }
        let observed_generation = observed.as_ref().map(|s| s.generation);
        let observed_attempts = self.attempts.load(Ordering::SeqCst);

        let mut last_failure = match (&observed, self.policy) {
            (Some(stale), RefreshPolicy::ServeStale) if !force_refresh => match self.rebuild.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    tracing::debug!(generation = stale.generation, "Rebuild in flight; serving stale snapshot");
                    return Ok(stale.clone());
                }
            },
            _ => until_cancelled(cancel, async { Ok(self.rebuild.lock().await) }).await?,
        };

        // An attempt finished while we waited for the lock: take its outcome
        if self.attempts.load(Ordering::SeqCst) != observed_attempts {
            if let Some(error) = last_failure.clone() {
                tracing::debug!(error = %error, "Sharing the failure of the rebuild we waited on");
                return self.recover(error, force_refresh).await;
            }
        }
        if let Some(current) = self.current().await {
            if Some(current.generation) != observed_generation && self.is_fresh(&current) {
                return Ok(current);
            }
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        let started = Instant::now();
        tracing::info!(forced = force_refresh, "Rebuilding content catalog");

        match until_cancelled(cancel, load()).await {
            Ok(catalog) => {
                let snapshot = Arc::new(Snapshot {
                    catalog,
                    generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
                    epoch,
                    built_at: Utc::now(),
                    expires_at: Instant::now() + self.ttl,
                });
                *self.slot.write().await = Some(snapshot.clone());
                *last_failure = None;
                self.attempts.fetch_add(1, Ordering::SeqCst);
                tracing::info!(
                    generation = snapshot.generation,
                    items = snapshot.item_count(),
                    directories = snapshot.directory_count(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Content catalog rebuilt"
                );
                Ok(snapshot)
            }
            Err(ContentError::Cancelled) => {
                tracing::info!("Catalog rebuild cancelled; keeping previous snapshot");
                Err(ContentError::Cancelled)
            }
            Err(e) => {
                *last_failure = Some(e.clone());
                self.attempts.fetch_add(1, Ordering::SeqCst);
                self.recover(e, force_refresh).await
            }
        }
    }

    async fn recover(&self, error: ContentError, force_refresh: bool) -> Result<Arc<Snapshot>> {
        if force_refresh {
            tracing::warn!(error = %error, "Forced catalog rebuild failed");
            return Err(error);
        }
        match self.current().await {
            Some(previous) => {
                tracing::warn!(error = %error, generation = previous.generation, "Catalog rebuild failed; serving previous snapshot");
                Ok(previous)
            }
            None => Err(error),
        }
    }
}
