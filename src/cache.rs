use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::Result;

/// Shared key/value cache used by the caching decorator
#[async_trait]
pub trait Cache: Send + Sync {
    /// Get cached content by key
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store content in cache
    async fn set(&self, key: &str, value: Bytes) -> Result<()>;

    /// Check if a key exists in the cache
    async fn contains(&self, key: &str) -> bool;

    /// Remove a key from the cache
    async fn remove(&self, key: &str) -> Result<()>;

    /// Remove every key starting with `prefix`
    async fn remove_prefix(&self, prefix: &str) -> Result<()>;

    /// Clear all cached content
    async fn clear(&self) -> Result<()>;
}

struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

/// In-memory cache implementation
pub struct MemoryCache {
    store: Arc<RwLock<HashMap<String, Entry>>>,
    ttl: Option<Duration>,
}

impl MemoryCache {
    /// Entries never expire on their own
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
            ttl: None,
        }
    }

    /// Entries expire `ttl` after they were stored
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::new()
        }
    }

    pub async fn len(&self) -> usize {
        let store = self.store.read().await;
        store.values().filter(|entry| entry.is_live()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let store = self.store.read().await;
        Ok(store
            .get(key)
            .filter(|entry| entry.is_live())
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        let mut store = self.store.write().await;
        // Expired entries are only dropped on writes
        store.retain(|_, entry| entry.is_live());
        store.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: self.ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn contains(&self, key: &str) -> bool {
        let store = self.store.read().await;
        store.get(key).map_or(false, |entry| entry.is_live())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut store = self.store.write().await;
        store.remove(key);
        Ok(())
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<()> {
        let mut store = self.store.write().await;
        store.retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut store = self.store.write().await;
        store.clear();
        Ok(())
    }
}

/// No-op cache that doesn't cache anything
pub struct NoCache;

#[async_trait]
impl Cache for NoCache {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Bytes) -> Result<()> {
        Ok(())
    }

    async fn contains(&self, _key: &str) -> bool {
        false
    }

    async fn remove(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn remove_prefix(&self, _prefix: &str) -> Result<()> {
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }
}
