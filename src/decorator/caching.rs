use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    cache::Cache,
    error::Result,
    model::{ContentItem, ContentQuery, ContentUpdate, DirectoryItem, NewContent, QueryResult, TermCount},
    provider::ContentProvider,
};

/// Cache-aside around single-item and single-directory lookups
///
/// Keys look like `content:{provider}:{generation}:{operation}:{argument}`
/// and values are JSON. The generation is the inner provider's catalog
/// generation, so entries never outlive the catalog they were read from;
/// seeing a new generation also evicts the old entries. Misses are not
/// cached. A successful write or refresh evicts every key of this provider.
/// A failing cache only costs a trip to the inner provider.
pub struct CachingProvider {
    inner: Arc<dyn ContentProvider>,
    cache: Arc<dyn Cache>,
    /// Last catalog generation a lookup was keyed under
    seen: AtomicU64,
}

const UNSEEN: u64 = u64::MAX;

impl CachingProvider {
    pub fn new(inner: Arc<dyn ContentProvider>, cache: Arc<dyn Cache>) -> Self {
        Self {
            inner,
            cache,
            seen: AtomicU64::new(UNSEEN),
        }
    }

    fn prefix(&self) -> String {
        format!("content:{}:", self.inner.id())
    }

    fn key(&self, generation: u64, operation: &str, argument: &str) -> String {
        format!("{}{}:{}:{}", self.prefix(), generation, operation, argument)
    }

    async fn cached<T, F, Fut>(
        &self,
        operation: &str,
        argument: &str,
        cancel: &CancellationToken,
        load: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let generation = self.inner.catalog_generation(cancel).await?;
        let previous = self.seen.swap(generation, Ordering::SeqCst);
        if previous != generation && previous != UNSEEN {
            tracing::debug!(provider = self.inner.id(), previous, generation, "Catalog changed; evicting lookups");
            self.evict().await;
        }

        let key = self.key(generation, operation, argument);
        match self.cache.get(&key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    tracing::trace!(%key, "Cache hit");
                    return Ok(Some(value));
                }
                Err(e) => tracing::warn!(%key, error = %e, "Discarding undecodable cache entry"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(%key, error = %e, "Cache read failed"),
        }

        let value = load().await?;
        if let Some(found) = &value {
            match serde_json::to_vec(found) {
                Ok(bytes) => {
                    if let Err(e) = self.cache.set(&key, Bytes::from(bytes)).await {
                        tracing::warn!(%key, error = %e, "Cache write failed");
                    }
                }
                Err(e) => tracing::warn!(%key, error = %e, "Could not serialize value for cache"),
            }
        }
        Ok(value)
    }

    async fn evict(&self) {
        let prefix = self.prefix();
        if let Err(e) = self.cache.remove_prefix(&prefix).await {
            tracing::warn!(%prefix, error = %e, "Cache eviction failed");
        }
    }
}

fn with_locale(value: &str, locale: Option<&str>) -> String {
    format!("{}@{}", value, locale.unwrap_or(""))
}

#[async_trait]
impl ContentProvider for CachingProvider {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }

    async fn get_all_items(&self, cancel: &CancellationToken) -> Result<Vec<ContentItem>> {
        self.inner.get_all_items(cancel).await
    }

    async fn get_item_by_id(&self, id: &str, cancel: &CancellationToken) -> Result<Option<ContentItem>> {
        self.cached("item_by_id", id, cancel, || self.inner.get_item_by_id(id, cancel))
            .await
    }

    async fn get_item_by_path(&self, path: &str, cancel: &CancellationToken) -> Result<Option<ContentItem>> {
        self.cached("item_by_path", path, cancel, || self.inner.get_item_by_path(path, cancel))
            .await
    }

    async fn get_item_by_url(
        &self,
        url: &str,
        locale: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<ContentItem>> {
        self.cached("item_by_url", &with_locale(url, locale), cancel, || {
            self.inner.get_item_by_url(url, locale, cancel)
        })
        .await
    }

    async fn find_by_query(&self, query: &ContentQuery, cancel: &CancellationToken) -> Result<QueryResult> {
        self.inner.find_by_query(query, cancel).await
    }

    async fn get_directories(&self, locale: Option<&str>, cancel: &CancellationToken) -> Result<Vec<DirectoryItem>> {
        self.inner.get_directories(locale, cancel).await
    }

    async fn get_directory_by_path(&self, path: &str, cancel: &CancellationToken) -> Result<Option<DirectoryItem>> {
        self.cached("directory_by_path", path, cancel, || {
            self.inner.get_directory_by_path(path, cancel)
        })
        .await
    }

    async fn get_directory_by_id(&self, id: &str, cancel: &CancellationToken) -> Result<Option<DirectoryItem>> {
        self.cached("directory_by_id", id, cancel, || self.inner.get_directory_by_id(id, cancel))
            .await
    }

    async fn get_directory_by_url(
        &self,
        url: &str,
        locale: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<DirectoryItem>> {
        self.cached("directory_by_url", &with_locale(url, locale), cancel, || {
            self.inner.get_directory_by_url(url, locale, cancel)
        })
        .await
    }

    async fn get_tags(&self, locale: Option<&str>, cancel: &CancellationToken) -> Result<Vec<TermCount>> {
        self.inner.get_tags(locale, cancel).await
    }

    async fn get_categories(&self, locale: Option<&str>, cancel: &CancellationToken) -> Result<Vec<TermCount>> {
        self.inner.get_categories(locale, cancel).await
    }

    async fn create_content(&self, content: NewContent, cancel: &CancellationToken) -> Result<ContentItem> {
        let created = self.inner.create_content(content, cancel).await?;
        self.evict().await;
        Ok(created)
    }

    async fn update_content(
        &self,
        id: &str,
        update: ContentUpdate,
        cancel: &CancellationToken,
    ) -> Result<ContentItem> {
        let updated = self.inner.update_content(id, update, cancel).await?;
        self.evict().await;
        Ok(updated)
    }

    async fn delete_content(&self, id: &str, message: Option<&str>, cancel: &CancellationToken) -> Result<()> {
        self.inner.delete_content(id, message, cancel).await?;
        self.evict().await;
        Ok(())
    }

    async fn refresh(&self, cancel: &CancellationToken) -> Result<()> {
        self.inner.refresh(cancel).await?;
        self.evict().await;
        Ok(())
    }

    async fn catalog_generation(&self, cancel: &CancellationToken) -> Result<u64> {
        self.inner.catalog_generation(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::decorator::testing::{item, Behavior, StubProvider};
    use crate::error::ContentError;
    use crate::front_matter::FrontMatter;

    fn setup() -> (Arc<StubProvider>, Arc<MemoryCache>, CachingProvider) {
        let stub = Arc::new(StubProvider::new(vec![item("a", "docs/a.md"), item("b", "docs/b.md")]));
        let cache = Arc::new(MemoryCache::new());
        let provider = CachingProvider::new(stub.clone(), cache.clone());
        (stub, cache, provider)
    }

    #[tokio::test]
    async fn test_second_lookup_is_served_from_cache() {
        let (stub, cache, provider) = setup();
        let cancel = CancellationToken::new();

        let first = provider.get_item_by_id("a", &cancel).await.unwrap();
        let second = provider.get_item_by_id("a", &cancel).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.unwrap().path, "docs/a.md");
        assert_eq!(stub.calls("get_item_by_id"), 1);
        assert!(cache.contains("content:stub:1:item_by_id:a").await);
    }

    #[tokio::test]
    async fn test_misses_are_not_cached() {
        let (stub, cache, provider) = setup();
        let cancel = CancellationToken::new();

        assert!(provider.get_item_by_path("docs/zzz.md", &cancel).await.unwrap().is_none());
        assert!(provider.get_item_by_path("docs/zzz.md", &cancel).await.unwrap().is_none());

        assert_eq!(stub.calls("get_item_by_path"), 2);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_url_keys_include_locale() {
        let (stub, _cache, provider) = setup();
        let cancel = CancellationToken::new();

        provider.get_item_by_url("/a", Some("en"), &cancel).await.unwrap();
        provider.get_item_by_url("/a", Some("fr"), &cancel).await.unwrap();
        provider.get_item_by_url("/a", Some("en"), &cancel).await.unwrap();

        assert_eq!(stub.calls("get_item_by_url"), 2);
    }

    #[tokio::test]
    async fn test_write_evicts_provider_keys() {
        let (stub, cache, provider) = setup();
        let cancel = CancellationToken::new();
        cache.set("content:other:1:item_by_id:a", Bytes::from("{}")).await.unwrap();

        provider.get_item_by_id("a", &cancel).await.unwrap();
        provider
            .create_content(
                NewContent {
                    path: "docs/c.md".to_string(),
                    front_matter: FrontMatter::default(),
                    body: String::new(),
                    message: None,
                },
                &cancel,
            )
            .await
            .unwrap();
        provider.get_item_by_id("a", &cancel).await.unwrap();

        assert_eq!(stub.calls("get_item_by_id"), 2);
        assert!(cache.contains("content:other:1:item_by_id:a").await);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_entries() {
        let stub = Arc::new(
            StubProvider::new(vec![item("a", "docs/a.md")])
                .with_behavior(Behavior::Fail(|| ContentError::Unauthorized {
                    message: "no token".to_string(),
                })),
        );
        let cache = Arc::new(MemoryCache::new());
        cache.set("content:stub:1:item_by_id:a", Bytes::from("{}")).await.unwrap();
        let provider = CachingProvider::new(stub, cache.clone());

        let result = provider.delete_content("a", None, &CancellationToken::new()).await;

        assert!(matches!(result, Err(ContentError::Unauthorized { .. })));
        assert!(cache.contains("content:stub:1:item_by_id:a").await);
    }

    #[tokio::test]
    async fn test_rebuilt_catalog_drops_cached_lookups() {
        let (stub, cache, provider) = setup();
        let cancel = CancellationToken::new();

        provider.get_item_by_id("a", &cancel).await.unwrap();
        stub.rebuild();
        provider.get_item_by_id("a", &cancel).await.unwrap();

        assert_eq!(stub.calls("get_item_by_id"), 2);
        assert!(!cache.contains("content:stub:1:item_by_id:a").await);
        assert!(cache.contains("content:stub:2:item_by_id:a").await);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_entries() {
        let stub = Arc::new(
            StubProvider::new(vec![item("a", "docs/a.md")]).with_behavior(Behavior::Fail(|| {
                ContentError::TransientNetwork {
                    message: "connection reset".to_string(),
                    source: None,
                }
            })),
        );
        let cache = Arc::new(MemoryCache::new());
        cache.set("content:stub:1:item_by_id:a", Bytes::from("{}")).await.unwrap();
        let provider = CachingProvider::new(stub, cache.clone());

        assert!(provider.refresh(&CancellationToken::new()).await.is_err());
        assert!(cache.contains("content:stub:1:item_by_id:a").await);
    }

    #[tokio::test]
    async fn test_collections_pass_through() {
        let (stub, _cache, provider) = setup();
        let cancel = CancellationToken::new();

        provider.get_all_items(&cancel).await.unwrap();
        provider.get_all_items(&cancel).await.unwrap();

        assert_eq!(stub.calls("get_all_items"), 2);
    }
}
