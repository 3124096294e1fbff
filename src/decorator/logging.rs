use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    error::Result,
    model::{ContentItem, ContentQuery, ContentUpdate, DirectoryItem, NewContent, QueryResult, TermCount},
    provider::ContentProvider,
};

/// Result shapes the logging decorator can count
trait Counted {
    fn count(&self) -> usize;
}

impl<T> Counted for Vec<T> {
    fn count(&self) -> usize {
        self.len()
    }
}

impl<T> Counted for Option<T> {
    fn count(&self) -> usize {
        usize::from(self.is_some())
    }
}

impl Counted for QueryResult {
    fn count(&self) -> usize {
        self.items.len()
    }
}

impl Counted for ContentItem {
    fn count(&self) -> usize {
        1
    }
}

impl Counted for () {
    fn count(&self) -> usize {
        0
    }
}

/// Logs every call with its duration and result size; never alters results
pub struct LoggingProvider {
    inner: Arc<dyn ContentProvider>,
}

impl LoggingProvider {
    pub fn new(inner: Arc<dyn ContentProvider>) -> Self {
        Self { inner }
    }

    async fn observe<T, Fut>(&self, operation: &'static str, call: Fut) -> Result<T>
    where
        T: Counted,
        Fut: Future<Output = Result<T>>,
    {
        let provider = self.inner.id();
        let started = Instant::now();
        tracing::debug!(provider, operation, "Provider call started");

        let result = call.await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(value) => {
                tracing::debug!(provider, operation, elapsed_ms, count = value.count(), "Provider call finished")
            }
            Err(e) if e.is_cancelled() => {
                tracing::debug!(provider, operation, elapsed_ms, "Provider call cancelled")
            }
            Err(e) => tracing::warn!(provider, operation, elapsed_ms, error = %e, "Provider call failed"),
        }
        result
    }
}

#[async_trait]
impl ContentProvider for LoggingProvider {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }

    async fn get_all_items(&self, cancel: &CancellationToken) -> Result<Vec<ContentItem>> {
        self.observe("get_all_items", self.inner.get_all_items(cancel)).await
    }

    async fn get_item_by_id(&self, id: &str, cancel: &CancellationToken) -> Result<Option<ContentItem>> {
        self.observe("get_item_by_id", self.inner.get_item_by_id(id, cancel)).await
    }

    async fn get_item_by_path(&self, path: &str, cancel: &CancellationToken) -> Result<Option<ContentItem>> {
        self.observe("get_item_by_path", self.inner.get_item_by_path(path, cancel))
            .await
    }

    async fn get_item_by_url(
        &self,
        url: &str,
        locale: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<ContentItem>> {
        self.observe("get_item_by_url", self.inner.get_item_by_url(url, locale, cancel))
            .await
    }

    async fn find_by_query(&self, query: &ContentQuery, cancel: &CancellationToken) -> Result<QueryResult> {
        self.observe("find_by_query", self.inner.find_by_query(query, cancel)).await
    }

    async fn get_directories(&self, locale: Option<&str>, cancel: &CancellationToken) -> Result<Vec<DirectoryItem>> {
        self.observe("get_directories", self.inner.get_directories(locale, cancel))
            .await
    }

    async fn get_directory_by_path(&self, path: &str, cancel: &CancellationToken) -> Result<Option<DirectoryItem>> {
        self.observe("get_directory_by_path", self.inner.get_directory_by_path(path, cancel))
            .await
    }

    async fn get_directory_by_id(&self, id: &str, cancel: &CancellationToken) -> Result<Option<DirectoryItem>> {
        self.observe("get_directory_by_id", self.inner.get_directory_by_id(id, cancel))
            .await
    }

    async fn get_directory_by_url(
        &self,
        url: &str,
        locale: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<DirectoryItem>> {
        self.observe(
            "get_directory_by_url",
            self.inner.get_directory_by_url(url, locale, cancel),
        )
        .await
    }

    async fn get_tags(&self, locale: Option<&str>, cancel: &CancellationToken) -> Result<Vec<TermCount>> {
        self.observe("get_tags", self.inner.get_tags(locale, cancel)).await
    }

    async fn get_categories(&self, locale: Option<&str>, cancel: &CancellationToken) -> Result<Vec<TermCount>> {
        self.observe("get_categories", self.inner.get_categories(locale, cancel))
            .await
    }

    async fn create_content(&self, content: NewContent, cancel: &CancellationToken) -> Result<ContentItem> {
        self.observe("create_content", self.inner.create_content(content, cancel))
            .await
    }

    async fn update_content(
        &self,
        id: &str,
        update: ContentUpdate,
        cancel: &CancellationToken,
    ) -> Result<ContentItem> {
        self.observe("update_content", self.inner.update_content(id, update, cancel))
            .await
    }

    async fn delete_content(&self, id: &str, message: Option<&str>, cancel: &CancellationToken) -> Result<()> {
        self.observe("delete_content", self.inner.delete_content(id, message, cancel))
            .await
    }

    async fn refresh(&self, cancel: &CancellationToken) -> Result<()> {
        self.observe("refresh", self.inner.refresh(cancel)).await
    }

    async fn catalog_generation(&self, cancel: &CancellationToken) -> Result<u64> {
        self.inner.catalog_generation(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorator::testing::{item, Behavior, StubProvider};
    use crate::error::ContentError;

    #[tokio::test]
    async fn test_results_pass_through_unchanged() {
        let stub = Arc::new(StubProvider::new(vec![item("a", "docs/a.md")]));
        let provider = LoggingProvider::new(stub.clone());
        let cancel = CancellationToken::new();

        let items = provider.get_all_items(&cancel).await.unwrap();
        let missing = provider.get_item_by_id("nope", &cancel).await.unwrap();

        assert_eq!(items, stub.items);
        assert!(missing.is_none());
        assert_eq!(stub.total_calls(), 2);
        assert_eq!(provider.id(), "stub");
    }

    #[tokio::test]
    async fn test_errors_pass_through_unchanged() {
        let stub = Arc::new(StubProvider::new(Vec::new()).with_behavior(Behavior::Fail(|| {
            ContentError::RateLimited {
                message: "slow down".to_string(),
            }
        })));
        let provider = LoggingProvider::new(stub);

        let err = provider.refresh(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ContentError::RateLimited { .. }));
    }

    #[test]
    fn test_counts() {
        assert_eq!(Some(1).count(), 1);
        assert_eq!(None::<u8>.count(), 0);
        assert_eq!(vec![1, 2, 3].count(), 3);
        assert_eq!(().count(), 0);
    }
}
