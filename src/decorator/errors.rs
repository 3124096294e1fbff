use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{ContentError, Result},
    model::{ContentItem, ContentQuery, ContentUpdate, DirectoryItem, NewContent, QueryResult, TermCount},
    provider::ContentProvider,
};

/// Turns every failure of the inner provider into [`ContentError::ProviderFault`]
///
/// The original error is kept as the source. Errors that are already a
/// `ProviderFault` pass through untouched. A panic inside the inner call is
/// caught and reported as a fault whose cause is [`ContentError::Panicked`].
pub struct ErrorNormalizingProvider {
    inner: Arc<dyn ContentProvider>,
}

impl ErrorNormalizingProvider {
    pub fn new(inner: Arc<dyn ContentProvider>) -> Self {
        Self { inner }
    }

    fn fault(&self, operation: &'static str, source: ContentError) -> ContentError {
        ContentError::ProviderFault {
            provider: self.inner.id().to_string(),
            operation,
            source: Box::new(source),
        }
    }

    async fn guard<T, Fut>(&self, operation: &'static str, call: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e @ ContentError::ProviderFault { .. })) => Err(e),
            Ok(Err(e)) => Err(self.fault(operation, e)),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(provider = self.inner.id(), operation, %message, "Provider panicked");
                Err(self.fault(
                    operation,
                    ContentError::Panicked {
                        provider: self.inner.id().to_string(),
                        operation,
                        message,
                    },
                ))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[async_trait]
impl ContentProvider for ErrorNormalizingProvider {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }

    async fn get_all_items(&self, cancel: &CancellationToken) -> Result<Vec<ContentItem>> {
        self.guard("get_all_items", self.inner.get_all_items(cancel)).await
    }

    async fn get_item_by_id(&self, id: &str, cancel: &CancellationToken) -> Result<Option<ContentItem>> {
        self.guard("get_item_by_id", self.inner.get_item_by_id(id, cancel)).await
    }

    async fn get_item_by_path(&self, path: &str, cancel: &CancellationToken) -> Result<Option<ContentItem>> {
        self.guard("get_item_by_path", self.inner.get_item_by_path(path, cancel)).await
    }

    async fn get_item_by_url(
        &self,
        url: &str,
        locale: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<ContentItem>> {
        self.guard("get_item_by_url", self.inner.get_item_by_url(url, locale, cancel))
            .await
    }

    async fn find_by_query(&self, query: &ContentQuery, cancel: &CancellationToken) -> Result<QueryResult> {
        self.guard("find_by_query", self.inner.find_by_query(query, cancel)).await
    }

    async fn get_directories(&self, locale: Option<&str>, cancel: &CancellationToken) -> Result<Vec<DirectoryItem>> {
        self.guard("get_directories", self.inner.get_directories(locale, cancel)).await
    }

    async fn get_directory_by_path(&self, path: &str, cancel: &CancellationToken) -> Result<Option<DirectoryItem>> {
        self.guard("get_directory_by_path", self.inner.get_directory_by_path(path, cancel))
            .await
    }

    async fn get_directory_by_id(&self, id: &str, cancel: &CancellationToken) -> Result<Option<DirectoryItem>> {
        self.guard("get_directory_by_id", self.inner.get_directory_by_id(id, cancel))
            .await
    }

    async fn get_directory_by_url(
        &self,
        url: &str,
        locale: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<DirectoryItem>> {
        self.guard(
            "get_directory_by_url",
            self.inner.get_directory_by_url(url, locale, cancel),
        )
        .await
    }

    async fn get_tags(&self, locale: Option<&str>, cancel: &CancellationToken) -> Result<Vec<TermCount>> {
        self.guard("get_tags", self.inner.get_tags(locale, cancel)).await
    }

    async fn get_categories(&self, locale: Option<&str>, cancel: &CancellationToken) -> Result<Vec<TermCount>> {
        self.guard("get_categories", self.inner.get_categories(locale, cancel)).await
    }

    async fn create_content(&self, content: NewContent, cancel: &CancellationToken) -> Result<ContentItem> {
        self.guard("create_content", self.inner.create_content(content, cancel)).await
    }

    async fn update_content(
        &self,
        id: &str,
        update: ContentUpdate,
        cancel: &CancellationToken,
    ) -> Result<ContentItem> {
        self.guard("update_content", self.inner.update_content(id, update, cancel))
            .await
    }

    async fn delete_content(&self, id: &str, message: Option<&str>, cancel: &CancellationToken) -> Result<()> {
        self.guard("delete_content", self.inner.delete_content(id, message, cancel))
            .await
    }

    async fn refresh(&self, cancel: &CancellationToken) -> Result<()> {
        self.guard("refresh", self.inner.refresh(cancel)).await
    }

    async fn catalog_generation(&self, cancel: &CancellationToken) -> Result<u64> {
        self.guard("catalog_generation", self.inner.catalog_generation(cancel))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorator::testing::{item, Behavior, StubProvider};

    fn failing(make: fn() -> ContentError) -> ErrorNormalizingProvider {
        ErrorNormalizingProvider::new(Arc::new(
            StubProvider::new(Vec::new()).with_behavior(Behavior::Fail(make)),
        ))
    }

    #[tokio::test]
    async fn test_fault_wraps_original_cause() {
        let provider = failing(|| ContentError::TransientNetwork {
            message: "connection reset".to_string(),
            source: None,
        });

        let err = provider
            .get_item_by_id("a", &CancellationToken::new())
            .await
            .unwrap_err();

        match &err {
            ContentError::ProviderFault {
                provider,
                operation,
                source,
            } => {
                assert_eq!(provider, "stub");
                assert_eq!(*operation, "get_item_by_id");
                assert!(matches!(**source, ContentError::TransientNetwork { .. }));
            }
            other => panic!("expected ProviderFault, got {:?}", other),
        }
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_existing_fault_is_not_wrapped_again() {
        let provider = failing(|| ContentError::ProviderFault {
            provider: "inner".to_string(),
            operation: "refresh",
            source: Box::new(ContentError::Cancelled),
        });

        let err = provider.refresh(&CancellationToken::new()).await.unwrap_err();

        match err {
            ContentError::ProviderFault { provider, source, .. } => {
                assert_eq!(provider, "inner");
                assert!(matches!(*source, ContentError::Cancelled));
            }
            other => panic!("expected ProviderFault, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_panic_becomes_fault() {
        let provider = ErrorNormalizingProvider::new(Arc::new(
            StubProvider::new(vec![item("a", "docs/a.md")]).with_behavior(Behavior::Panic),
        ));

        let err = provider
            .get_tags(None, &CancellationToken::new())
            .await
            .unwrap_err();

        match err.root_cause() {
            ContentError::Panicked { operation, message, .. } => {
                assert_eq!(*operation, "get_tags");
                assert!(message.contains("exploded"));
            }
            other => panic!("expected Panicked, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_success_and_misses_pass_through() {
        let provider = ErrorNormalizingProvider::new(Arc::new(StubProvider::new(vec![item("a", "docs/a.md")])));
        let cancel = CancellationToken::new();

        assert!(provider.get_item_by_id("a", &cancel).await.unwrap().is_some());
        assert!(provider.get_item_by_id("b", &cancel).await.unwrap().is_none());
    }
}
