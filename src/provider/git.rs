use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::ContentProvider;
use crate::{
    catalog::{CatalogCache, Snapshot},
    config::{CacheSettings, CatalogSettings, ProviderSettings},
    error::{ContentError, Result},
    front_matter::{self, Document},
    github::GitHubSource,
    model::{ContentItem, ContentQuery, ContentUpdate, DirectoryItem, NewContent, QueryResult, TermCount},
    paths::normalize_path,
    source::{ContentSource, ContentWriter},
    tree::{content_item, TreeBuilder},
};

/// Provider over a Git-hosted file tree
///
/// Reads are served from the [`CatalogCache`] snapshot, which is rebuilt by
/// the [`TreeBuilder`] on expiry. Writes go through the optional
/// [`ContentWriter`] and invalidate the snapshot once they succeed.
pub struct GitContentProvider {
    id: String,
    builder: TreeBuilder,
    writer: Option<Arc<dyn ContentWriter>>,
    cache: CatalogCache,
}

impl GitContentProvider {
    /// Read-only provider; add a writer with [`with_writer`](Self::with_writer)
    pub fn new(
        id: impl Into<String>,
        source: Arc<dyn ContentSource>,
        settings: CatalogSettings,
        cache: &CacheSettings,
    ) -> Self {
        let id = id.into();
        Self {
            builder: TreeBuilder::new(source, id.clone(), settings),
            writer: None,
            cache: CatalogCache::new(cache.ttl(), cache.refresh_policy),
            id,
        }
    }

    pub fn with_writer(mut self, writer: Arc<dyn ContentWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Wire a GitHub source as both reader and (unless `read_only`) writer
    pub fn from_github(id: impl Into<String>, source: GitHubSource, settings: &ProviderSettings) -> Self {
        let source = Arc::new(source);
        let provider = Self::new(id, source.clone(), settings.catalog.clone(), &settings.cache);
        if settings.read_only {
            provider
        } else {
            provider.with_writer(source)
        }
    }

    pub fn catalog_cache(&self) -> &CatalogCache {
        &self.cache
    }

    /// Current snapshot, rebuilding it first when expired or invalidated
    pub async fn snapshot(&self, cancel: &CancellationToken) -> Result<Arc<Snapshot>> {
        self.cache
            .get_or_refresh(false, cancel, || self.builder.build(cancel))
            .await
    }

    fn settings(&self) -> &CatalogSettings {
        self.builder.settings()
    }

    fn writer(&self) -> Result<&Arc<dyn ContentWriter>> {
        self.writer.as_ref().ok_or_else(|| ContentError::ReadOnly {
            provider: self.id.clone(),
        })
    }

    /// Normalize a write target and check it is content this provider owns
    fn validate_path(&self, path: &str) -> Result<String> {
        let path = normalize_path(path);
        let settings = self.settings();
        if path.is_empty() {
            return Err(ContentError::validation("content path is empty"));
        }
        if !settings.allows_extension(&path) {
            return Err(ContentError::validation(format!(
                "{} does not have an allowed extension ({})",
                path,
                settings.extensions.join(", ")
            )));
        }
        let root = normalize_path(&settings.content_root);
        if !root.is_empty() && !path.starts_with(&format!("{}/", root)) {
            return Err(ContentError::validation(format!("{} is outside content root {}", path, root)));
        }
        Ok(path)
    }

    fn render(document: &Document) -> Result<Bytes> {
        if document.front_matter.title.as_deref().map_or(true, |t| t.trim().is_empty()) {
            return Err(ContentError::validation("content requires a title"));
        }
        Ok(Bytes::from(front_matter::render(&document.front_matter, &document.body)?))
    }

    async fn existing(&self, id: &str, cancel: &CancellationToken) -> Result<ContentItem> {
        let snapshot = self.snapshot(cancel).await?;
        snapshot
            .catalog()
            .item(id)
            .cloned()
            .ok_or_else(|| ContentError::NotFound { path: id.to_string() })
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(ContentError::Cancelled);
    }
    Ok(())
}

#[async_trait]
impl ContentProvider for GitContentProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_read_only(&self) -> bool {
        self.writer.is_none()
    }

    async fn get_all_items(&self, cancel: &CancellationToken) -> Result<Vec<ContentItem>> {
        Ok(self.snapshot(cancel).await?.catalog().items().to_vec())
    }

    async fn get_item_by_id(&self, id: &str, cancel: &CancellationToken) -> Result<Option<ContentItem>> {
        Ok(self.snapshot(cancel).await?.catalog().item(id).cloned())
    }

    async fn get_item_by_path(&self, path: &str, cancel: &CancellationToken) -> Result<Option<ContentItem>> {
        Ok(self.snapshot(cancel).await?.catalog().item_by_path(path).cloned())
    }

    async fn get_item_by_url(
        &self,
        url: &str,
        locale: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<ContentItem>> {
        Ok(self.snapshot(cancel).await?.catalog().item_by_url(url, locale).cloned())
    }

    async fn find_by_query(&self, query: &ContentQuery, cancel: &CancellationToken) -> Result<QueryResult> {
        Ok(query.apply(self.snapshot(cancel).await?.catalog().items()))
    }

    async fn get_directories(&self, locale: Option<&str>, cancel: &CancellationToken) -> Result<Vec<DirectoryItem>> {
        let snapshot = self.snapshot(cancel).await?;
        Ok(snapshot.catalog().directories_for(locale).into_iter().cloned().collect())
    }

    async fn get_directory_by_path(&self, path: &str, cancel: &CancellationToken) -> Result<Option<DirectoryItem>> {
        Ok(self.snapshot(cancel).await?.catalog().directory_by_path(path).cloned())
    }

    async fn get_directory_by_id(&self, id: &str, cancel: &CancellationToken) -> Result<Option<DirectoryItem>> {
        Ok(self.snapshot(cancel).await?.catalog().directory(id).cloned())
    }

    async fn get_directory_by_url(
        &self,
        url: &str,
        locale: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<DirectoryItem>> {
        Ok(self.snapshot(cancel).await?.catalog().directory_by_url(url, locale).cloned())
    }

    async fn get_tags(&self, locale: Option<&str>, cancel: &CancellationToken) -> Result<Vec<TermCount>> {
        Ok(self.snapshot(cancel).await?.catalog().tags(locale))
    }

    async fn get_categories(&self, locale: Option<&str>, cancel: &CancellationToken) -> Result<Vec<TermCount>> {
        Ok(self.snapshot(cancel).await?.catalog().categories(locale))
    }

    async fn create_content(&self, content: NewContent, cancel: &CancellationToken) -> Result<ContentItem> {
        let writer = self.writer()?;
        let path = self.validate_path(&content.path)?;
        let document = Document {
            front_matter: content.front_matter,
            body: content.body,
        };
        let bytes = Self::render(&document)?;
        let message = content.message.unwrap_or_else(|| format!("Create {}", path));
        check_cancelled(cancel)?;

        // Once the request is out the write runs to completion
        let receipt = writer.put_file(&path, bytes, &message, None).await?;
        self.cache.invalidate();
        tracing::info!(provider = %self.id, %path, sha = %receipt.sha, "Content created");

        Ok(content_item(&self.id, self.settings(), &path, &receipt.sha, document))
    }

    async fn update_content(
        &self,
        id: &str,
        update: ContentUpdate,
        cancel: &CancellationToken,
    ) -> Result<ContentItem> {
        let writer = self.writer()?;
        let current = self.existing(id, cancel).await?;
        let document = Document {
            front_matter: update.front_matter,
            body: update.body,
        };
        let bytes = Self::render(&document)?;
        let message = update.message.unwrap_or_else(|| format!("Update {}", current.path));
        check_cancelled(cancel)?;

        let receipt = writer
            .put_file(&current.path, bytes, &message, Some(&current.sha))
            .await?;
        self.cache.invalidate();
        tracing::info!(provider = %self.id, path = %current.path, sha = %receipt.sha, "Content updated");

        Ok(content_item(&self.id, self.settings(), &current.path, &receipt.sha, document))
    }

    async fn delete_content(&self, id: &str, message: Option<&str>, cancel: &CancellationToken) -> Result<()> {
        let writer = self.writer()?;
        let current = self.existing(id, cancel).await?;
        let message = message
            .map(str::to_string)
            .unwrap_or_else(|| format!("Delete {}", current.path));
        check_cancelled(cancel)?;

        writer.delete_file(&current.path, &message, &current.sha).await?;
        self.cache.invalidate();
        tracing::info!(provider = %self.id, path = %current.path, "Content deleted");
        Ok(())
    }

    async fn refresh(&self, cancel: &CancellationToken) -> Result<()> {
        self.cache
            .get_or_refresh(true, cancel, || self.builder.build(cancel))
            .await?;
        Ok(())
    }

    async fn catalog_generation(&self, cancel: &CancellationToken) -> Result<u64> {
        Ok(self.snapshot(cancel).await?.generation())
    }
}
