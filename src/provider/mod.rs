//! The provider contract shared by concrete sources and decorators.

mod git;

pub use self::git::GitContentProvider;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    error::Result,
    model::{ContentItem, ContentQuery, ContentUpdate, DirectoryItem, NewContent, QueryResult, TermCount},
};

/// Read/query/write façade over one content source
///
/// Every call takes a cancellation token. Lookups return `Ok(None)` for a
/// legitimate miss and reserve `Err` for faults.
///
/// Writes go to the source and invalidate the catalog; they are not visible
/// to reads until the next rebuild.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Identifier this provider was registered under
    fn id(&self) -> &str;

    /// `true` when the source does not accept writes
    fn is_read_only(&self) -> bool;

    async fn get_all_items(&self, cancel: &CancellationToken) -> Result<Vec<ContentItem>>;

    async fn get_item_by_id(&self, id: &str, cancel: &CancellationToken) -> Result<Option<ContentItem>>;

    async fn get_item_by_path(&self, path: &str, cancel: &CancellationToken) -> Result<Option<ContentItem>>;

    /// Reverse of URL generation; `locale` disambiguates translated pages
    /// sharing one URL
    async fn get_item_by_url(
        &self,
        url: &str,
        locale: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<ContentItem>>;

    async fn find_by_query(&self, query: &ContentQuery, cancel: &CancellationToken) -> Result<QueryResult>;

    /// All directories, or those of one locale
    async fn get_directories(&self, locale: Option<&str>, cancel: &CancellationToken) -> Result<Vec<DirectoryItem>>;

    async fn get_directory_by_path(&self, path: &str, cancel: &CancellationToken) -> Result<Option<DirectoryItem>>;

    async fn get_directory_by_id(&self, id: &str, cancel: &CancellationToken) -> Result<Option<DirectoryItem>>;

    async fn get_directory_by_url(
        &self,
        url: &str,
        locale: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<DirectoryItem>>;

    async fn get_tags(&self, locale: Option<&str>, cancel: &CancellationToken) -> Result<Vec<TermCount>>;

    async fn get_categories(&self, locale: Option<&str>, cancel: &CancellationToken) -> Result<Vec<TermCount>>;

    /// Write a new file; returns the item as it will appear after the next
    /// rebuild
    async fn create_content(&self, content: NewContent, cancel: &CancellationToken) -> Result<ContentItem>;

    async fn update_content(
        &self,
        id: &str,
        update: ContentUpdate,
        cancel: &CancellationToken,
    ) -> Result<ContentItem>;

    async fn delete_content(&self, id: &str, message: Option<&str>, cancel: &CancellationToken) -> Result<()>;

    /// Rebuild the catalog now, regardless of expiry
    async fn refresh(&self, cancel: &CancellationToken) -> Result<()>;

    /// Generation of the catalog lookups are currently answered from.
    ///
    /// Changes whenever the catalog is rebuilt. Providers without a
    /// rebuildable catalog keep the default of 0.
    async fn catalog_generation(&self, _cancel: &CancellationToken) -> Result<u64> {
        Ok(0)
    }
}
