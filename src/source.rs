use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    error::Result,
    types::{DirectoryListing, FileContent, WriteReceipt},
};

/// Read access to a remote file tree
///
/// Implementors report failures verbatim (`NotFound`, `RateLimited`,
/// `Unauthorized`, `TransientNetwork`) and never retry or cache; both are the
/// caller's business.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch a single file by its repository path
    ///
    /// Returns `ContentError::NotFound` if the file doesn't exist
    async fn fetch_file(&self, path: &str) -> Result<FileContent>;

    /// List the contents of a directory in upstream order
    ///
    /// Returns `ContentError::NotFound` if the directory doesn't exist
    async fn list_directory(&self, path: &str) -> Result<DirectoryListing>;

    /// Get a human-readable identifier for this source (for logging/debugging)
    fn identifier(&self) -> String;
}

/// Minimal write contract for sources that accept changes
#[async_trait]
pub trait ContentWriter: Send + Sync {
    /// Create or replace a file
    ///
    /// `sha` must be the current blob SHA when replacing an existing file.
    async fn put_file(
        &self,
        path: &str,
        content: Bytes,
        message: &str,
        sha: Option<&str>,
    ) -> Result<WriteReceipt>;

    /// Delete a file at a known blob SHA
    async fn delete_file(&self, path: &str, message: &str, sha: &str) -> Result<()>;
}
