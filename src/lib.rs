pub mod cache;
pub mod catalog;
pub mod config;
pub mod decorator;
pub mod error;
pub mod front_matter;
pub mod github;
pub mod model;
pub mod paths;
pub mod provider;
pub mod registry;
pub mod source;
pub mod tree;
pub mod types;

pub use cache::{Cache, MemoryCache, NoCache};
pub use catalog::{CatalogCache, RefreshPolicy, Snapshot};
pub use config::{CacheSettings, CatalogSettings, GitHubSettings, ProviderSettings, Settings};
pub use decorator::{decorate, CachingProvider, ErrorNormalizingProvider, LoggingProvider};
pub use error::{ContentError, Result};
pub use front_matter::{Document, FrontMatter};
pub use github::GitHubSource;
pub use model::{
    ContentItem, ContentQuery, ContentStatus, ContentUpdate, DirectoryItem, NewContent, QueryResult, SortDirection,
    SortField, TermCount,
};
pub use paths::Localization;
pub use provider::{ContentProvider, GitContentProvider};
pub use registry::ProviderRegistry;
pub use source::{ContentSource, ContentWriter};
pub use tree::{Catalog, TreeBuilder};
pub use types::{DirectoryEntry, DirectoryListing, EntryType, FileContent, WriteReceipt};
pub use tokio_util::sync::CancellationToken;
