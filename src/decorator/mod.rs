//! Wrappers that add behavior around any [`ContentProvider`].
//!
//! Each decorator implements the same trait as what it wraps, so callers
//! never know how many layers sit in front of the real provider.

mod caching;
mod errors;
mod logging;

pub use self::caching::CachingProvider;
pub use self::errors::ErrorNormalizingProvider;
pub use self::logging::LoggingProvider;

use std::sync::Arc;

use crate::{cache::Cache, provider::ContentProvider};

/// Wrap `inner` in the conventional order, outermost first:
/// fault normalization, logging, then caching when a cache is given.
pub fn decorate(inner: Arc<dyn ContentProvider>, cache: Option<Arc<dyn Cache>>) -> Arc<dyn ContentProvider> {
    let provider: Arc<dyn ContentProvider> = match cache {
        Some(cache) => Arc::new(CachingProvider::new(inner, cache)),
        None => inner,
    };
    let provider = Arc::new(LoggingProvider::new(provider));
    Arc::new(ErrorNormalizingProvider::new(provider))
}
