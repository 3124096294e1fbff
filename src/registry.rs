//! Named content providers and the default one.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::{
    cache::{Cache, MemoryCache, NoCache},
    config::{CacheSettings, Settings},
    decorator::decorate,
    error::{ContentError, Result},
    github::GitHubSource,
    provider::{ContentProvider, GitContentProvider},
};

/// Store behind the caching decorator; an item lifetime of 0 caches nothing
fn lookup_cache(settings: &CacheSettings) -> Arc<dyn Cache> {
    match settings.item_ttl() {
        Some(ttl) => Arc::new(MemoryCache::with_ttl(ttl)),
        None => Arc::new(NoCache),
    }
}

/// Builds a provider the first time it is requested
pub type ProviderFactory = Box<dyn Fn() -> Result<Arc<dyn ContentProvider>> + Send + Sync>;

struct Registration {
    factory: ProviderFactory,
    instance: OnceCell<Arc<dyn ContentProvider>>,
}

/// Holds every configured provider
///
/// Registration takes `&mut self`; lookups take `&self` and construct each
/// provider at most once, so a built registry can be shared behind an `Arc`.
/// Unknown ids are always `Err(NotRegistered)`.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Registration>,
    default: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One decorated GitHub provider per configured entry
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut registry = Self::new();
        for (id, provider_settings) in &settings.providers {
            let id = id.clone();
            let provider_settings = provider_settings.clone();
            registry.register(id.clone(), move || {
                let source = GitHubSource::from_settings(&provider_settings.github)?;
                let provider = GitContentProvider::from_github(id.clone(), source, &provider_settings);
                Ok(decorate(Arc::new(provider), Some(lookup_cache(&provider_settings.cache))))
            });
        }

        if let Some(default) = &settings.default_provider {
            registry.set_default(default).map_err(|_| ContentError::InvalidConfig {
                message: format!("default_provider '{}' is not a configured provider", default),
            })?;
        }
        Ok(registry)
    }

    /// Register a factory under `id`, replacing any earlier registration.
    /// The first id ever registered becomes the default.
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Arc<dyn ContentProvider>> + Send + Sync + 'static,
    {
        let id = id.into();
        if self.default.is_none() {
            self.default = Some(id.clone());
        }
        let replaced = self
            .providers
            .insert(
                id.clone(),
                Registration {
                    factory: Box::new(factory),
                    instance: OnceCell::new(),
                },
            )
            .is_some();
        tracing::debug!(provider = %id, replaced, "Content provider registered");
    }

    /// Register an already built provider under its own id
    pub fn register_instance(&mut self, provider: Arc<dyn ContentProvider>) {
        let id = provider.id().to_string();
        self.register(id, move || Ok(provider.clone()));
    }

    /// Provider registered as `id`, built on first use
    pub async fn get(&self, id: &str) -> Result<Arc<dyn ContentProvider>> {
        let registration = self
            .providers
            .get(id)
            .ok_or_else(|| ContentError::NotRegistered { id: id.to_string() })?;
        let provider = registration
            .instance
            .get_or_try_init(|| async {
                tracing::debug!(provider = %id, "Constructing content provider");
                (registration.factory)()
            })
            .await?;
        Ok(provider.clone())
    }

    pub async fn get_default(&self) -> Result<Arc<dyn ContentProvider>> {
        match &self.default {
            Some(id) => self.get(id).await,
            None => Err(ContentError::NotRegistered {
                id: "<default>".to_string(),
            }),
        }
    }

    pub fn set_default(&mut self, id: &str) -> Result<()> {
        if !self.providers.contains_key(id) {
            return Err(ContentError::NotRegistered { id: id.to_string() });
        }
        self.default = Some(id.to_string());
        Ok(())
    }

    pub fn default_id(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Registered ids in sorted order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}
