//! Settings for content providers.
//!
//! Loaded with precedence, highest first:
//!
//! 1. Environment variables (`CONTENT_` prefix, `__` for nesting)
//! 2. An optional TOML file
//! 3. Hardcoded defaults
//!
//! # Example Configuration
//!
//! ```toml
//! default_provider = "docs"
//!
//! [providers.docs.github]
//! owner = "acme"
//! repo = "handbook"
//! branch = "main"
//!
//! [providers.docs.catalog]
//! content_root = "content"
//! extensions = ["md", "markdown"]
//!
//! [providers.docs.catalog.localization]
//! enabled = true
//! default_locale = "en"
//! supported_locales = ["en", "fr"]
//!
//! [providers.docs.cache]
//! ttl_secs = 300
//! refresh_policy = "serve_stale"
//! ```
//!
//! `CONTENT_PROVIDERS__DOCS__GITHUB__TOKEN=...` supplies a token without
//! writing it to disk.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::{catalog::RefreshPolicy, error::Result, paths::Localization};

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Provider handed out by `ProviderRegistry::get_default`; the first
    /// configured provider when unset
    pub default_provider: Option<String>,
    pub providers: BTreeMap<String, ProviderSettings>,
}

impl Settings {
    /// Load defaults, then `path` (if given and present), then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        let settings = figment
            .merge(Env::prefixed("CONTENT_").split("__").lowercase(true))
            .extract()?;
        Ok(settings)
    }

    /// Parse settings from a TOML string, without consulting the environment
    pub fn from_toml(toml: &str) -> Result<Self> {
        let settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::string(toml))
            .extract()?;
        Ok(settings)
    }
}

/// One configured content provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub github: GitHubSettings,
    pub catalog: CatalogSettings,
    pub cache: CacheSettings,
    /// Refuse writes even when the source supports them
    pub read_only: bool,
}

/// Remote repository coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubSettings {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub token: Option<String>,
    pub api_base: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            branch: "main".to_string(),
            token: None,
            api_base: "https://api.github.com".to_string(),
            user_agent: "content-catalog/0.1".to_string(),
            timeout_secs: 30,
        }
    }
}

/// How files become a catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// Directory the tree is built from; stripped from public URLs
    pub content_root: String,
    /// File extensions (without dot) treated as content
    pub extensions: Vec<String>,
    /// File whose front matter describes its directory instead of being an item
    pub index_file: String,
    /// Concurrent file fetches per directory
    pub fetch_concurrency: usize,
    /// Skip files with malformed front matter instead of failing the build
    pub skip_invalid_front_matter: bool,
    pub localization: Localization,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            content_root: String::new(),
            extensions: vec!["md".to_string(), "markdown".to_string()],
            index_file: "_index.md".to_string(),
            fetch_concurrency: 4,
            skip_invalid_front_matter: false,
            localization: Localization::default(),
        }
    }
}

impl CatalogSettings {
    /// Whether a file name carries one of the configured extensions
    pub fn allows_extension(&self, name: &str) -> bool {
        let extension = match Path::new(name).extension() {
            Some(ext) => ext.to_string_lossy(),
            None => return false,
        };
        self.extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(&extension))
    }
}

/// Snapshot and keyed-cache lifetimes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Snapshot lifetime after a successful build
    pub ttl_secs: u64,
    pub refresh_policy: RefreshPolicy,
    /// Lifetime of entries stored by the caching decorator; 0 disables it
    pub item_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            refresh_policy: RefreshPolicy::default(),
            item_ttl_secs: 60,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn item_ttl(&self) -> Option<Duration> {
        (self.item_ttl_secs > 0).then(|| Duration::from_secs(self.item_ttl_secs))
    }
}
