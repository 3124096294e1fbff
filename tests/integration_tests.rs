/// Integration tests for the content catalog pipeline
///
/// Everything runs against an in-memory repository, wired the same way the
/// registry wires a GitHub-backed provider.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use content_catalog::{
    decorate, CacheSettings, CancellationToken, CatalogSettings, ContentError, ContentProvider, ContentQuery,
    ContentSource, ContentUpdate, ContentWriter, DirectoryEntry, DirectoryListing, EntryType, FileContent,
    FrontMatter, GitContentProvider, MemoryCache, NewContent, ProviderRegistry, SortDirection, SortField,
    WriteReceipt,
};
use tokio_test::{assert_err, assert_ok};

/// Files keyed by path, with a sha that changes on every write
#[derive(Default)]
struct MemoryRepo {
    files: Mutex<BTreeMap<String, (String, String)>>,
    revision: AtomicUsize,
    listings: AtomicUsize,
    offline: AtomicBool,
}

impl MemoryRepo {
    fn with_files(files: &[(&str, &str)]) -> Arc<Self> {
        let repo = Self::default();
        for (path, text) in files {
            repo.store(path, text);
        }
        Arc::new(repo)
    }

    fn store(&self, path: &str, text: &str) -> String {
        let sha = format!("sha{}", self.revision.fetch_add(1, Ordering::SeqCst));
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), (text.to_string(), sha.clone()));
        sha
    }

    fn text(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).map(|(text, _)| text.clone())
    }

    fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    fn check_sha(&self, path: &str, sha: Option<&str>) -> content_catalog::Result<()> {
        let files = self.files.lock().unwrap();
        let current = files.get(path).map(|(_, sha)| sha.as_str());
        if current != sha {
            return Err(ContentError::ValidationFailed {
                message: format!("{} is at {:?}, not {:?}", path, current, sha),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContentSource for MemoryRepo {
    async fn fetch_file(&self, path: &str) -> content_catalog::Result<FileContent> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .map(|(text, sha)| FileContent {
                content: Bytes::from(text.clone()),
                path: path.to_string(),
                sha: sha.clone(),
            })
            .ok_or_else(|| ContentError::NotFound { path: path.to_string() })
    }

    async fn list_directory(&self, path: &str) -> content_catalog::Result<DirectoryListing> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(ContentError::TransientNetwork {
                message: "connection refused".to_string(),
                source: None,
            });
        }

        let prefix = if path.is_empty() { String::new() } else { format!("{}/", path) };
        let mut names: BTreeMap<String, EntryType> = BTreeMap::new();
        for key in self.files.lock().unwrap().keys() {
            if let Some(rest) = key.strip_prefix(&prefix) {
                match rest.split_once('/') {
                    Some((dir, _)) => names.insert(dir.to_string(), EntryType::Dir),
                    None => names.insert(rest.to_string(), EntryType::File),
                };
            }
        }
        if names.is_empty() && !path.is_empty() {
            return Err(ContentError::NotFound { path: path.to_string() });
        }

        let entries = names
            .into_iter()
            .map(|(name, entry_type)| DirectoryEntry {
                path: format!("{}{}", prefix, name),
                sha: format!("tree-{}", name),
                size: 0,
                download_url: None,
                name,
                entry_type,
            })
            .collect();
        Ok(DirectoryListing {
            path: path.to_string(),
            entries,
        })
    }

    fn identifier(&self) -> String {
        "memory".to_string()
    }
}

#[async_trait]
impl ContentWriter for MemoryRepo {
    async fn put_file(
        &self,
        path: &str,
        content: Bytes,
        _message: &str,
        sha: Option<&str>,
    ) -> content_catalog::Result<WriteReceipt> {
        self.check_sha(path, sha)?;
        let sha = self.store(path, &String::from_utf8_lossy(&content));
        Ok(WriteReceipt { sha, commit_sha: None })
    }

    async fn delete_file(&self, path: &str, _message: &str, sha: &str) -> content_catalog::Result<()> {
        self.check_sha(path, Some(sha))?;
        self.files.lock().unwrap().remove(path);
        Ok(())
    }
}

fn sample_repo() -> Arc<MemoryRepo> {
    MemoryRepo::with_files(&[
        (
            "content/welcome.md",
            "---\ntitle: Welcome\ndate: 2024-01-10\ntags: [intro]\n---\nHello there.",
        ),
        ("content/notes.txt", "not content"),
        ("content/guides/_index.md", "---\ntitle: Guides\ndescription: How-tos\n---\n"),
        (
            "content/guides/setup.md",
            "---\ntitle: Setup\ndate: 2024-02-01\ntags: [intro, ops]\ncategories: [howto]\norder: 2\n---\nInstall it.",
        ),
        (
            "content/guides/deploy.md",
            "---\ntitle: Deploy\ndate: 2024-03-01\ntags: ops\norder: 1\n---\nShip it.",
        ),
    ])
}

fn catalog_settings() -> CatalogSettings {
    CatalogSettings {
        content_root: "content".to_string(),
        ..CatalogSettings::default()
    }
}

fn provider_over(repo: &Arc<MemoryRepo>, writable: bool) -> Arc<dyn ContentProvider> {
    let mut provider = GitContentProvider::new("docs", repo.clone(), catalog_settings(), &CacheSettings::default());
    if writable {
        provider = provider.with_writer(repo.clone());
    }
    decorate(Arc::new(provider), Some(Arc::new(MemoryCache::new())))
}

#[tokio::test]
async fn test_catalog_is_built_from_repository() {
    let repo = sample_repo();
    let provider = provider_over(&repo, true);
    let cancel = CancellationToken::new();

    let items = provider.get_all_items(&cancel).await.unwrap();
    let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["Welcome", "Deploy", "Setup"]);

    let guides = provider
        .get_directory_by_path("content/guides", &cancel)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(guides.title.as_deref(), Some("Guides"));
    assert_eq!(guides.url, "guides");
    assert_eq!(guides.items.len(), 2);

    let setup = provider
        .get_item_by_url("guides/setup", None, &cancel)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(setup.path, "content/guides/setup.md");
    assert_eq!(setup.directory_id.as_deref(), Some(guides.id.as_str()));
    assert_eq!(
        provider.get_item_by_id(&setup.id, &cancel).await.unwrap().as_ref(),
        Some(&setup)
    );
    assert_eq!(
        provider.get_directory_by_url("guides", None, &cancel).await.unwrap().map(|d| d.id),
        Some(guides.id.clone())
    );

    assert!(provider.get_item_by_path("content/notes.txt", &cancel).await.unwrap().is_none());
    assert_eq!(provider.get_directories(None, &cancel).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_repeated_reads_share_one_snapshot() {
    let repo = sample_repo();
    let provider = provider_over(&repo, false);
    let cancel = CancellationToken::new();

    provider.get_all_items(&cancel).await.unwrap();
    let after_first = repo.listings();
    for _ in 0..5 {
        provider.get_tags(None, &cancel).await.unwrap();
        provider.get_item_by_path("content/welcome.md", &cancel).await.unwrap();
    }

    assert_eq!(after_first, 2);
    assert_eq!(repo.listings(), after_first);
}

#[tokio::test]
async fn test_tags_and_queries() {
    let repo = sample_repo();
    let provider = provider_over(&repo, false);
    let cancel = CancellationToken::new();

    let tags = provider.get_tags(None, &cancel).await.unwrap();
    let tags: Vec<_> = tags.iter().map(|t| (t.name.as_str(), t.count)).collect();
    assert_eq!(tags, vec![("intro", 2), ("ops", 2)]);

    let categories = provider.get_categories(None, &cancel).await.unwrap();
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0].name, "howto");

    let query = ContentQuery::new()
        .tag("ops")
        .sort(SortField::Date, SortDirection::Descending);
    let result = provider.find_by_query(&query, &cancel).await.unwrap();
    assert_eq!(result.total, 2);
    assert_eq!(result.items[0].title, "Deploy");

    let query = ContentQuery::new()
        .in_directory("content/guides")
        .sort(SortField::Order, SortDirection::Ascending)
        .page(1, 1);
    let result = provider.find_by_query(&query, &cancel).await.unwrap();
    assert_eq!(result.total, 2);
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].title, "Setup");
}

#[tokio::test]
async fn test_create_is_visible_after_invalidation() {
    let repo = sample_repo();
    let provider = provider_over(&repo, true);
    let cancel = CancellationToken::new();

    assert!(provider
        .get_item_by_path("content/guides/monitor.md", &cancel)
        .await
        .unwrap()
        .is_none());

    let created = provider
        .create_content(
            NewContent {
                path: "content/guides/monitor.md".to_string(),
                front_matter: FrontMatter {
                    title: Some("Monitor".to_string()),
                    tags: vec!["ops".to_string()],
                    ..FrontMatter::default()
                },
                body: "Watch it.".to_string(),
                message: None,
            },
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(created.url, "guides/monitor");
    assert!(repo.text("content/guides/monitor.md").unwrap().contains("title: Monitor"));

    let found = provider
        .get_item_by_path("content/guides/monitor.md", &cancel)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, created.id);
    assert_eq!(found.sha, created.sha);
    assert_eq!(found.body.trim(), "Watch it.");
}

#[tokio::test]
async fn test_update_and_delete_round_trip() {
    let repo = sample_repo();
    let provider = provider_over(&repo, true);
    let cancel = CancellationToken::new();

    let setup = provider
        .get_item_by_path("content/guides/setup.md", &cancel)
        .await
        .unwrap()
        .unwrap();
    let mut front_matter = setup.front_matter();
    front_matter.description = Some("First steps".to_string());

    let updated = provider
        .update_content(
            &setup.id,
            ContentUpdate {
                front_matter,
                body: "Install it twice.".to_string(),
                message: Some("Clarify setup".to_string()),
            },
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(updated.id, setup.id);
    assert_ne!(updated.sha, setup.sha);

    let reread = provider.get_item_by_id(&setup.id, &cancel).await.unwrap().unwrap();
    assert_eq!(reread.description.as_deref(), Some("First steps"));
    assert_eq!(reread.tags, setup.tags);

    provider.delete_content(&setup.id, None, &cancel).await.unwrap();
    assert!(repo.text("content/guides/setup.md").is_none());
    assert!(provider.get_item_by_id(&setup.id, &cancel).await.unwrap().is_none());
}

#[tokio::test]
async fn test_write_failures_are_normalized() {
    let repo = sample_repo();
    let cancel = CancellationToken::new();

    let read_only = provider_over(&repo, false);
    assert!(read_only.is_read_only());
    let err = assert_err!(read_only.delete_content("anything", None, &cancel).await);
    assert!(matches!(err, ContentError::ProviderFault { .. }));
    assert!(matches!(err.root_cause(), ContentError::ReadOnly { .. }));

    let writable = provider_over(&repo, true);
    let err = assert_err!(
        writable
            .update_content(
                "missing",
                ContentUpdate {
                    front_matter: FrontMatter {
                        title: Some("X".to_string()),
                        ..FrontMatter::default()
                    },
                    body: String::new(),
                    message: None,
                },
                &cancel,
            )
            .await
    );
    assert!(err.is_not_found());

    let err = assert_err!(
        writable
            .create_content(
                NewContent {
                    path: "content/logo.png".to_string(),
                    front_matter: FrontMatter {
                        title: Some("Logo".to_string()),
                        ..FrontMatter::default()
                    },
                    body: String::new(),
                    message: None,
                },
                &cancel,
            )
            .await
    );
    assert!(matches!(err.root_cause(), ContentError::ValidationFailed { .. }));
    assert!(repo.text("content/logo.png").is_none());
}

#[tokio::test]
async fn test_source_fault_is_wrapped_with_cause() {
    let repo = sample_repo();
    repo.offline.store(true, Ordering::SeqCst);
    let provider = provider_over(&repo, false);

    let err = assert_err!(provider.get_item_by_id("x", &CancellationToken::new()).await);

    match &err {
        ContentError::ProviderFault { provider, operation, source } => {
            assert_eq!(provider, "docs");
            assert_eq!(*operation, "get_item_by_id");
            assert!(matches!(**source, ContentError::TransientNetwork { .. }));
        }
        other => panic!("expected ProviderFault, got {:?}", other),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_failed_refresh_reports_error_and_reads_keep_last_snapshot() {
    let repo = sample_repo();
    let provider = provider_over(&repo, false);
    let cancel = CancellationToken::new();
    assert_eq!(provider.get_all_items(&cancel).await.unwrap().len(), 3);
    let welcome = provider.get_item_by_path("content/welcome.md", &cancel).await.unwrap();
    assert!(welcome.is_some());

    repo.offline.store(true, Ordering::SeqCst);
    let err = assert_err!(provider.refresh(&cancel).await);
    assert!(err.is_retryable());

    assert_eq!(provider.get_all_items(&cancel).await.unwrap().len(), 3);
    assert!(provider
        .get_item_by_path("content/welcome.md", &cancel)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test(start_paused = true)]
async fn test_expired_snapshot_is_served_while_repository_is_offline() {
    let repo = sample_repo();
    let provider = provider_over(&repo, false);
    let cancel = CancellationToken::new();
    assert_eq!(provider.get_all_items(&cancel).await.unwrap().len(), 3);

    repo.offline.store(true, Ordering::SeqCst);
    tokio::time::advance(CacheSettings::default().ttl() + Duration::from_secs(1)).await;

    let items = assert_ok!(provider.get_all_items(&cancel).await);
    assert_eq!(items.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_cached_lookup_follows_rebuilt_catalog() {
    let repo = sample_repo();
    let provider = provider_over(&repo, false);
    let cancel = CancellationToken::new();

    let welcome = provider
        .get_item_by_path("content/welcome.md", &cancel)
        .await
        .unwrap()
        .unwrap();
    assert!(provider.get_item_by_id(&welcome.id, &cancel).await.unwrap().is_some());

    repo.files.lock().unwrap().remove("content/welcome.md");
    tokio::time::advance(CacheSettings::default().ttl() + Duration::from_secs(1)).await;

    assert_eq!(provider.get_all_items(&cancel).await.unwrap().len(), 2);
    assert!(provider.get_item_by_id(&welcome.id, &cancel).await.unwrap().is_none());
    assert!(provider
        .get_item_by_path("content/welcome.md", &cancel)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_cancelled_read() {
    let repo = sample_repo();
    let provider = provider_over(&repo, false);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = assert_err!(provider.get_all_items(&cancel).await);
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_registry_hands_out_decorated_providers() {
    let docs = sample_repo();
    let blog = MemoryRepo::with_files(&[("content/first.md", "---\ntitle: First\n---\n")]);

    let mut registry = ProviderRegistry::new();
    registry.register_instance(provider_over(&docs, false));
    registry.register("blog", move || {
        let provider = GitContentProvider::new("blog", blog.clone(), catalog_settings(), &CacheSettings::default());
        Ok(decorate(Arc::new(provider), None))
    });

    let cancel = CancellationToken::new();
    let default = registry.get_default().await.unwrap();
    assert_eq!(default.id(), "docs");

    let blog = registry.get("blog").await.unwrap();
    assert_eq!(blog.get_all_items(&cancel).await.unwrap()[0].title, "First");

    registry.set_default("blog").unwrap();
    assert_eq!(registry.get_default().await.unwrap().id(), "blog");
    assert!(matches!(
        registry.get("wiki").await,
        Err(ContentError::NotRegistered { .. })
    ));
}
