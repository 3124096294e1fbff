//! Reconstruction of the directory/content hierarchy from flat listings.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use futures::{stream, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;

use crate::{
    config::CatalogSettings,
    error::{ContentError, Result},
    front_matter::{self, Document, FrontMatter},
    model::{ContentItem, DirectoryItem, TermCount},
    paths::{generate_slug, normalize_path, stable_id},
    source::ContentSource,
    types::DirectoryEntry,
};

const ROOT_NAME: &str = "root";

/// Run a future unless the token fires first
pub(crate) async fn until_cancelled<T, F>(cancel: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ContentError::Cancelled),
        result = future => result,
    }
}

/// A fully materialized content tree with lookup indexes
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    directories: Vec<DirectoryItem>,
    items: Vec<ContentItem>,
    directory_ids: HashMap<String, usize>,
    directory_paths: HashMap<String, usize>,
    item_ids: HashMap<String, usize>,
    item_paths: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(directories: Vec<DirectoryItem>, items: Vec<ContentItem>) -> Self {
        let directory_ids = directories.iter().enumerate().map(|(i, d)| (d.id.clone(), i)).collect();
        let directory_paths = directories.iter().enumerate().map(|(i, d)| (d.path.clone(), i)).collect();
        let item_ids = items.iter().enumerate().map(|(i, item)| (item.id.clone(), i)).collect();
        let item_paths = items.iter().enumerate().map(|(i, item)| (item.path.clone(), i)).collect();
        Self {
            directories,
            items,
            directory_ids,
            directory_paths,
            item_ids,
            item_paths,
        }
    }

    /// All items in traversal order
    pub fn items(&self) -> &[ContentItem] {
        &self.items
    }

    /// All directories in traversal order, root first
    pub fn directories(&self) -> &[DirectoryItem] {
        &self.directories
    }

    pub fn root(&self) -> Option<&DirectoryItem> {
        self.directories.first()
    }

    pub fn item(&self, id: &str) -> Option<&ContentItem> {
        self.item_ids.get(id).map(|&i| &self.items[i])
    }

    pub fn item_by_path(&self, path: &str) -> Option<&ContentItem> {
        self.item_paths.get(&normalize_path(path)).map(|&i| &self.items[i])
    }

    /// Reverse URL lookup by scanning derived URLs
    pub fn item_by_url(&self, url: &str, locale: Option<&str>) -> Option<&ContentItem> {
        let url = normalize_path(url);
        self.items.iter().find(|item| {
            item.url == url && locale.map_or(true, |l| item.locale.eq_ignore_ascii_case(l))
        })
    }

    pub fn directory(&self, id: &str) -> Option<&DirectoryItem> {
        self.directory_ids.get(id).map(|&i| &self.directories[i])
    }

    pub fn directory_by_path(&self, path: &str) -> Option<&DirectoryItem> {
        self.directory_paths.get(&normalize_path(path)).map(|&i| &self.directories[i])
    }

    /// Directory whose derived URL matches; with a locale, a directory of that
    /// locale wins over a locale-less one.
    pub fn directory_by_url(&self, url: &str, locale: Option<&str>) -> Option<&DirectoryItem> {
        let url = normalize_path(url);
        let mut candidates = self.directories.iter().filter(|d| d.url == url);
        match locale {
            None => candidates.next(),
            Some(locale) => {
                let candidates: Vec<_> = candidates.collect();
                candidates
                    .iter()
                    .find(|d| d.locale.as_deref().map_or(false, |l| l.eq_ignore_ascii_case(locale)))
                    .or_else(|| candidates.iter().find(|d| d.locale.is_none()))
                    .copied()
            }
        }
    }

    /// Directories of one locale, or all of them
    pub fn directories_for(&self, locale: Option<&str>) -> Vec<&DirectoryItem> {
        self.directories
            .iter()
            .filter(|d| match locale {
                None => true,
                Some(locale) => d.locale.as_deref().map_or(false, |l| l.eq_ignore_ascii_case(locale)),
            })
            .collect()
    }

    pub fn children<'a>(&'a self, directory: &'a DirectoryItem) -> impl Iterator<Item = &'a DirectoryItem> + 'a {
        directory.children.iter().filter_map(move |id| self.directory(id))
    }

    pub fn items_in<'a>(&'a self, directory: &'a DirectoryItem) -> impl Iterator<Item = &'a ContentItem> + 'a {
        directory.items.iter().filter_map(move |id| self.item(id))
    }

    pub fn tags(&self, locale: Option<&str>) -> Vec<TermCount> {
        self.count_terms(locale, |item| item.tags.iter())
    }

    pub fn categories(&self, locale: Option<&str>) -> Vec<TermCount> {
        self.count_terms(locale, |item| item.categories.iter())
    }

    fn count_terms<'a, F, I>(&'a self, locale: Option<&str>, terms: F) -> Vec<TermCount>
    where
        F: Fn(&'a ContentItem) -> I,
        I: Iterator<Item = &'a String>,
    {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for item in &self.items {
            if locale.map_or(false, |l| !item.locale.eq_ignore_ascii_case(l)) {
                continue;
            }
            for term in terms(item) {
                *counts.entry(term.as_str()).or_default() += 1;
            }
        }
        counts
            .into_iter()
            .map(|(name, count)| TermCount {
                name: name.to_string(),
                count,
            })
            .collect()
    }
}

/// Name of the last path segment, or the root placeholder
fn segment_name(path: &str) -> String {
    path.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(ROOT_NAME)
        .to_string()
}

fn parent_path(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or_default()
}

/// Id of the directory at `path`
pub fn directory_id(path: &str, provider_id: &str) -> String {
    let path = normalize_path(path);
    stable_id(&path, &[segment_name(&path).as_str(), provider_id])
}

/// Derive a content item from a parsed file
pub fn content_item(
    provider_id: &str,
    settings: &CatalogSettings,
    path: &str,
    sha: &str,
    document: Document,
) -> ContentItem {
    let path = normalize_path(path);
    let Document { front_matter, body } = document;
    let FrontMatter {
        title,
        description,
        date,
        tags,
        categories,
        locale,
        status,
        order,
        slug,
        extra,
    } = front_matter;

    let title = title.filter(|t| !t.trim().is_empty()).unwrap_or_else(|| {
        Path::new(&path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let slug = slug
        .map(|s| generate_slug(&s))
        .unwrap_or_else(|| generate_slug(&title));
    let locale = locale.unwrap_or_else(|| settings.localization.locale_of(&path, &settings.content_root));
    let url = settings.localization.url_for(&path, &slug, &settings.content_root);

    ContentItem {
        id: stable_id(&path, &[title.as_str(), provider_id]),
        provider_id: provider_id.to_string(),
        directory_id: Some(directory_id(parent_path(&path), provider_id)),
        title,
        description,
        date,
        body,
        locale,
        tags: tags.into_iter().collect(),
        categories: categories.into_iter().collect(),
        status: status.unwrap_or_default(),
        sha: sha.to_string(),
        slug,
        url,
        order,
        extra,
        path,
    }
}

enum Loaded {
    Item(Box<ContentItem>),
    Index(FrontMatter),
    Pruned,
}

struct Pending {
    path: String,
    parent: Option<usize>,
}

/// Walks a source breadth-first and materializes a [`Catalog`]
///
/// Traversal uses an explicit queue, so depth never grows the stack and the
/// cancellation token is checked between directories. A sub-path that
/// vanished upstream (`NotFound`) is pruned; any other failure aborts the
/// whole build.
pub struct TreeBuilder {
    source: Arc<dyn ContentSource>,
    provider_id: String,
    settings: CatalogSettings,
}

impl TreeBuilder {
    pub fn new(source: Arc<dyn ContentSource>, provider_id: impl Into<String>, settings: CatalogSettings) -> Self {
        Self {
            source,
            provider_id: provider_id.into(),
            settings,
        }
    }

    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    #[tracing::instrument(skip_all, fields(provider = %self.provider_id, source = %self.source.identifier()))]
    pub async fn build(&self, cancel: &CancellationToken) -> Result<Catalog> {
        let root = normalize_path(&self.settings.content_root);
        let mut visited = HashSet::from([root.clone()]);
        let mut queue = VecDeque::from([Pending {
            path: root,
            parent: None,
        }]);
        let mut directories: Vec<DirectoryItem> = Vec::new();
        let mut items: Vec<ContentItem> = Vec::new();

        while let Some(pending) = queue.pop_front() {
            if cancel.is_cancelled() {
                return Err(ContentError::Cancelled);
            }

            let listing = match until_cancelled(cancel, self.source.list_directory(&pending.path)).await {
                Ok(listing) => listing,
                Err(ContentError::NotFound { path }) => {
                    if pending.parent.is_none() {
                        tracing::warn!(path = %path, "Content root not found upstream; catalog is empty");
                    } else {
                        tracing::debug!(path = %path, "Directory vanished upstream; pruning");
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };

            let index = directories.len();
            let mut directory = self.directory_item(&pending.path, pending.parent.map(|p| directories[p].id.clone()));

            let mut files = Vec::new();
            for entry in listing.entries {
                if entry.is_dir() {
                    let path = normalize_path(&entry.path);
                    // Upstream listings are not trusted to be acyclic
                    if !visited.insert(path.clone()) {
                        tracing::debug!(path = %path, "Directory already visited; skipping");
                        continue;
                    }
                    queue.push_back(Pending {
                        path,
                        parent: Some(index),
                    });
                } else if self.wants(&entry) {
                    files.push(entry);
                }
            }

            let loaded: Vec<Loaded> = until_cancelled(
                cancel,
                stream::iter(files)
                    .map(|entry| self.load(entry))
                    .buffered(self.settings.fetch_concurrency.max(1))
                    .try_collect(),
            )
            .await?;

            for result in loaded {
                match result {
                    Loaded::Item(item) => {
                        directory.items.push(item.id.clone());
                        items.push(*item);
                    }
                    Loaded::Index(meta) => {
                        directory.title = meta.title.or(directory.title);
                        directory.description = meta.description.or(directory.description);
                        directory.order = meta.order.or(directory.order);
                    }
                    Loaded::Pruned => {}
                }
            }

            if let Some(parent) = pending.parent {
                directories[parent].children.push(directory.id.clone());
            }
            directories.push(directory);
        }

        sort_siblings(&mut directories, &items);
        tracing::debug!(directories = directories.len(), items = items.len(), "Tree built");
        Ok(Catalog::new(directories, items))
    }

    fn directory_item(&self, path: &str, parent_id: Option<String>) -> DirectoryItem {
        let settings = &self.settings;
        DirectoryItem {
            id: directory_id(path, &self.provider_id),
            provider_id: self.provider_id.clone(),
            path: path.to_string(),
            name: segment_name(path),
            title: None,
            description: None,
            url: settings.localization.directory_url_for(path, &settings.content_root),
            locale: settings.localization.directory_locale(path, &settings.content_root),
            order: None,
            parent_id,
            children: Vec::new(),
            items: Vec::new(),
        }
    }

    fn is_index(&self, entry: &DirectoryEntry) -> bool {
        !self.settings.index_file.is_empty() && entry.name.eq_ignore_ascii_case(&self.settings.index_file)
    }

    fn wants(&self, entry: &DirectoryEntry) -> bool {
        self.is_index(entry) || self.settings.allows_extension(&entry.name)
    }

    async fn load(&self, entry: DirectoryEntry) -> Result<Loaded> {
        let file = match self.source.fetch_file(&entry.path).await {
            Ok(file) => file,
            Err(ContentError::NotFound { path }) => {
                tracing::debug!(path = %path, "File vanished between listing and fetch; pruning");
                return Ok(Loaded::Pruned);
            }
            Err(e) => return Err(e),
        };

        let text = String::from_utf8_lossy(&file.content);
        let document = match front_matter::parse(&text) {
            Ok(document) => document,
            Err(ContentError::ValidationFailed { message }) if self.settings.skip_invalid_front_matter => {
                tracing::warn!(path = %entry.path, %message, "Skipping file with invalid front matter");
                return Ok(Loaded::Pruned);
            }
            Err(ContentError::ValidationFailed { message }) => {
                return Err(ContentError::validation(format!("{}: {}", entry.path, message)))
            }
            Err(e) => return Err(e),
        };

        if self.is_index(&entry) {
            return Ok(Loaded::Index(document.front_matter));
        }
        Ok(Loaded::Item(Box::new(content_item(
            &self.provider_id,
            &self.settings,
            &entry.path,
            &file.sha,
            document,
        ))))
    }
}

/// Apply ordering hints: hinted siblings first (ascending), then the rest,
/// ties broken by name. Sibling lists without any hint keep upstream order.
fn sort_siblings(directories: &mut [DirectoryItem], items: &[ContentItem]) {
    let dir_keys: HashMap<String, (Option<i32>, String)> = directories
        .iter()
        .map(|d| (d.id.clone(), (d.order, d.name.clone())))
        .collect();
    let item_keys: HashMap<&str, (Option<i32>, String)> = items
        .iter()
        .map(|item| (item.id.as_str(), (item.order, segment_name(&item.path))))
        .collect();

    for directory in directories.iter_mut() {
        sort_by_hint(&mut directory.children, |id| dir_keys.get(id.as_str()).cloned());
        sort_by_hint(&mut directory.items, |id| item_keys.get(id.as_str()).cloned());
    }
}

fn sort_by_hint<F>(ids: &mut [String], key: F)
where
    F: Fn(&String) -> Option<(Option<i32>, String)>,
{
    let keyed: Vec<(Option<i32>, String)> = ids.iter().map(|id| key(id).unwrap_or((None, String::new()))).collect();
    if keyed.iter().all(|(order, _)| order.is_none()) {
        return;
    }
    let mut pairs: Vec<_> = keyed.into_iter().zip(ids.iter().cloned()).collect();
    pairs.sort_by(|((a_order, a_name), _), ((b_order, b_name), _)| {
        a_order
            .is_none()
            .cmp(&b_order.is_none())
            .then(a_order.cmp(b_order))
            .then_with(|| a_name.cmp(b_name))
    });
    for (slot, (_, id)) in ids.iter_mut().zip(pairs) {
        *slot = id;
    }
}
