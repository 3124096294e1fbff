use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::front_matter::FrontMatter;

/// Publication state of a content item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Draft,
    #[default]
    Published,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::Published => "published",
        }
    }
}

/// A single addressable unit of content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// `stable_id(path, [title, provider_id])`
    pub id: String,
    pub provider_id: String,
    /// Repository path of the backing file
    pub path: String,
    /// Id of the directory the file sits in
    pub directory_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub body: String,
    pub locale: String,
    pub tags: BTreeSet<String>,
    pub categories: BTreeSet<String>,
    pub status: ContentStatus,
    /// Version marker (blob SHA) from the source
    pub sha: String,
    pub slug: String,
    /// Public URL derived from path and slug
    pub url: String,
    pub order: Option<i32>,
    pub extra: BTreeMap<String, String>,
}

impl ContentItem {
    /// Front matter that reproduces this item's metadata when written back
    pub fn front_matter(&self) -> FrontMatter {
        FrontMatter {
            title: Some(self.title.clone()),
            description: self.description.clone(),
            date: self.date,
            tags: self.tags.iter().cloned().collect(),
            categories: self.categories.iter().cloned().collect(),
            locale: None,
            status: Some(self.status),
            order: self.order,
            slug: None,
            extra: self.extra.clone(),
        }
    }
}

/// A node in the content tree
///
/// Edges are ids into the owning catalog, not references: `parent_id` is a
/// lookup key and `children`/`items` keep sibling order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryItem {
    /// `stable_id(path, [name, provider_id])`
    pub id: String,
    pub provider_id: String,
    pub path: String,
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: String,
    pub locale: Option<String>,
    pub order: Option<i32>,
    pub parent_id: Option<String>,
    /// Child directory ids, in display order
    pub children: Vec<String>,
    /// Ids of content items located directly in this directory
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Date,
    Title,
    Path,
    Order,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

/// Filter, sort and page over a catalog snapshot
///
/// Tag and category filters are all-of. Setting either date bound excludes
/// undated items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentQuery {
    pub locale: Option<String>,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub status: Option<ContentStatus>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    /// Repository path prefix, matched segment-wise
    pub directory: Option<String>,
    pub sort_by: SortField,
    pub direction: SortDirection,
    pub skip: usize,
    pub take: Option<usize>,
}

impl ContentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    pub fn status(mut self, status: ContentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn in_directory(mut self, path: impl Into<String>) -> Self {
        self.directory = Some(path.into());
        self
    }

    pub fn sort(mut self, field: SortField, direction: SortDirection) -> Self {
        self.sort_by = field;
        self.direction = direction;
        self
    }

    pub fn page(mut self, skip: usize, take: usize) -> Self {
        self.skip = skip;
        self.take = Some(take);
        self
    }

    pub fn matches(&self, item: &ContentItem) -> bool {
        if let Some(locale) = &self.locale {
            if !item.locale.eq_ignore_ascii_case(locale) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if item.status != status {
                return false;
            }
        }
        if !self.tags.iter().all(|t| item.tags.contains(t)) {
            return false;
        }
        if !self.categories.iter().all(|c| item.categories.contains(c)) {
            return false;
        }
        if self.date_from.is_some() || self.date_to.is_some() {
            let date = match item.date {
                Some(date) => date,
                None => return false,
            };
            if self.date_from.map_or(false, |from| date < from) || self.date_to.map_or(false, |to| date > to) {
                return false;
            }
        }
        if let Some(dir) = &self.directory {
            let dir = crate::paths::normalize_path(dir);
            if !dir.is_empty() && !item.path.starts_with(&format!("{}/", dir)) {
                return false;
            }
        }
        true
    }

    fn compare(&self, a: &ContentItem, b: &ContentItem) -> Ordering {
        let primary = match self.sort_by {
            SortField::Date => nulls_last(a.date.as_ref(), b.date.as_ref(), self.direction),
            SortField::Order => nulls_last(a.order.as_ref(), b.order.as_ref(), self.direction),
            SortField::Title => directed(a.title.to_lowercase().cmp(&b.title.to_lowercase()), self.direction),
            SortField::Path => directed(a.path.cmp(&b.path), self.direction),
        };
        primary.then_with(|| a.path.cmp(&b.path))
    }

    /// Filter, sort and paginate
    pub fn apply<'a, I>(&self, items: I) -> QueryResult
    where
        I: IntoIterator<Item = &'a ContentItem>,
    {
        let mut matched: Vec<&ContentItem> = items.into_iter().filter(|item| self.matches(item)).collect();
        matched.sort_by(|a, b| self.compare(a, b));
        let total = matched.len();
        let page = matched
            .into_iter()
            .skip(self.skip)
            .take(self.take.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        QueryResult { total, items: page }
    }
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Ascending => ordering,
        SortDirection::Descending => ordering.reverse(),
    }
}

/// Missing values go last regardless of direction
fn nulls_last<T: Ord>(a: Option<&T>, b: Option<&T>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => directed(a.cmp(b), direction),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// One page of query results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Matches before pagination
    pub total: usize,
    pub items: Vec<ContentItem>,
}

/// A tag or category with the number of items carrying it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermCount {
    pub name: String,
    pub count: usize,
}

/// Input for creating a new content file
#[derive(Debug, Clone)]
pub struct NewContent {
    /// Repository path of the file to create
    pub path: String,
    pub front_matter: FrontMatter,
    pub body: String,
    /// Commit message; a default is derived from the path when absent
    pub message: Option<String>,
}

/// Replacement metadata and body for an existing item
#[derive(Debug, Clone)]
pub struct ContentUpdate {
    pub front_matter: FrontMatter,
    pub body: String,
    pub message: Option<String>,
}
