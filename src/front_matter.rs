//! YAML front matter at the top of markdown files.
//!
//! ```text
//! ---
//! title: Hello
//! tags: [intro, news]
//! ---
//! Body starts here.
//! ```
//!
//! Known keys land in typed fields of [`FrontMatter`]; any other key is kept
//! as a string in [`FrontMatter::extra`].

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_yaml::{Mapping, Value};

use crate::{
    error::{ContentError, Result},
    model::ContentStatus,
};

const FENCE: &str = "---";

/// Typed metadata block of a content file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub locale: Option<String>,
    pub status: Option<ContentStatus>,
    /// Ordering hint among siblings, ascending
    pub order: Option<i32>,
    pub slug: Option<String>,
    /// Provider-specific keys, stringified
    pub extra: BTreeMap<String, String>,
}

impl FrontMatter {
    pub fn is_empty(&self) -> bool {
        *self == FrontMatter::default()
    }
}

/// A parsed content file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub front_matter: FrontMatter,
    pub body: String,
}

/// Split a file into front matter and body, then type the metadata.
///
/// A file without an opening fence has empty metadata. An opening fence
/// without a closing one, or YAML that does not parse, is rejected.
pub fn parse(text: &str) -> Result<Document> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let (yaml, body) = match split(text)? {
        Some(parts) => parts,
        None => {
            return Ok(Document {
                front_matter: FrontMatter::default(),
                body: text.to_string(),
            })
        }
    };

    let value: Value = serde_yaml::from_str(yaml)
        .map_err(|e| ContentError::validation(format!("malformed front matter: {}", e)))?;
    let front_matter = match value {
        Value::Null => FrontMatter::default(),
        Value::Mapping(map) => from_mapping(map)?,
        _ => return Err(ContentError::validation("front matter must be a key/value mapping")),
    };

    Ok(Document {
        front_matter,
        body: body.to_string(),
    })
}

fn split(text: &str) -> Result<Option<(&str, &str)>> {
    let mut lines = text.split_inclusive('\n');
    let opening = match lines.next() {
        Some(line) if line.trim_end() == FENCE => line,
        _ => return Ok(None),
    };

    let start = opening.len();
    let mut offset = start;
    for line in lines {
        if line.trim_end() == FENCE {
            return Ok(Some((&text[start..offset], &text[offset + line.len()..])));
        }
        offset += line.len();
    }
    Err(ContentError::validation("front matter is missing its closing '---'"))
}

fn from_mapping(map: Mapping) -> Result<FrontMatter> {
    let mut fm = FrontMatter::default();
    let mut lang = None;
    let mut draft = None;
    let mut weight = None;

    for (key, value) in map {
        let key = match scalar(&key) {
            Some(key) => key,
            None => continue,
        };
        match key.as_str() {
            "title" => fm.title = scalar(&value),
            "description" => fm.description = scalar(&value),
            "slug" => fm.slug = scalar(&value),
            "date" => fm.date = scalar(&value).map(|s| parse_date(&s)).transpose()?,
            "tags" => fm.tags = string_list(&value),
            "categories" => fm.categories = string_list(&value),
            "locale" => fm.locale = scalar(&value),
            "lang" => lang = scalar(&value),
            "status" => fm.status = scalar(&value).map(|s| parse_status(&s)).transpose()?,
            "draft" => draft = value.as_bool(),
            "order" => fm.order = parse_order(&value)?,
            "weight" => weight = parse_order(&value)?,
            _ => {
                if let Some(text) = scalar(&value) {
                    fm.extra.insert(key, text);
                }
            }
        }
    }

    fm.locale = fm.locale.or(lang);
    fm.order = fm.order.or(weight);
    if fm.status.is_none() {
        fm.status = draft.map(|d| if d { ContentStatus::Draft } else { ContentStatus::Published });
    }
    Ok(fm)
}

/// Stringify a YAML value; nested structures are re-serialized inline.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Tagged(tagged) => scalar(&tagged.value),
        other => serde_yaml::to_string(other).ok().map(|s| s.trim().to_string()),
    }
}

/// Accept either a YAML sequence or a comma-separated string.
fn string_list(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::Sequence(items) => items.iter().filter_map(scalar).collect(),
        other => scalar(other)
            .map(|s| s.split(',').map(str::to_string).collect())
            .unwrap_or_default(),
    };
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for item in raw {
        let item = item.trim();
        if !item.is_empty() && !out.iter().any(|seen| seen == item) {
            out.push(item.to_string());
        }
    }
    out
}

fn parse_status(text: &str) -> Result<ContentStatus> {
    match text.trim().to_ascii_lowercase().as_str() {
        "draft" => Ok(ContentStatus::Draft),
        "published" => Ok(ContentStatus::Published),
        other => Err(ContentError::validation(format!("unknown status '{}'", other))),
    }
}

fn parse_order(value: &Value) -> Result<Option<i32>> {
    let parsed = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        other => scalar(other).and_then(|s| s.trim().parse().ok()),
    };
    parsed
        .map(Some)
        .ok_or_else(|| ContentError::validation(format!("order must be an integer, got {:?}", value)))
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS` or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_date(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    Err(ContentError::validation(format!("unrecognized date '{}'", text)))
}

fn format_date(date: &DateTime<Utc>) -> String {
    if date.time() == NaiveTime::MIN {
        date.format("%Y-%m-%d").to_string()
    } else {
        date.to_rfc3339()
    }
}

/// Serialize front matter and body back into file text.
///
/// Empty metadata produces the bare body with no fence.
pub fn render(front_matter: &FrontMatter, body: &str) -> Result<String> {
    if front_matter.is_empty() {
        return Ok(body.to_string());
    }

    let mut map = Mapping::new();
    let mut put = |key: &str, value: Value| {
        map.insert(Value::String(key.to_string()), value);
    };
    let list = |items: &[String]| Value::Sequence(items.iter().cloned().map(Value::String).collect());

    if let Some(title) = &front_matter.title {
        put("title", Value::String(title.clone()));
    }
    if let Some(description) = &front_matter.description {
        put("description", Value::String(description.clone()));
    }
    if let Some(date) = &front_matter.date {
        put("date", Value::String(format_date(date)));
    }
    if !front_matter.tags.is_empty() {
        put("tags", list(&front_matter.tags));
    }
    if !front_matter.categories.is_empty() {
        put("categories", list(&front_matter.categories));
    }
    if let Some(locale) = &front_matter.locale {
        put("locale", Value::String(locale.clone()));
    }
    if let Some(status) = front_matter.status {
        put("status", Value::String(status.as_str().to_string()));
    }
    if let Some(order) = front_matter.order {
        put("order", Value::Number(order.into()));
    }
    if let Some(slug) = &front_matter.slug {
        put("slug", Value::String(slug.clone()));
    }
    for (key, value) in &front_matter.extra {
        put(key.as_str(), Value::String(value.clone()));
    }

    let yaml = serde_yaml::to_string(&Value::Mapping(map))
        .map_err(|e| ContentError::validation(format!("cannot serialize front matter: {}", e)))?;
    Ok(format!("{FENCE}\n{yaml}{FENCE}\n{body}"))
}
