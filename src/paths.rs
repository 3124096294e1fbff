//! Path algebra for content files.
//!
//! Every function here is total: degenerate input (an empty string, a path
//! that is only separators) produces a well-defined default instead of an
//! error. Nothing in this module touches the network or the cache.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of digest bytes kept by [`stable_id`] (32 hex characters).
const ID_BYTES: usize = 16;
const ID_SEPARATOR: &str = "|";

/// Unify separators to `/`, drop empty segments and trim slashes at both ends.
///
/// ```
/// use content_catalog::paths::normalize_path;
/// assert_eq!(normalize_path("\\content//en/post.md/"), "content/en/post.md");
/// ```
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Remove a configured content-root prefix, segment-wise.
///
/// A path that does not start with the root is returned normalized but
/// otherwise untouched.
pub fn strip_content_root(path: &str, content_root: &str) -> String {
    let path = normalize_path(path);
    let root = normalize_path(content_root);
    if root.is_empty() {
        return path;
    }
    if path == root {
        return String::new();
    }
    match path.strip_prefix(&root).and_then(|rest| rest.strip_prefix('/')) {
        Some(rest) => rest.to_string(),
        None => path,
    }
}

/// Heuristic used when no supported-locale list is configured:
/// `xx` or `xx-YY`.
fn looks_like_locale(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    match bytes.len() {
        2 => bytes.iter().all(u8::is_ascii_alphabetic),
        5 => {
            bytes[..2].iter().all(u8::is_ascii_alphabetic)
                && bytes[2] == b'-'
                && bytes[3..].iter().all(u8::is_ascii_alphabetic)
        }
        _ => false,
    }
}

/// Match a path segment against the locale allow-list, or the pattern
/// heuristic when the list is empty. The list always wins when present.
fn match_locale(segment: &str, supported_locales: &[String]) -> Option<String> {
    if supported_locales.is_empty() {
        return looks_like_locale(segment).then(|| segment.to_string());
    }
    supported_locales
        .iter()
        .find(|locale| locale.eq_ignore_ascii_case(segment))
        .cloned()
}

/// Locale code of the first segment after `content_root`, if it is one.
pub fn detect_locale(path: &str, content_root: &str, supported_locales: &[String]) -> Option<String> {
    let relative = strip_content_root(path, content_root);
    let first = relative.split('/').next().unwrap_or_default();
    if first.is_empty() {
        return None;
    }
    match_locale(first, supported_locales)
}

/// Locale of a path, falling back to `default_locale`.
///
/// ```
/// use content_catalog::paths::extract_locale;
/// let locales = vec!["en".to_string(), "fr".to_string()];
/// assert_eq!(extract_locale("en/blog/post.md", "", &locales, "en"), "en");
/// assert_eq!(extract_locale("blog/post.md", "", &locales, "en"), "en");
/// assert_eq!(extract_locale("content/fr/a.md", "content", &locales, "en"), "fr");
/// ```
pub fn extract_locale(
    path: &str,
    content_root: &str,
    supported_locales: &[String],
    default_locale: &str,
) -> String {
    detect_locale(path, content_root, supported_locales).unwrap_or_else(|| default_locale.to_string())
}

/// Remove a leading locale segment from a path.
///
/// The content root is kept in place; only the first segment after it is
/// considered. Stripping an already stripped path is a no-op unless the next
/// segment happens to look like a locale too.
pub fn strip_locale(path: &str, content_root: &str, supported_locales: &[String]) -> String {
    let normalized = normalize_path(path);
    if detect_locale(&normalized, content_root, supported_locales).is_none() {
        return normalized;
    }
    let root = normalize_path(content_root);
    let relative = strip_content_root(&normalized, &root);
    let rest = relative.split_once('/').map(|(_, rest)| rest).unwrap_or_default();
    join_segments(&[root.as_str(), rest])
}

fn join_segments(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/")
}

/// Drop the skip segment and, when localization is on, a leading locale.
fn public_directory(dir: &str, localization_enabled: bool, supported_locales: &[String], skip_segment: &str) -> String {
    let relative = strip_content_root(dir, skip_segment);
    if !localization_enabled {
        return relative;
    }
    match relative.split_once('/') {
        Some((first, rest)) if match_locale(first, supported_locales).is_some() => rest.to_string(),
        None if match_locale(&relative, supported_locales).is_some() => String::new(),
        _ => relative,
    }
}

/// Public URL of a content file: its directory (minus skip segment and
/// locale) joined with `slug`.
///
/// ```
/// use content_catalog::paths::generate_url;
/// let locales = vec!["en".to_string(), "fr".to_string()];
/// assert_eq!(
///     generate_url("content/en/blog/post.md", "my-post", true, &locales, "content"),
///     "blog/my-post"
/// );
/// assert_eq!(generate_url("post.md", "hello", false, &[], ""), "hello");
/// ```
pub fn generate_url(
    path: &str,
    slug: &str,
    localization_enabled: bool,
    supported_locales: &[String],
    skip_segment: &str,
) -> String {
    let normalized = normalize_path(path);
    let dir = normalized.rsplit_once('/').map(|(dir, _)| dir).unwrap_or_default();
    let public = public_directory(dir, localization_enabled, supported_locales, skip_segment);
    join_segments(&[public.as_str(), slug])
}

/// Public URL of a directory, using the same stripping rules as
/// [`generate_url`] but keeping the last segment.
pub fn generate_directory_url(
    path: &str,
    localization_enabled: bool,
    supported_locales: &[String],
    skip_segment: &str,
) -> String {
    public_directory(&normalize_path(path), localization_enabled, supported_locales, skip_segment)
}

/// URL-safe slug. Empty results become `untitled`.
///
/// ```
/// use content_catalog::paths::generate_slug;
/// assert_eq!(generate_slug("  Hello,   World! -- 2024 "), "hello-world-2024");
/// assert_eq!(generate_slug("!!!"), "untitled");
/// ```
pub fn generate_slug(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    let mut pending_dash = false;

    for c in lowered.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '-' {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// Deterministic identifier: SHA-256 over the joined parts, truncated to
/// 128 bits, lowercase hex.
pub fn stable_id<S: AsRef<str>>(path: &str, extra: &[S]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    for part in extra {
        hasher.update(ID_SEPARATOR.as_bytes());
        hasher.update(part.as_ref().as_bytes());
    }
    let digest = hasher.finalize();
    digest[..ID_BYTES].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Localization settings for one provider, bundling the parameters the free
/// functions above take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Localization {
    pub enabled: bool,
    pub default_locale: String,
    pub supported_locales: Vec<String>,
}

impl Default for Localization {
    fn default() -> Self {
        Self {
            enabled: false,
            default_locale: "en".to_string(),
            supported_locales: Vec::new(),
        }
    }
}

impl Localization {
    /// Locale of a content path; always the default when disabled.
    pub fn locale_of(&self, path: &str, content_root: &str) -> String {
        if !self.enabled {
            return self.default_locale.clone();
        }
        extract_locale(path, content_root, &self.supported_locales, &self.default_locale)
    }

    /// Explicit locale segment of a directory path, if any.
    pub fn directory_locale(&self, path: &str, content_root: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        detect_locale(path, content_root, &self.supported_locales)
    }

    pub fn url_for(&self, path: &str, slug: &str, content_root: &str) -> String {
        generate_url(path, slug, self.enabled, &self.supported_locales, content_root)
    }

    pub fn directory_url_for(&self, path: &str, content_root: &str) -> String {
        generate_directory_url(path, self.enabled, &self.supported_locales, content_root)
    }
}
