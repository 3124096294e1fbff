use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::{
    config::GitHubSettings,
    error::{ContentError, Result},
    paths::normalize_path,
    source::{ContentSource, ContentWriter},
    types::{DirectoryEntry, DirectoryListing, EntryType, FileContent, WriteReceipt},
};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "content-catalog/0.1";

/// GitHub-backed content source
///
/// Talks to the REST contents API (`/repos/{owner}/{repo}/contents/{path}`)
/// for listings, file bodies and writes. Without a token only public
/// repositories are reachable and the anonymous rate limit applies.
#[derive(Clone)]
pub struct GitHubSource {
    client: Client,
    api_base: String,
    owner: String,
    repo: String,
    branch: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct ApiEntry {
    name: String,
    path: String,
    sha: String,
    #[serde(default)]
    size: u64,
    #[serde(rename = "type")]
    entry_type: String,
    download_url: Option<String>,
}

#[derive(Deserialize)]
struct ApiFile {
    #[serde(rename = "type")]
    entry_type: String,
    path: String,
    sha: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
    download_url: Option<String>,
}

/// The contents endpoint answers with an array for directories and an
/// object for files.
#[derive(Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Listing(Vec<ApiEntry>),
    Single(Box<ApiFile>),
}

#[derive(Serialize)]
struct PutRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
}

#[derive(Deserialize)]
struct PutResponse {
    content: ShaRef,
    commit: Option<ShaRef>,
}

#[derive(Deserialize)]
struct ShaRef {
    sha: String,
}

impl GitHubSource {
    /// Create a new GitHub source
    ///
    /// # Arguments
    /// * `owner` - Repository owner (user or organization)
    /// * `repo` - Repository name
    /// * `branch` - Branch or ref to read from and commit to
    pub fn new(owner: String, repo: String, branch: String) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            owner,
            repo,
            branch,
            token: None,
        }
    }

    /// Build a source from its configuration section
    pub fn from_settings(settings: &GitHubSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ContentError::InvalidConfig {
                message: format!("cannot build HTTP client: {}", e),
            })?;

        let mut source = Self::new(
            settings.owner.clone(),
            settings.repo.clone(),
            settings.branch.clone(),
        )
        .with_client(client)
        .with_api_base(settings.api_base.clone());
        if let Some(token) = settings.token.as_deref().filter(|t| !t.is_empty()) {
            source = source.with_token(token);
        }
        Ok(source)
    }

    /// Authenticate requests with a bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Point the source at a different API host (GitHub Enterprise, tests)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Share an existing connection pool
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Build the contents endpoint URL for a repository path
    fn contents_url(&self, path: &str) -> Result<Url> {
        let mut url = Url::parse(&self.api_base).map_err(|e| ContentError::InvalidConfig {
            message: format!("invalid API base '{}': {}", self.api_base, e),
        })?;
        let normalized = normalize_path(path);
        url.path_segments_mut()
            .map_err(|_| ContentError::InvalidConfig {
                message: format!("API base '{}' cannot carry a path", self.api_base),
            })?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str(), "contents"])
            .extend(normalized.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(header::ACCEPT, "application/vnd.github.v3+json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_contents(&self, path: &str) -> Result<ContentsResponse> {
        let url = self.contents_url(path)?;
        let response = self
            .request(Method::GET, url)
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await?;
        let response = check_status(response, path).await?;
        Ok(response.json().await?)
    }

    async fn download_raw(&self, path: &str, download_url: &str) -> Result<Bytes> {
        let url = Url::parse(download_url).map_err(|e| ContentError::InvalidStructure {
            message: format!("invalid download_url for {}: {}", path, e),
        })?;
        let mut builder = self.client.get(url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        let response = check_status(builder.send().await?, path).await?;
        Ok(response.bytes().await?)
    }
}

/// Map a non-success response onto the error taxonomy
async fn check_status(response: Response, path: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false);
    let body = response.text().await.unwrap_or_default();
    let message = format!("{} for {}: {}", status, path, body.trim());

    Err(match status {
        StatusCode::NOT_FOUND => ContentError::NotFound {
            path: path.to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => ContentError::RateLimited { message },
        StatusCode::FORBIDDEN if exhausted => ContentError::RateLimited { message },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ContentError::Unauthorized { message },
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            ContentError::ValidationFailed { message }
        }
        s if s.is_server_error() => ContentError::TransientNetwork {
            message,
            source: None,
        },
        _ => ContentError::InvalidStructure { message },
    })
}

/// Decode a base64 payload, tolerating the line breaks GitHub inserts
fn decode_base64(path: &str, payload: &str) -> Result<Bytes> {
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map(Bytes::from)
        .map_err(|e| ContentError::InvalidStructure {
            message: format!("bad base64 content for {}: {}", path, e),
        })
}

#[async_trait]
impl ContentSource for GitHubSource {
    #[tracing::instrument(level = "debug", skip(self), fields(repo = %self.repo))]
    async fn fetch_file(&self, path: &str) -> Result<FileContent> {
        let file = match self.get_contents(path).await? {
            ContentsResponse::Single(file) if file.entry_type == "file" => file,
            _ => {
                return Err(ContentError::InvalidStructure {
                    message: format!("{} is not a file", path),
                })
            }
        };

        let inline = match (file.encoding.as_deref(), file.content.as_deref()) {
            (Some("base64"), Some(payload)) if !payload.is_empty() || file.size == 0 => {
                Some(decode_base64(path, payload)?)
            }
            _ => None,
        };
        let content = match (inline, file.download_url.as_deref()) {
            (Some(bytes), _) => bytes,
            // Files above the contents API size cap come back without a body
            (None, Some(download_url)) => {
                tracing::debug!(path, size = file.size, "Inline content missing; downloading raw file");
                self.download_raw(path, download_url).await?
            }
            (None, None) => {
                return Err(ContentError::InvalidStructure {
                    message: format!("{} has neither inline content nor a download_url", path),
                })
            }
        };

        Ok(FileContent {
            content,
            path: file.path,
            sha: file.sha,
        })
    }

    #[tracing::instrument(level = "debug", skip(self), fields(repo = %self.repo))]
    async fn list_directory(&self, path: &str) -> Result<DirectoryListing> {
        let api_entries = match self.get_contents(path).await? {
            ContentsResponse::Listing(entries) => entries,
            ContentsResponse::Single(_) => {
                return Err(ContentError::InvalidStructure {
                    message: format!("{} is not a directory", path),
                })
            }
        };

        let entries = api_entries
            .into_iter()
            .filter_map(|e| {
                let entry_type = match e.entry_type.as_str() {
                    "file" => EntryType::File,
                    "dir" => EntryType::Dir,
                    other => {
                        tracing::debug!(path = %e.path, kind = other, "Skipping unsupported entry type");
                        return None;
                    }
                };
                Some(DirectoryEntry {
                    name: e.name,
                    path: e.path,
                    entry_type,
                    sha: e.sha,
                    size: e.size,
                    download_url: e.download_url,
                })
            })
            .collect();

        Ok(DirectoryListing {
            path: normalize_path(path),
            entries,
        })
    }

    fn identifier(&self) -> String {
        format!("github://{}/{}/{}", self.owner, self.repo, self.branch)
    }
}

#[async_trait]
impl ContentWriter for GitHubSource {
    #[tracing::instrument(level = "debug", skip(self, content), fields(bytes = content.len()))]
    async fn put_file(
        &self,
        path: &str,
        content: Bytes,
        message: &str,
        sha: Option<&str>,
    ) -> Result<WriteReceipt> {
        let url = self.contents_url(path)?;
        let body = PutRequest {
            message,
            content: STANDARD.encode(&content),
            branch: &self.branch,
            sha,
        };
        let response = self.request(Method::PUT, url).json(&body).send().await?;
        let response = check_status(response, path).await?;
        let parsed: PutResponse = response.json().await?;

        Ok(WriteReceipt {
            sha: parsed.content.sha,
            commit_sha: parsed.commit.map(|c| c.sha),
        })
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete_file(&self, path: &str, message: &str, sha: &str) -> Result<()> {
        let url = self.contents_url(path)?;
        let body = DeleteRequest {
            message,
            sha,
            branch: &self.branch,
        };
        let response = self.request(Method::DELETE, url).json(&body).send().await?;
        check_status(response, path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> GitHubSource {
        GitHubSource::new("owner".to_string(), "repo".to_string(), "main".to_string())
    }

    #[test]
    fn test_contents_url() {
        let url = source().contents_url("content/en/post.md").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/owner/repo/contents/content/en/post.md"
        );
    }

    #[test]
    fn test_contents_url_normalizes_and_encodes() {
        let source = source().with_api_base("http://localhost:8080/api/");

        let url = source.contents_url("\\docs//my notes/").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/repos/owner/repo/contents/docs/my%20notes"
        );

        let root = source.contents_url("").unwrap();
        assert_eq!(root.as_str(), "http://localhost:8080/api/repos/owner/repo/contents");
    }

    #[test]
    fn test_invalid_api_base() {
        let source = source().with_api_base("not a url");
        assert!(matches!(
            source.contents_url("x"),
            Err(ContentError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_decode_base64_with_line_breaks() {
        let decoded = decode_base64("a.md", "SGVsbG8s\nIFdvcmxk\nIQ==\n").unwrap();
        assert_eq!(decoded, Bytes::from("Hello, World!"));
        assert!(matches!(
            decode_base64("a.md", "***"),
            Err(ContentError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn test_identifier() {
        assert_eq!(source().identifier(), "github://owner/repo/main");
    }
}
