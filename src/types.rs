use serde::{Deserialize, Serialize};

/// A file's raw bytes plus the version marker reported by the source
#[derive(Debug, Clone)]
pub struct FileContent {
    /// Decoded bytes of the file
    pub content: bytes::Bytes,
    /// Repository path the file was read from
    pub path: String,
    /// Git blob SHA, used as the version marker for writes
    pub sha: String,
}

/// One entry of a remote directory listing
///
/// Only lives for the duration of a tree-build pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Name of the file or folder
    pub name: String,
    /// Path relative to the repository root
    pub path: String,
    /// Type of entry
    pub entry_type: EntryType,
    /// Git blob/tree SHA
    pub sha: String,
    /// Size in bytes (zero for directories)
    pub size: u64,
    /// Direct download locator, absent for directories
    pub download_url: Option<String>,
}

impl DirectoryEntry {
    pub fn is_dir(&self) -> bool {
        self.entry_type == EntryType::Dir
    }
}

/// Type of directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Dir,
}

/// Result of listing a directory
#[derive(Debug, Clone)]
pub struct DirectoryListing {
    /// The path that was listed
    pub path: String,
    /// Entries in upstream order
    pub entries: Vec<DirectoryEntry>,
}

/// Outcome of a successful write against the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    /// New blob SHA of the written file
    pub sha: String,
    /// SHA of the commit that carried the change, when reported
    pub commit_sha: Option<String>,
}
