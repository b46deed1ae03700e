use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Timestamp layout used in metadata files and the commit journal.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Longest accepted commit message, in characters.
pub const MAX_MESSAGE_LEN: usize = 500;

pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub id: Option<i64>,
    pub name: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub description: Option<String>,
}

impl RepositoryInfo {
    pub fn new(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        Self {
            id: None,
            name,
            path,
            created_at: now(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

/// An immutable snapshot record. Equality is by identifier only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    id: String,
    message: String,
    summary: String,
    author: String,
    timestamp: DateTime<Utc>,
    files: Vec<String>,
}

impl Commit {
    pub fn new(
        id: String,
        message: String,
        summary: String,
        author: String,
        timestamp: DateTime<Utc>,
        files: Vec<String>,
    ) -> Self {
        Self {
            id,
            message,
            summary,
            author,
            timestamp,
            files,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.iter().any(|f| f == path)
    }
}

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Commit {}

/// Staged rows are deleted once their commit is recorded, so `Staged` is the
/// only state a row can be read back in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StagedStatus {
    Staged,
}

impl StagedStatus {
    pub fn as_str(&self) -> &str {
        match self {
            StagedStatus::Staged => "staged",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "staged" => Some(StagedStatus::Staged),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedFile {
    pub repo_id: Option<i64>,
    /// Path as staged: relative to the repository root, or absolute for
    /// files staged from the root's parent directory.
    pub path: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub status: StagedStatus,
    pub created_at: DateTime<Utc>,
}

impl StagedFile {
    pub fn new(path: String, size: u64, last_modified: DateTime<Utc>) -> Self {
        Self {
            repo_id: None,
            path,
            size,
            last_modified,
            status: StagedStatus::Staged,
            created_at: now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Added,
    Modified,
    Removed,
}

impl FileStatus {
    pub fn as_str(&self) -> &str {
        match self {
            FileStatus::Added => "added",
            FileStatus::Modified => "modified",
            FileStatus::Removed => "removed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "added" => Some(FileStatus::Added),
            "modified" => Some(FileStatus::Modified),
            "removed" => Some(FileStatus::Removed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitFile {
    pub commit_id: String,
    pub path: String,
    pub size: u64,
    pub status: FileStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub repo_id: i64,
    pub operation: String,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

/// Which stores a repository is currently writing to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    Dual,
    FilesystemOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub repository: RepositoryInfo,
    pub head: Option<String>,
    pub staged: Vec<StagedFile>,
    /// Staged files whose working copy no longer matches the staged bytes.
    pub modified_since_staged: Vec<String>,
    pub commit_count: usize,
    pub store_mode: StoreMode,
}

/// Result of staging a single path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome {
    pub entry: StagedFile,
    /// False when the path was already staged and nothing was copied.
    pub newly_staged: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageAllReport {
    /// New candidate files examined (already staged files are not revisited).
    pub processed: usize,
    pub added: Vec<String>,
    /// Files that could not be staged; the batch continues past them.
    pub skipped: Vec<String>,
    pub already_staged: usize,
    pub cancelled: bool,
}

impl StageAllReport {
    pub fn added_count(&self) -> usize {
        self.added.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(id: &str, files: &[&str]) -> Commit {
        Commit::new(
            id.to_string(),
            "msg".to_string(),
            String::new(),
            "tester".to_string(),
            now(),
            files.iter().map(|f| f.to_string()).collect(),
        )
    }

    #[test]
    fn test_commit_equality_is_by_id() {
        let a = commit("abc12345", &["a.txt"]);
        let b = commit("abc12345", &["b.txt", "c.txt"]);
        let c = commit("def67890", &["a.txt"]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(b.file_count(), 2);
    }

    #[test]
    fn test_timestamp_round_trip() {
        let ts = now();
        let parsed = parse_timestamp(&format_timestamp(&ts)).unwrap();
        assert_eq!(ts, parsed);
        assert!(parse_timestamp("not a date").is_none());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(FileStatus::parse("removed"), Some(FileStatus::Removed));
        assert_eq!(StagedStatus::parse("staged"), Some(StagedStatus::Staged));
        assert_eq!(FileStatus::parse("renamed"), None);
    }

    #[test]
    fn test_repository_name_from_path() {
        let info = RepositoryInfo::new(PathBuf::from("/work/notes"));
        assert_eq!(info.name, "notes");
        assert!(info.id.is_none());
    }
}
