//! On-disk layout under `<root>/data`: staged index, commit snapshots,
//! metadata files, the commit journal, HEAD and the write-ahead commit intent.

use crate::error::{Error, Result};
use crate::models::{format_timestamp, parse_timestamp, Commit};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

pub const DATA_DIR: &str = "data";
const INDEX_DIR: &str = "index";
const COMMITS_DIR: &str = "commits";
const STAGED_LIST: &str = "staged_files.txt";
const HEAD_FILE: &str = "head.txt";
const JOURNAL_FILE: &str = "commits.log";
const INTENT_FILE: &str = "commit.intent";
const SNAPSHOT_DIR: &str = "snapshot";
const METADATA_FILE: &str = "metadata.txt";
/// Mirror prefix for files staged from the root's parent directory.
const PARENT_MIRROR: &str = "_parent";

/// Index entries owned by the store itself, including their atomic-write temps.
const RESERVED_INDEX_NAMES: [&str; 4] = [STAGED_LIST, HEAD_FILE, "staged_files.tmp", "head.tmp"];

const JOURNAL_HEADER: &str = "=== COMMIT ";
const JOURNAL_FOOTER: &str = "=== END COMMIT ===";

#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
    data: PathBuf,
}

impl Layout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            data: root.join(DATA_DIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> &Path {
        &self.data
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data.join(INDEX_DIR)
    }

    pub fn commits_dir(&self) -> PathBuf {
        self.data.join(COMMITS_DIR)
    }

    pub fn staged_list_path(&self) -> PathBuf {
        self.index_dir().join(STAGED_LIST)
    }

    pub fn head_path(&self) -> PathBuf {
        self.index_dir().join(HEAD_FILE)
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data.join(JOURNAL_FILE)
    }

    pub fn intent_path(&self) -> PathBuf {
        self.commits_dir().join(INTENT_FILE)
    }

    pub fn commit_dir(&self, commit_id: &str) -> PathBuf {
        self.commits_dir().join(format!("commit_{}", commit_id))
    }

    pub fn snapshot_dir(&self, commit_id: &str) -> PathBuf {
        self.commit_dir(commit_id).join(SNAPSHOT_DIR)
    }

    pub fn metadata_path(&self, commit_id: &str) -> PathBuf {
        self.commit_dir(commit_id).join(METADATA_FILE)
    }

    pub fn is_initialized(&self) -> bool {
        self.index_dir().is_dir() && self.commits_dir().is_dir()
    }

    pub fn ensure(&self) -> Result<()> {
        for dir in [self.index_dir(), self.commits_dir()] {
            fs::create_dir_all(&dir).map_err(|e| Error::path_io(&dir, e))?;
        }
        for file in [self.staged_list_path(), self.head_path(), self.journal_path()] {
            if !file.exists() {
                fs::write(&file, "").map_err(|e| Error::path_io(&file, e))?;
            }
        }
        Ok(())
    }

    /// Relative location of a staged path inside the index or a snapshot.
    pub fn mirror_relative(&self, staged_path: &str) -> PathBuf {
        let path = Path::new(staged_path);
        if !path.is_absolute() {
            return path.to_path_buf();
        }

        let stripped = self
            .root
            .parent()
            .and_then(|parent| path.strip_prefix(parent).ok())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| {
                path.components()
                    .filter(|c| matches!(c, Component::Normal(_)))
                    .collect()
            });
        Path::new(PARENT_MIRROR).join(stripped)
    }

    /// Whether a root-relative staged path would mirror onto the index's own
    /// bookkeeping files or into the sibling-file mirror.
    pub fn is_reserved_key(relative: &str) -> bool {
        let first = relative.split('/').next().unwrap_or(relative);
        first.eq_ignore_ascii_case(PARENT_MIRROR)
            || (!relative.contains('/')
                && RESERVED_INDEX_NAMES
                    .iter()
                    .any(|name| relative.eq_ignore_ascii_case(name)))
    }

    pub fn index_copy(&self, staged_path: &str) -> PathBuf {
        self.index_dir().join(self.mirror_relative(staged_path))
    }

    pub fn snapshot_copy(&self, commit_id: &str, path: &str) -> PathBuf {
        self.snapshot_dir(commit_id).join(self.mirror_relative(path))
    }

    /// Absolute working-tree location of a staged path.
    pub fn working_path(&self, staged_path: &str) -> PathBuf {
        let path = Path::new(staged_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    // Staged list

    pub fn read_staged_list(&self) -> Result<Vec<String>> {
        let path = self.staged_list_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path).map_err(|e| Error::path_io(&path, e))?;
        Ok(raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    pub fn write_staged_list(&self, paths: &[String]) -> Result<()> {
        let mut body = paths.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        write_atomic(&self.staged_list_path(), body.as_bytes())
    }

    /// Removes every mirrored index copy, keeping the staged list and HEAD files.
    pub fn clear_index_copies(&self) -> Result<()> {
        let index = self.index_dir();
        let entries = fs::read_dir(&index).map_err(|e| Error::path_io(&index, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::path_io(&index, e))?;
            let name = entry.file_name();
            if name == STAGED_LIST || name == HEAD_FILE {
                continue;
            }
            let path = entry.path();
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            result.map_err(|e| Error::path_io(&path, e))?;
        }
        Ok(())
    }

    // HEAD

    pub fn read_head(&self) -> Result<Option<String>> {
        let path = self.head_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(|e| Error::path_io(&path, e))?;
        let head = raw.trim();
        Ok((!head.is_empty()).then(|| head.to_string()))
    }

    pub fn write_head(&self, commit_id: &str) -> Result<()> {
        write_atomic(&self.head_path(), format!("{}\n", commit_id).as_bytes())
    }

    // Commit metadata

    pub fn write_metadata(&self, commit: &Commit) -> Result<()> {
        let body = format!(
            "COMMIT_ID={}\nMESSAGE={}\nTIMESTAMP={}\nSUMMARY={}\nAUTHOR={}\nFILE_COUNT={}\nFILES={}\n",
            commit.id(),
            escape(commit.message()),
            format_timestamp(&commit.timestamp()),
            escape(commit.summary()),
            escape(commit.author()),
            commit.file_count(),
            commit.files().join(","),
        );
        write_atomic(&self.metadata_path(commit.id()), body.as_bytes())
    }

    pub fn read_metadata(&self, commit_id: &str) -> Result<Commit> {
        let path = self.metadata_path(commit_id);
        if !path.exists() {
            return Err(Error::CommitNotFound(commit_id.to_string()));
        }
        let raw = fs::read_to_string(&path).map_err(|e| Error::path_io(&path, e))?;
        parse_metadata(&raw).ok_or_else(|| {
            Error::InvalidPath(format!("malformed metadata file {}", path.display()))
        })
    }

    // Journal

    pub fn append_journal(&self, commit: &Commit) -> Result<()> {
        let path = self.journal_path();
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::path_io(&path, e))?;

        let entry = format!(
            "{header}{id} ===\nMessage: {message}\nTimestamp: {ts}\nSummary: {summary}\nFiles: {files}\nFile Count: {count}\n{footer}\n\n",
            header = JOURNAL_HEADER,
            id = commit.id(),
            message = escape(commit.message()),
            ts = format_timestamp(&commit.timestamp()),
            summary = escape(commit.summary()),
            files = commit.files().join(", "),
            count = commit.file_count(),
            footer = JOURNAL_FOOTER,
        );
        file.write_all(entry.as_bytes())
            .and_then(|_| file.sync_data())
            .map_err(|e| Error::path_io(&path, e))
    }

    /// Commit ids in journal (creation) order. Only entries with a footer count.
    pub fn read_journal_ids(&self) -> Result<Vec<String>> {
        let path = self.journal_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path).map_err(|e| Error::path_io(&path, e))?;

        let mut ids = Vec::new();
        let mut open: Option<String> = None;
        for line in raw.lines() {
            if line == JOURNAL_FOOTER {
                if let Some(id) = open.take() {
                    ids.push(id);
                }
            } else if let Some(rest) = line.strip_prefix(JOURNAL_HEADER) {
                open = rest.strip_suffix(" ===").map(|id| id.trim().to_string());
            }
        }
        Ok(ids)
    }

    // Write-ahead intent

    pub fn write_intent(&self, commit: &Commit) -> Result<()> {
        let body = format!(
            "COMMIT_ID={}\nTIMESTAMP={}\n",
            commit.id(),
            format_timestamp(&commit.timestamp())
        );
        write_atomic(&self.intent_path(), body.as_bytes())
    }

    pub fn read_intent(&self) -> Result<Option<String>> {
        let path = self.intent_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(|e| Error::path_io(&path, e))?;
        Ok(parse_key_values(&raw).remove("COMMIT_ID"))
    }

    pub fn clear_intent(&self) -> Result<()> {
        let path = self.intent_path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::path_io(&path, e)),
        }
    }

    pub fn remove_commit_dir(&self, commit_id: &str) -> Result<()> {
        let dir = self.commit_dir(commit_id);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| Error::path_io(&dir, e))?;
        }
        Ok(())
    }
}

/// Copies `src` to `dst`, creating parent directories as needed.
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::path_io(parent, e))?;
    }
    let bytes = fs::copy(src, dst).map_err(|e| Error::path_io(src, e))?;
    debug!("Copied {:?} -> {:?} ({} bytes)", src, dst, bytes);
    Ok(bytes)
}

/// SHA-256 of a file's bytes, hex encoded.
pub fn file_digest(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| Error::path_io(path, e))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::path_io(parent, e))?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|e| Error::path_io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| Error::path_io(path, e))
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn parse_key_values(raw: &str) -> HashMap<String, String> {
    raw.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .collect()
}

fn parse_metadata(raw: &str) -> Option<Commit> {
    let mut fields = parse_key_values(raw);
    let id = fields.remove("COMMIT_ID")?;
    let message = unescape(&fields.remove("MESSAGE")?);
    let timestamp = parse_timestamp(&fields.remove("TIMESTAMP")?)?;
    let summary = fields.remove("SUMMARY").map(|s| unescape(&s)).unwrap_or_default();
    let author = fields.remove("AUTHOR").map(|s| unescape(&s)).unwrap_or_default();
    let files: Vec<String> = fields
        .remove("FILES")
        .map(|f| {
            f.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    Some(Commit::new(id, message, summary, author, timestamp, files))
}
