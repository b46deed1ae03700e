//! Differences between two commits.
//!
//! File sets are compared exactly. Line changes use a set comparison: a line
//! of the old file missing from the new file's line set is removed, and vice
//! versa. Reordered lines therefore show up as add/remove pairs; no
//! positional alignment is attempted. [`unified_patches`] offers an
//! alignment-based rendering as a separate, explicitly requested view.

use crate::error::{Error, Result};
use crate::fs_store::Layout;
use crate::models::Commit;
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// Source of a committed file's bytes.
pub trait SnapshotReader {
    fn read(&self, commit_id: &str, path: &str) -> Result<Vec<u8>>;
}

impl SnapshotReader for Layout {
    fn read(&self, commit_id: &str, path: &str) -> Result<Vec<u8>> {
        let location = self.snapshot_copy(commit_id, path);
        std::fs::read(&location).map_err(|e| Error::path_io(&location, e))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDiff {
    pub from: String,
    pub to: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub common: Vec<String>,
    /// Line changes of common files; only filled in detailed mode and only
    /// for files that actually differ.
    pub files: Vec<FileDiff>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: String,
    pub added_lines: Vec<String>,
    pub removed_lines: Vec<String>,
    /// Contents differ but are not valid UTF-8.
    pub binary: bool,
}

impl FileDiff {
    pub fn is_empty(&self) -> bool {
        !self.binary && self.added_lines.is_empty() && self.removed_lines.is_empty()
    }
}

impl CommitDiff {
    /// No files added or removed and no line changes.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.files.iter().all(FileDiff::is_empty)
    }
}

/// Compares the changed-file sets of `from` and `to`, and in detailed mode the
/// stored contents of files present in both.
pub fn diff_commits(
    from: &Commit,
    to: &Commit,
    detailed: bool,
    reader: &dyn SnapshotReader,
) -> Result<CommitDiff> {
    let old: BTreeSet<&str> = from.files().iter().map(String::as_str).collect();
    let new: BTreeSet<&str> = to.files().iter().map(String::as_str).collect();

    let mut diff = CommitDiff {
        from: from.id().to_string(),
        to: to.id().to_string(),
        added: new.difference(&old).map(|s| s.to_string()).collect(),
        removed: old.difference(&new).map(|s| s.to_string()).collect(),
        common: old.intersection(&new).map(|s| s.to_string()).collect(),
        files: Vec::new(),
    };

    if !detailed || from.id() == to.id() {
        return Ok(diff);
    }

    for path in &diff.common {
        let before = reader.read(from.id(), path)?;
        let after = reader.read(to.id(), path)?;
        if before == after {
            continue;
        }

        let file_diff = match (std::str::from_utf8(&before), std::str::from_utf8(&after)) {
            (Ok(old_text), Ok(new_text)) => {
                let (added_lines, removed_lines) = line_diff(old_text, new_text);
                FileDiff {
                    path: path.clone(),
                    added_lines,
                    removed_lines,
                    binary: false,
                }
            }
            _ => FileDiff {
                path: path.clone(),
                binary: true,
                ..FileDiff::default()
            },
        };

        if !file_diff.is_empty() {
            diff.files.push(file_diff);
        }
    }

    Ok(diff)
}

/// Set-based line comparison returning `(added, removed)` in file order.
pub fn line_diff(old_text: &str, new_text: &str) -> (Vec<String>, Vec<String>) {
    let old_lines: HashSet<&str> = old_text.lines().collect();
    let new_lines: HashSet<&str> = new_text.lines().collect();

    let removed = old_text
        .lines()
        .filter(|line| !new_lines.contains(line))
        .map(String::from)
        .collect();
    let added = new_text
        .lines()
        .filter(|line| !old_lines.contains(line))
        .map(String::from)
        .collect();

    (added, removed)
}

/// Unified patches for every file in either commit, aligned with a
/// longest-common-subsequence diff.
pub fn unified_patches(
    from: &Commit,
    to: &Commit,
    reader: &dyn SnapshotReader,
    context_lines: usize,
) -> Result<String> {
    let paths: BTreeSet<&String> = from.files().iter().chain(to.files()).collect();
    let mut output = String::new();

    for path in paths {
        let before = if from.contains(path) {
            reader.read(from.id(), path)?
        } else {
            Vec::new()
        };
        let after = if to.contains(path) {
            reader.read(to.id(), path)?
        } else {
            Vec::new()
        };
        if before == after {
            continue;
        }

        match (std::str::from_utf8(&before), std::str::from_utf8(&after)) {
            (Ok(old_text), Ok(new_text)) => {
                let patch = TextDiff::from_lines(old_text, new_text)
                    .unified_diff()
                    .context_radius(context_lines)
                    .header(&format!("a/{}", path), &format!("b/{}", path))
                    .to_string();
                output.push_str(&patch);
            }
            _ => output.push_str(&format!("Binary files a/{} and b/{} differ\n", path, path)),
        }
    }

    Ok(output)
}

impl fmt::Display for CommitDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Diff {}..{}", self.from, self.to)?;
        writeln!(f, "Added: {}", self.added.len())?;
        writeln!(f, "Removed: {}", self.removed.len())?;
        writeln!(f, "Common: {}", self.common.len())?;

        let sections: [(&str, &str, &Vec<String>); 3] = [
            ("Added files", "+", &self.added),
            ("Removed files", "-", &self.removed),
            ("Common files", " ", &self.common),
        ];
        for (title, marker, paths) in sections {
            if paths.is_empty() {
                continue;
            }
            writeln!(f)?;
            writeln!(f, "{}:", title)?;
            for path in paths {
                writeln!(f, "  {} {}", marker, path)?;
            }
        }

        for file in &self.files {
            writeln!(f)?;
            writeln!(f, "--- {}", file.path)?;
            if file.binary {
                writeln!(f, "  [binary content differs]")?;
                continue;
            }
            for line in &file.removed_lines {
                writeln!(f, "- {}", line)?;
            }
            for line in &file.added_lines {
                writeln!(f, "+ {}", line)?;
            }
        }

        Ok(())
    }
}
