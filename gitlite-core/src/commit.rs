//! Building blocks of the commit pipeline: message validation, identifier
//! generation, snapshot persistence and history rows.
//!
//! The ordering across stores lives in [`crate::repository::Repository::commit`].

use crate::error::{Error, Result};
use crate::fs_store::{copy_file, Layout};
use crate::models::{now, Commit, CommitFile, FileStatus, StagedFile, MAX_MESSAGE_LEN};
use crate::summary::summarize;
use tracing::{debug, warn};
use uuid::Uuid;

const ID_LEN: usize = 8;

pub fn validate_message(message: &str) -> Result<()> {
    if message.trim().is_empty() {
        return Err(Error::InvalidMessage("message must not be empty".to_string()));
    }
    let len = message.chars().count();
    if len > MAX_MESSAGE_LEN {
        return Err(Error::InvalidMessage(format!(
            "message is {} characters, limit is {}",
            len, MAX_MESSAGE_LEN
        )));
    }
    Ok(())
}

/// A random short token that `taken` does not already claim.
pub fn new_commit_id(taken: impl Fn(&str) -> bool) -> String {
    loop {
        let candidate = Uuid::new_v4().simple().to_string()[..ID_LEN].to_string();
        if !taken(&candidate) {
            return candidate;
        }
        debug!("Commit id {} already in use, drawing another", candidate);
    }
}

/// Previous-commit files that are not staged again but still exist in the
/// working tree. They stay part of the new commit with their last committed
/// bytes.
pub fn carried_paths(layout: &Layout, staged: &[StagedFile], previous: Option<&Commit>) -> Vec<String> {
    previous
        .map(|prev| {
            prev.files()
                .iter()
                .filter(|path| !staged.iter().any(|s| &s.path == *path))
                .filter(|path| layout.working_path(path).exists())
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

/// Assembles the commit record for the staged set plus the carried paths.
/// The summary is derived from the previous commit unless the caller
/// supplies a non-blank one.
pub fn build(
    id: String,
    message: &str,
    summary: Option<String>,
    author: &str,
    staged: &[StagedFile],
    carried: &[String],
    previous: Option<&Commit>,
) -> Commit {
    let files: Vec<String> = staged
        .iter()
        .map(|s| s.path.clone())
        .chain(carried.iter().cloned())
        .collect();
    let summary = summary
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| summarize(&files, previous));

    Commit::new(
        id,
        message.to_string(),
        summary,
        author.to_string(),
        now(),
        files,
    )
}

/// Writes the intent record, copies every file of the commit into its
/// snapshot directory and writes `metadata.txt`. Staged files come from the
/// index, carried files from the previous snapshot. On failure the partial
/// directory is removed on a best-effort basis.
pub fn write_snapshot(
    layout: &Layout,
    commit: &Commit,
    staged: &[StagedFile],
    previous: Option<&Commit>,
) -> Result<()> {
    layout.write_intent(commit)?;

    let source = |path: &str| match previous {
        Some(prev) if !staged.iter().any(|s| s.path == path) => {
            layout.snapshot_copy(prev.id(), path)
        }
        _ => layout.index_copy(path),
    };

    let result = commit
        .files()
        .iter()
        .try_for_each(|path| {
            copy_file(&source(path), &layout.snapshot_copy(commit.id(), path)).map(|_| ())
        })
        .and_then(|_| layout.write_metadata(commit));

    if let Err(e) = &result {
        warn!("Snapshot for commit {} failed: {}", commit.id(), e);
        if let Err(cleanup) = layout.remove_commit_dir(commit.id()) {
            warn!("Could not remove partial snapshot {}: {}", commit.id(), cleanup);
        } else {
            let _ = layout.clear_intent();
        }
    }

    result
}

/// Appends the journal entry and advances HEAD; the filesystem commit point.
pub fn finalize(layout: &Layout, commit: &Commit) -> Result<()> {
    layout.append_journal(commit)?;
    layout.write_head(commit.id())
}

/// History rows for `commit`: each of `changed` as added or modified relative
/// to `previous`, plus `removed` rows for `removed` paths. Carried files that
/// did not change get no row.
pub fn file_rows(
    commit: &Commit,
    changed: &[String],
    previous: Option<&Commit>,
    size_of: impl Fn(&str) -> u64,
    removed: &[String],
) -> Vec<CommitFile> {
    let mut rows: Vec<CommitFile> = changed
        .iter()
        .map(|path| CommitFile {
            commit_id: commit.id().to_string(),
            path: path.clone(),
            size: size_of(path),
            status: if previous.map(|p| p.contains(path)).unwrap_or(false) {
                FileStatus::Modified
            } else {
                FileStatus::Added
            },
        })
        .collect();

    rows.extend(removed.iter().map(|path| CommitFile {
        commit_id: commit.id().to_string(),
        path: path.clone(),
        size: 0,
        status: FileStatus::Removed,
    }));

    rows
}

/// Paths of `previous` that did not make it into `commit`.
pub fn removed_paths(commit: &Commit, previous: Option<&Commit>) -> Vec<String> {
    previous
        .map(|prev| {
            prev.files()
                .iter()
                .filter(|path| !commit.contains(path))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    fn staged(paths: &[&str]) -> Vec<StagedFile> {
        paths
            .iter()
            .map(|p| StagedFile::new(p.to_string(), 3, now()))
            .collect()
    }

    #[test]
    fn test_validate_message() {
        assert!(validate_message("first").is_ok());
        assert!(matches!(validate_message(""), Err(Error::InvalidMessage(_))));
        assert!(matches!(validate_message("   \n"), Err(Error::InvalidMessage(_))));
        assert!(validate_message(&"x".repeat(MAX_MESSAGE_LEN)).is_ok());
        assert!(matches!(
            validate_message(&"x".repeat(MAX_MESSAGE_LEN + 1)),
            Err(Error::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_ids_are_short_and_unique() {
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let id = new_commit_id(|candidate| seen.contains(candidate));
            assert_eq!(id.len(), ID_LEN);
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn test_build_uses_supplied_summary() {
        let files = staged(&["a.rs"]);
        let auto = build("id000001".into(), "m", None, "me", &files, &[], None);
        let custom = build("id000002".into(), "m", Some("hand written".into()), "me", &files, &[], None);
        let blank = build("id000003".into(), "m", Some("  ".into()), "me", &files, &[], None);

        assert_eq!(auto.summary(), "Added 1 files (total: 1) [code: 1]");
        assert_eq!(custom.summary(), "hand written");
        assert_eq!(blank.summary(), auto.summary());
        assert_eq!(auto.file_count(), 1);
    }

    #[test]
    fn test_file_rows_statuses() {
        let prev = build("prev0001".into(), "m", None, "me", &staged(&["a.txt", "b.txt"]), &[], None);
        let next = build("next0001".into(), "m", None, "me", &staged(&["a.txt", "c.txt"]), &[], Some(&prev));

        let rows = file_rows(&next, next.files(), Some(&prev), |_| 7, &["b.txt".to_string()]);

        let statuses: Vec<(&str, FileStatus)> =
            rows.iter().map(|r| (r.path.as_str(), r.status)).collect();
        assert_eq!(
            statuses,
            vec![
                ("a.txt", FileStatus::Modified),
                ("c.txt", FileStatus::Added),
                ("b.txt", FileStatus::Removed),
            ]
        );
    }

    #[test]
    fn test_write_snapshot_and_finalize() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());
        layout.ensure().unwrap();
        fs::create_dir_all(layout.index_dir().join("src")).unwrap();
        fs::write(layout.index_copy("src/a.rs"), "fn a() {}").unwrap();

        let files = staged(&["src/a.rs"]);
        let commit = build("snap0001".into(), "m", None, "me", &files, &[], None);
        write_snapshot(&layout, &commit, &files, None).unwrap();

        assert_eq!(
            fs::read_to_string(layout.snapshot_copy("snap0001", "src/a.rs")).unwrap(),
            "fn a() {}"
        );
        assert!(layout.metadata_path("snap0001").exists());
        assert_eq!(layout.read_intent().unwrap(), Some("snap0001".to_string()));

        finalize(&layout, &commit).unwrap();
        assert_eq!(layout.read_head().unwrap(), Some("snap0001".to_string()));
        assert_eq!(layout.read_journal_ids().unwrap(), vec!["snap0001".to_string()]);
    }

    #[test]
    fn test_carried_file_copied_from_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());
        layout.ensure().unwrap();
        fs::write(layout.index_copy("a.txt"), "first").unwrap();
        let first_staged = staged(&["a.txt"]);
        let first = build("snap0001".into(), "m", None, "me", &first_staged, &[], None);
        write_snapshot(&layout, &first, &first_staged, None).unwrap();

        fs::remove_file(layout.index_copy("a.txt")).unwrap();
        fs::write(dir.path().join("a.txt"), "edited but not staged").unwrap();
        fs::write(layout.index_copy("b.txt"), "second").unwrap();
        let second_staged = staged(&["b.txt"]);
        let carried = carried_paths(&layout, &second_staged, Some(&first));
        let second = build("snap0002".into(), "m", None, "me", &second_staged, &carried, Some(&first));
        write_snapshot(&layout, &second, &second_staged, Some(&first)).unwrap();

        assert_eq!(carried, vec!["a.txt".to_string()]);
        assert_eq!(second.files(), &["b.txt".to_string(), "a.txt".to_string()]);
        assert_eq!(
            fs::read_to_string(layout.snapshot_copy("snap0002", "a.txt")).unwrap(),
            "first"
        );
    }

    #[test]
    fn test_failed_snapshot_cleans_up() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());
        layout.ensure().unwrap();

        let files = staged(&["missing.txt"]);
        let commit = build("fail0001".into(), "m", None, "me", &files, &[], None);
        let err = write_snapshot(&layout, &commit, &files, None).unwrap_err();

        assert!(matches!(err, Error::PathIo { .. }));
        assert!(!layout.commit_dir("fail0001").exists());
        assert_eq!(layout.read_intent().unwrap(), None);
    }

    #[test]
    fn test_carried_and_removed_paths() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());
        fs::write(dir.path().join("still.txt"), "x").unwrap();

        let prev = build("prev0001".into(), "m", None, "me", &staged(&["still.txt", "gone.txt"]), &[], None);
        let next_staged = staged(&["new.txt"]);
        let carried = carried_paths(&layout, &next_staged, Some(&prev));
        let next = build("next0001".into(), "m", None, "me", &next_staged, &carried, Some(&prev));

        assert_eq!(carried, vec!["still.txt".to_string()]);
        assert_eq!(removed_paths(&next, Some(&prev)), vec!["gone.txt".to_string()]);
        assert!(removed_paths(&next, None).is_empty());
        assert!(carried_paths(&layout, &next_staged, None).is_empty());
    }
}
