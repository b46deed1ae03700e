//! Repository state: known commits, the staged set, HEAD, and the two stores.

use crate::commit;
use crate::config::Config;
use crate::diff::{diff_commits, unified_patches, CommitDiff};
use crate::error::{Error, Result};
use crate::fs_store::Layout;
use crate::models::{
    ActivityEntry, Commit, CommitFile, RepositoryInfo, StageAllReport, StageOutcome, StagedFile,
    StatusReport, StoreMode,
};
use crate::progress::Progress;
use crate::reconcile::{DualStore, StoreWrite};
use crate::staging::StagingArea;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Shortest prefix accepted when looking commits up by abbreviated id.
const MIN_PREFIX_LEN: usize = 4;

pub struct Repository {
    info: RepositoryInfo,
    config: Config,
    layout: Layout,
    staging: StagingArea,
    history: Vec<Commit>,
    head: Option<String>,
    store: DualStore,
}

impl Repository {
    /// Creates the repository layout at `path` (creating the directory if
    /// needed) and registers it in the relational store. Re-running init on
    /// an existing repository opens it and refreshes the registration.
    pub fn init(path: &Path, config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(path).map_err(|e| Error::path_io(path, e))?;
        let root = fs::canonicalize(path).map_err(|e| Error::path_io(path, e))?;

        let layout = Layout::new(&root);
        let reinit = layout.is_initialized();
        layout.ensure()?;
        if !Config::config_path(&root).exists() {
            config.save(&root)?;
        }

        let mut repo = Self::load(root, layout, config, true)?;
        let verb = if reinit { "Reinitialized" } else { "Initialized" };
        info!("{} repository at {:?}", verb, repo.info.path);
        repo.store.log_activity(
            "init",
            &format!("{} repository {}", verb.to_lowercase(), repo.info.name),
        );
        repo.recover()?;
        Ok(repo)
    }

    /// Opens an initialized repository and runs crash recovery.
    pub fn open(path: &Path, config: Config) -> Result<Self> {
        config.validate()?;
        let root = fs::canonicalize(path)
            .map_err(|_| Error::RepositoryNotFound(path.display().to_string()))?;
        let layout = Layout::new(&root);
        if !layout.is_initialized() {
            return Err(Error::RepositoryNotFound(path.display().to_string()));
        }

        let mut repo = Self::load(root, layout, config, false)?;
        repo.recover()?;
        Ok(repo)
    }

    fn load(root: PathBuf, layout: Layout, config: Config, register: bool) -> Result<Self> {
        let info = RepositoryInfo::new(root).with_description(config.description.clone());
        let store = DualStore::connect(&config, &info, register);
        let info = store.repository().unwrap_or(info);

        let staging = StagingArea::load(&layout)?;
        let history = load_history(&layout)?;
        let head = layout.read_head()?;

        Ok(Self {
            info,
            config,
            layout,
            staging,
            history,
            head,
            store,
        })
    }

    /// Resolves an interrupted commit, repairs HEAD and backfills the store.
    fn recover(&mut self) -> Result<()> {
        self.resolve_intent()?;

        let head_known = self
            .head
            .as_deref()
            .map(|h| self.history.iter().any(|c| c.id() == h))
            .unwrap_or(false);
        if !head_known {
            if let Some(last) = self.history.last() {
                warn!("HEAD {:?} is stale, resetting to {}", self.head, last.id());
                self.layout.write_head(last.id())?;
                self.head = Some(last.id().to_string());
            }
        }

        self.store.backfill(&self.layout, &self.history);
        Ok(())
    }

    /// Settles a leftover commit intent. A journaled commit gets its staging
    /// cleanup finished; anything else is an orphaned snapshot and is removed
    /// from both stores. The intent is only cleared once that succeeded.
    fn resolve_intent(&mut self) -> Result<()> {
        let Some(id) = self.layout.read_intent()? else {
            return Ok(());
        };

        if let Some(done) = self.history.iter().find(|c| c.id() == id) {
            let dropped = self.staging.drop_committed(&self.layout, done)?;
            info!(
                "Commit {} was journaled before interruption, released {} staged file(s)",
                id, dropped
            );
        } else {
            warn!("Discarding interrupted commit {}", id);
            self.layout.remove_commit_dir(&id)?;
            self.store.discard_commit(&id);
            self.store.record_staged(self.staging.entries());
        }
        self.layout.clear_intent()
    }

    pub fn info(&self) -> &RepositoryInfo {
        &self.info
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn head(&self) -> Option<&str> {
        self.head.as_deref()
    }

    /// Commits in creation order.
    pub fn commits(&self) -> &[Commit] {
        &self.history
    }

    pub fn staged(&self) -> &[StagedFile] {
        self.staging.entries()
    }

    pub fn store_mode(&self) -> StoreMode {
        self.store.mode()
    }

    pub fn add(&mut self, path: &Path) -> Result<StageOutcome> {
        let mut outcome = self.staging.stage(&self.layout, path)?;
        outcome.entry.repo_id = self.store.repo_id();

        if outcome.newly_staged {
            self.store.record_staged(std::slice::from_ref(&outcome.entry));
            self.store
                .log_activity("add", &format!("staged {}", outcome.entry.path));
        }
        Ok(outcome)
    }

    /// Stages every new file under `root_dir`; `exclude_patterns` falls back
    /// to the configured defaults.
    pub fn add_all(
        &mut self,
        root_dir: &Path,
        exclude_patterns: Option<&[String]>,
        progress: &dyn Progress,
    ) -> Result<StageAllReport> {
        let patterns = exclude_patterns.unwrap_or(self.config.exclude_patterns.as_slice());
        let report = self
            .staging
            .stage_all(&self.layout, root_dir, patterns, progress)?;

        if !report.added.is_empty() {
            let added: Vec<StagedFile> = self
                .staging
                .entries()
                .iter()
                .filter(|e| report.added.contains(&e.path))
                .cloned()
                .collect();
            self.store.record_staged(&added);
        }
        self.store.log_activity(
            "add-all",
            &format!(
                "processed {}, added {}, skipped {}{}",
                report.processed,
                report.added_count(),
                report.skipped_count(),
                if report.cancelled { " (cancelled)" } else { "" }
            ),
        );
        Ok(report)
    }

    /// Freezes the staged set into a new commit.
    ///
    /// Filesystem snapshot first, then the relational transaction, then the
    /// journal entry and HEAD. A relational failure leaves HEAD and the
    /// staged set untouched and is reported as [`Error::PartiallyPersisted`].
    pub fn commit(&mut self, message: &str, summary: Option<String>) -> Result<Commit> {
        commit::validate_message(message)?;
        self.resolve_intent()?;
        if self.staging.is_empty() {
            return Err(Error::EmptyCommit);
        }

        let id = commit::new_commit_id(|candidate| {
            self.history.iter().any(|c| c.id() == candidate)
                || self.layout.commit_dir(candidate).exists()
        });
        let previous = self.history.last();
        let staged = self.staging.entries();
        let carried = commit::carried_paths(&self.layout, staged, previous);
        let new_commit = commit::build(
            id,
            message,
            summary,
            &self.config.author,
            staged,
            &carried,
            previous,
        );

        commit::write_snapshot(&self.layout, &new_commit, staged, previous)?;

        let changed: Vec<String> = staged.iter().map(|e| e.path.clone()).collect();
        let size_of = |path: &str| {
            staged
                .iter()
                .find(|e| e.path == path)
                .map(|e| e.size)
                .unwrap_or(0)
        };
        let removed = commit::removed_paths(&new_commit, previous);
        let rows = commit::file_rows(&new_commit, &changed, previous, size_of, &removed);

        let written = self
            .store
            .record_commit(&new_commit, &rows)
            .map_err(|e| Error::PartiallyPersisted {
                commit_id: new_commit.id().to_string(),
                source: Box::new(e),
            })?;

        commit::finalize(&self.layout, &new_commit)?;

        self.history.push(new_commit.clone());
        self.head = Some(new_commit.id().to_string());
        match self.staging.clear(&self.layout) {
            Ok(()) => self.layout.clear_intent()?,
            Err(e) => warn!(
                "Commit {} stored but staging cleanup failed, finishing it later: {}",
                new_commit.id(),
                e
            ),
        }

        info!(
            "Created commit {} ({} files{})",
            new_commit.id(),
            new_commit.file_count(),
            if written == StoreWrite::Degraded {
                ", filesystem-only"
            } else {
                ""
            }
        );
        Ok(new_commit)
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            repository: self.info.clone(),
            head: self.head.clone(),
            staged: self.staging.entries().to_vec(),
            modified_since_staged: self.staging.modified_since_staged(&self.layout),
            commit_count: self.history.len(),
            store_mode: self.store.mode(),
        }
    }

    /// Commits, newest first.
    pub fn log(&self) -> Vec<Commit> {
        self.history.iter().rev().cloned().collect()
    }

    /// Looks a commit up by full id or by an unambiguous prefix.
    pub fn find_commit(&self, id: &str) -> Result<&Commit> {
        if let Some(found) = self.history.iter().find(|c| c.id() == id) {
            return Ok(found);
        }

        if id.len() >= MIN_PREFIX_LEN {
            let mut matches = self.history.iter().filter(|c| c.id().starts_with(id));
            if let (Some(only), None) = (matches.next(), matches.next()) {
                return Ok(only);
            }
        }

        Err(Error::CommitNotFound(id.to_string()))
    }

    pub fn diff(&self, from: &str, to: &str, detailed: bool) -> Result<CommitDiff> {
        let a = self.find_commit(from)?;
        let b = self.find_commit(to)?;
        diff_commits(a, b, detailed, &self.layout)
    }

    pub fn unified_diff(&self, from: &str, to: &str) -> Result<String> {
        let a = self.find_commit(from)?;
        let b = self.find_commit(to)?;
        unified_patches(a, b, &self.layout, self.config.diff.context_lines)
    }

    /// Recent audit entries; requires the relational store.
    pub fn activity(&self, limit: usize) -> Result<Vec<ActivityEntry>> {
        self.store.activity(limit)
    }

    /// Queryable per-file history of a commit; requires the relational store.
    pub fn commit_files(&self, id: &str) -> Result<Vec<CommitFile>> {
        let commit = self.find_commit(id)?;
        self.store.commit_files(commit.id())
    }
}

fn load_history(layout: &Layout) -> Result<Vec<Commit>> {
    let mut history = Vec::new();
    for id in layout.read_journal_ids()? {
        match layout.read_metadata(&id) {
            Ok(commit) => history.push(commit),
            Err(e) => warn!("Journal lists commit {} but its metadata is unusable: {}", id, e),
        }
    }
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StagedStatus;
    use crate::progress::Silent;
    use tempfile::TempDir;

    fn config() -> Config {
        Config::default().with_author("tester")
    }

    fn repo_with(files: &[(&str, &str)]) -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("project");
        let repo = Repository::init(&root, config()).unwrap();
        for (name, body) in files {
            let path = repo.root().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, body).unwrap();
        }
        (dir, repo)
    }

    #[test]
    fn test_init_creates_layout_and_registers() {
        let (_dir, repo) = repo_with(&[]);

        assert!(repo.layout().is_initialized());
        assert!(Config::config_path(repo.root()).exists());
        assert_eq!(repo.store_mode(), StoreMode::Dual);
        assert!(repo.info().id.is_some());
        assert_eq!(repo.info().name, "project");
        assert_eq!(repo.activity(5).unwrap()[0].operation, "init");
    }

    #[test]
    fn test_reinit_keeps_identity() {
        let (_dir, repo) = repo_with(&[]);
        let id = repo.info().id;
        let root = repo.root().to_path_buf();
        drop(repo);

        let again = Repository::init(&root, config()).unwrap();
        assert_eq!(again.info().id, id);
    }

    #[test]
    fn test_open_uninitialized_fails() {
        let dir = TempDir::new().unwrap();
        let err = Repository::open(dir.path(), config()).err().unwrap();
        assert!(matches!(err, Error::RepositoryNotFound(_)));
    }

    #[test]
    fn test_commit_pipeline() {
        let (_dir, mut repo) = repo_with(&[("notes.txt", "hello\n")]);
        repo.add(Path::new("notes.txt")).unwrap();

        let commit = repo.commit("first", None).unwrap();

        assert_eq!(commit.files(), &["notes.txt".to_string()]);
        assert_eq!(repo.head(), Some(commit.id()));
        assert!(repo.staged().is_empty());
        assert!(repo.layout().snapshot_copy(commit.id(), "notes.txt").exists());

        let storage = repo.store.storage().unwrap();
        assert!(storage.commit_exists(commit.id()).unwrap());
        assert!(storage
            .get_staged_files(repo.info().id.unwrap())
            .unwrap()
            .is_empty());
        assert_eq!(repo.layout().read_intent().unwrap(), None);
    }

    #[test]
    fn test_add_records_staged_row() {
        let (_dir, mut repo) = repo_with(&[("a.txt", "a")]);
        let outcome = repo.add(Path::new("a.txt")).unwrap();

        assert_eq!(outcome.entry.repo_id, repo.info().id);
        let rows = repo
            .store
            .storage()
            .unwrap()
            .get_staged_files(repo.info().id.unwrap())
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, StagedStatus::Staged);
    }

    #[test]
    fn test_commit_file_rows_track_status() {
        let (_dir, mut repo) = repo_with(&[("a.txt", "a"), ("b.txt", "b")]);
        repo.add(Path::new("a.txt")).unwrap();
        repo.add(Path::new("b.txt")).unwrap();
        repo.commit("first", None).unwrap();

        fs::remove_file(repo.root().join("b.txt")).unwrap();
        fs::write(repo.root().join("a.txt"), "a2").unwrap();
        repo.add(Path::new("a.txt")).unwrap();
        let second = repo.commit("second", None).unwrap();

        let rows = repo.commit_files(second.id()).unwrap();
        let statuses: Vec<(String, &str)> = rows
            .iter()
            .map(|r| (r.path.clone(), r.status.as_str()))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("a.txt".to_string(), "modified"),
                ("b.txt".to_string(), "removed"),
            ]
        );
        assert_eq!(second.summary(), "Removed 1 files (total: 1) [docs: 1]");
    }

    #[test]
    fn test_transaction_failure_is_partial_persist() {
        let (_dir, mut repo) = repo_with(&[("a.txt", "a")]);
        repo.add(Path::new("a.txt")).unwrap();
        repo.store
            .storage()
            .unwrap()
            .connection()
            .execute_batch("DROP TABLE commit_files;")
            .unwrap();

        let err = repo.commit("doomed", None).unwrap_err();

        let commit_id = match &err {
            Error::PartiallyPersisted { commit_id, .. } => commit_id.clone(),
            other => panic!("unexpected error: {other}"),
        };
        assert!(err.to_string().contains("filesystem snapshot exists"));
        assert!(repo.layout().metadata_path(&commit_id).exists());
        assert_eq!(repo.head(), None);
        assert_eq!(repo.staged().len(), 1);
        assert!(repo.commits().is_empty());
        assert_eq!(repo.layout().read_intent().unwrap(), Some(commit_id.clone()));

        // Recovery on the next open discards the orphaned snapshot.
        let root = repo.root().to_path_buf();
        drop(repo);
        let reopened = Repository::open(&root, config()).unwrap();
        assert!(!reopened.layout().commit_dir(&commit_id).exists());
        assert_eq!(reopened.layout().read_intent().unwrap(), None);
        assert_eq!(reopened.staged().len(), 1);
    }

    #[test]
    fn test_retry_after_partial_persist_removes_orphan() {
        let (_dir, mut repo) = repo_with(&[("a.txt", "a")]);
        repo.add(Path::new("a.txt")).unwrap();
        let conn = repo.store.storage().unwrap().connection();
        conn.execute_batch(
            "CREATE TRIGGER reject_commit BEFORE INSERT ON commits
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();

        let orphan = match repo.commit("doomed", None).unwrap_err() {
            Error::PartiallyPersisted { commit_id, .. } => commit_id,
            other => panic!("unexpected error: {other}"),
        };
        repo.store
            .storage()
            .unwrap()
            .connection()
            .execute_batch("DROP TRIGGER reject_commit;")
            .unwrap();

        let retried = repo.commit("retry", None).unwrap();

        assert!(!repo.layout().commit_dir(&orphan).exists());
        assert_eq!(repo.layout().read_intent().unwrap(), None);
        assert_eq!(repo.commits(), &[retried.clone()]);
        assert_eq!(retried.files(), &["a.txt".to_string()]);
        let storage = repo.store.storage().unwrap();
        assert!(!storage.commit_exists(&orphan).unwrap());
        assert!(storage.commit_exists(retried.id()).unwrap());
    }

    #[test]
    fn test_interrupted_cleanup_finished_on_open() {
        let (_dir, mut repo) = repo_with(&[("a.txt", "a")]);
        repo.add(Path::new("a.txt")).unwrap();
        let commit = repo.commit("first", None).unwrap();

        // What a crash between the journal append and the staging cleanup leaves.
        let layout = repo.layout().clone();
        layout.write_intent(&commit).unwrap();
        layout.write_staged_list(&["a.txt".to_string()]).unwrap();
        fs::copy(repo.root().join("a.txt"), layout.index_copy("a.txt")).unwrap();
        let root = repo.root().to_path_buf();
        drop(repo);

        let reopened = Repository::open(&root, config()).unwrap();

        assert_eq!(reopened.head(), Some(commit.id()));
        assert_eq!(reopened.commits().len(), 1);
        assert!(reopened.staged().is_empty());
        assert!(layout.read_staged_list().unwrap().is_empty());
        assert!(!layout.index_copy("a.txt").exists());
        assert_eq!(layout.read_intent().unwrap(), None);
    }

    #[test]
    fn test_unstaged_files_carry_into_next_commit() {
        let (_dir, mut repo) = repo_with(&[("notes.txt", "hello\n"), ("todo.txt", "milk\n")]);
        repo.add(Path::new("notes.txt")).unwrap();
        let first = repo.commit("first", None).unwrap();
        fs::write(repo.root().join("notes.txt"), "edited, not staged\n").unwrap();
        repo.add(Path::new("todo.txt")).unwrap();

        let second = repo.commit("second", None).unwrap();

        assert_eq!(second.files(), &["todo.txt".to_string(), "notes.txt".to_string()]);
        assert_eq!(
            fs::read_to_string(repo.layout().snapshot_copy(second.id(), "notes.txt")).unwrap(),
            "hello\n"
        );
        assert_eq!(second.summary(), "Added 1 files (total: 2) [docs: 2]");
        let rows = repo.commit_files(second.id()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].path, "todo.txt");
        assert!(repo.diff(first.id(), second.id(), true).unwrap().files.is_empty());
    }

    #[test]
    fn test_filesystem_only_commit() {
        let dir = TempDir::new().unwrap();
        let mut repo =
            Repository::init(&dir.path().join("solo"), config().without_database()).unwrap();
        fs::write(repo.root().join("a.txt"), "a").unwrap();
        repo.add(Path::new("a.txt")).unwrap();

        let commit = repo.commit("offline", None).unwrap();

        assert_eq!(repo.store_mode(), StoreMode::FilesystemOnly);
        assert_eq!(repo.head(), Some(commit.id()));
        assert!(matches!(repo.activity(5), Err(Error::StoreUnavailable(_))));
    }

    #[test]
    fn test_backfill_after_outage() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("proj");
        let mut repo = Repository::init(&root, config()).unwrap();
        let root = repo.root().to_path_buf();
        drop(repo);

        // Commit while the store is switched off.
        repo = Repository::open(&root, config().without_database()).unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        repo.add(Path::new("a.txt")).unwrap();
        let offline = repo.commit("offline", None).unwrap();
        drop(repo);

        let back = Repository::open(&root, config()).unwrap();
        assert_eq!(back.store_mode(), StoreMode::Dual);
        assert!(back
            .store
            .storage()
            .unwrap()
            .commit_exists(offline.id())
            .unwrap());
    }

    #[test]
    fn test_reopen_restores_state() {
        let (_dir, mut repo) = repo_with(&[("a.txt", "a"), ("b.txt", "b")]);
        repo.add(Path::new("a.txt")).unwrap();
        let first = repo.commit("first", None).unwrap();
        repo.add(Path::new("b.txt")).unwrap();
        let root = repo.root().to_path_buf();
        drop(repo);

        let reopened = Repository::open(&root, config()).unwrap();
        assert_eq!(reopened.head(), Some(first.id()));
        assert_eq!(reopened.commits(), &[first.clone()]);
        assert_eq!(reopened.staged().len(), 1);
        assert_eq!(reopened.commits()[0].message(), "first");
    }

    #[test]
    fn test_stale_head_repaired() {
        let (_dir, mut repo) = repo_with(&[("a.txt", "a")]);
        repo.add(Path::new("a.txt")).unwrap();
        let first = repo.commit("first", None).unwrap();
        repo.layout().write_head("deadbeef").unwrap();
        let root = repo.root().to_path_buf();
        drop(repo);

        let reopened = Repository::open(&root, config()).unwrap();
        assert_eq!(reopened.head(), Some(first.id()));
    }

    #[test]
    fn test_find_commit_by_prefix() {
        let (_dir, mut repo) = repo_with(&[("a.txt", "a")]);
        repo.add(Path::new("a.txt")).unwrap();
        let commit = repo.commit("first", None).unwrap();

        assert_eq!(repo.find_commit(&commit.id()[..5]).unwrap(), &commit);
        assert!(matches!(
            repo.find_commit(&commit.id()[..2]),
            Err(Error::CommitNotFound(_))
        ));
    }

    #[test]
    fn test_add_all_uses_configured_excludes() {
        let (_dir, mut repo) = repo_with(&[("a.txt", "a"), ("node_modules/x.js", "x")]);
        let root = repo.root().to_path_buf();

        let report = repo.add_all(&root, None, &Silent).unwrap();

        assert_eq!(report.added, vec!["a.txt".to_string()]);
        // config.toml lives under data/ and is never staged
        assert!(!repo.staged().iter().any(|s| s.path.contains("config")));
    }

    #[test]
    fn test_unified_diff() {
        let (_dir, mut repo) = repo_with(&[("a.txt", "one\ntwo\n")]);
        repo.add(Path::new("a.txt")).unwrap();
        let first = repo.commit("first", None).unwrap();
        fs::write(repo.root().join("a.txt"), "one\nthree\n").unwrap();
        repo.add(Path::new("a.txt")).unwrap();
        let second = repo.commit("second", None).unwrap();

        let patch = repo.unified_diff(first.id(), second.id()).unwrap();
        assert!(patch.contains("-two\n+three\n"));
    }
}
