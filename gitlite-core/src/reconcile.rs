//! Dual-store reconciliation.
//!
//! The filesystem is authoritative. The relational store is a best-effort
//! index: when it cannot be opened, or the repository has no registered
//! identity in it, every write degrades to filesystem-only with a warning.

use crate::commit::{file_rows, removed_paths};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fs_store::{file_digest, Layout};
use crate::models::{ActivityEntry, Commit, CommitFile, RepositoryInfo, StagedFile, StoreMode};
use crate::storage::Storage;
use tracing::{info, warn};

/// What happened to a relational write that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreWrite {
    Recorded,
    Degraded,
}

pub struct DualStore {
    storage: Option<Storage>,
    repo_id: Option<i64>,
}

impl DualStore {
    pub fn disconnected() -> Self {
        Self {
            storage: None,
            repo_id: None,
        }
    }

    /// Opens the configured store. With `register`, the repository is
    /// registered by path; otherwise an existing registration is looked up.
    pub fn connect(config: &Config, info: &RepositoryInfo, register: bool) -> Self {
        if !config.database.enabled {
            info!("Relational store disabled; running filesystem-only");
            return Self::disconnected();
        }

        let db_path = config.database_path(&info.path);
        let storage = match Storage::new(&db_path) {
            Ok(storage) => storage,
            Err(e) => {
                warn!(
                    "Relational store at {:?} unavailable, degrading to filesystem-only: {}",
                    db_path, e
                );
                return Self::disconnected();
            }
        };

        let repo_id = if register {
            storage.register_repository(info).map(Some)
        } else {
            storage.find_repository_id(&info.path)
        };

        let repo_id = match repo_id {
            Ok(Some(id)) => Some(id),
            Ok(None) => {
                warn!(
                    "Repository {:?} is not registered in the relational store; run init to register it",
                    info.path
                );
                None
            }
            Err(e) => {
                warn!("Could not resolve repository identity: {}", e);
                None
            }
        };

        Self {
            storage: Some(storage),
            repo_id,
        }
    }

    pub fn mode(&self) -> StoreMode {
        match self.resolve() {
            Ok(_) => StoreMode::Dual,
            Err(_) => StoreMode::FilesystemOnly,
        }
    }

    pub fn repo_id(&self) -> Option<i64> {
        self.repo_id
    }

    pub fn storage(&self) -> Option<&Storage> {
        self.storage.as_ref()
    }

    fn resolve(&self) -> Result<(&Storage, i64)> {
        match (&self.storage, self.repo_id) {
            (Some(storage), Some(id)) => Ok((storage, id)),
            (None, _) => Err(Error::StoreUnavailable("store not connected".to_string())),
            (Some(_), None) => Err(Error::StoreUnavailable(
                "repository not registered".to_string(),
            )),
        }
    }

    pub fn repository(&self) -> Option<RepositoryInfo> {
        let (storage, id) = self.resolve().ok()?;
        storage.get_repository(id).ok()
    }

    /// Mirrors staged entries into `staged_files`; failures only warn.
    pub fn record_staged(&self, entries: &[StagedFile]) -> StoreWrite {
        let Ok((storage, repo_id)) = self.resolve() else {
            return StoreWrite::Degraded;
        };

        for entry in entries {
            if let Err(e) = storage.upsert_staged_file(repo_id, entry) {
                warn!("Could not record staged file {} in the store: {}", entry.path, e);
                return StoreWrite::Degraded;
            }
        }
        StoreWrite::Recorded
    }

    /// Appends an audit row; failures only warn.
    pub fn log_activity(&self, operation: &str, details: &str) -> StoreWrite {
        let Ok((storage, repo_id)) = self.resolve() else {
            return StoreWrite::Degraded;
        };

        match storage.log_activity(repo_id, operation, details) {
            Ok(()) => StoreWrite::Recorded,
            Err(e) => {
                warn!("Could not record {} activity: {}", operation, e);
                StoreWrite::Degraded
            }
        }
    }

    /// Records a commit transactionally. An unresolved identity degrades;
    /// a failed transaction is returned to the caller.
    pub fn record_commit(&self, commit: &Commit, files: &[CommitFile]) -> Result<StoreWrite> {
        let (storage, repo_id) = match self.resolve() {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("Commit {} recorded filesystem-only: {}", commit.id(), e);
                return Ok(StoreWrite::Degraded);
            }
        };

        let details = format!(
            "commit {}: {} ({} files)",
            commit.id(),
            commit.message(),
            commit.file_count()
        );
        storage.record_commit(repo_id, commit, files, &details)?;
        Ok(StoreWrite::Recorded)
    }

    /// Drops relational rows of a commit that never reached the journal.
    pub fn discard_commit(&self, commit_id: &str) {
        let Ok((storage, _)) = self.resolve() else {
            return;
        };

        match storage.discard_commit(commit_id) {
            Ok(true) => info!("Removed relational rows of interrupted commit {}", commit_id),
            Ok(false) => {}
            Err(e) => warn!("Could not remove rows of commit {}: {}", commit_id, e),
        }
    }

    /// Inserts journaled commits the store is missing. Returns how many were added.
    pub fn backfill(&self, layout: &Layout, history: &[Commit]) -> usize {
        let Ok((storage, repo_id)) = self.resolve() else {
            return 0;
        };

        let mut inserted = 0;
        let mut previous: Option<&Commit> = None;
        for commit in history {
            match storage.commit_exists(commit.id()) {
                Ok(true) => {}
                Ok(false) => {
                    let size_of = |path: &str| {
                        std::fs::metadata(layout.snapshot_copy(commit.id(), path))
                            .map(|m| m.len())
                            .unwrap_or(0)
                    };
                    let changed = changed_since(layout, commit, previous);
                    let removed = removed_paths(commit, previous);
                    let rows = file_rows(commit, &changed, previous, size_of, &removed);
                    match storage.backfill_commit(repo_id, commit, &rows) {
                        Ok(()) => inserted += 1,
                        Err(e) => {
                            warn!("Backfill of commit {} failed: {}", commit.id(), e);
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!("Backfill aborted: {}", e);
                    break;
                }
            }
            previous = Some(commit);
        }

        if inserted > 0 {
            info!("Backfilled {} commit(s) into the relational store", inserted);
        }
        inserted
    }

    pub fn activity(&self, limit: usize) -> Result<Vec<ActivityEntry>> {
        let (storage, repo_id) = self.resolve()?;
        storage.get_activity(repo_id, limit)
    }

    pub fn commit_files(&self, commit_id: &str) -> Result<Vec<CommitFile>> {
        let (storage, _) = self.resolve()?;
        storage.get_commit_files(commit_id)
    }
}

/// Files of `commit` whose snapshot bytes differ from `previous`, or that
/// `previous` did not have.
fn changed_since(layout: &Layout, commit: &Commit, previous: Option<&Commit>) -> Vec<String> {
    commit
        .files()
        .iter()
        .filter(|path| match previous {
            Some(prev) if prev.contains(path) => {
                let before = file_digest(&layout.snapshot_copy(prev.id(), path));
                let after = file_digest(&layout.snapshot_copy(commit.id(), path));
                !matches!((before, after), (Ok(a), Ok(b)) if a == b)
            }
            _ => true,
        })
        .cloned()
        .collect()
}
