//! Staging area: the set of working files queued for the next commit.
//!
//! Staged bytes are mirrored under `data/index/` and the staged paths are
//! listed one per line in `data/index/staged_files.txt`.

use crate::error::{Error, Result};
use crate::fs_store::{copy_file, file_digest, Layout, DATA_DIR};
use crate::models::{now, Commit, StageAllReport, StageOutcome, StagedFile};
use crate::progress::{percent, Progress};
use chrono::{DateTime, Utc};
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct StagingArea {
    entries: Vec<StagedFile>,
}

impl StagingArea {
    /// Restores the staged set from the index, dropping entries whose copy vanished.
    pub fn load(layout: &Layout) -> Result<Self> {
        let mut entries = Vec::new();

        for path in layout.read_staged_list()? {
            let copy = layout.index_copy(&path);
            match fs::metadata(&copy) {
                Ok(meta) => {
                    entries.push(StagedFile::new(path, meta.len(), modified_time(&meta)));
                }
                Err(e) => {
                    warn!("Dropping staged entry {} (index copy unreadable: {})", path, e);
                }
            }
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[StagedFile] {
        &self.entries
    }

    /// Staged paths in insertion order.
    pub fn list(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, staged_path: &str) -> bool {
        self.entries.iter().any(|e| e.path == staged_path)
    }

    /// Stages one file. Staging an already staged path succeeds without copying.
    pub fn stage(&mut self, layout: &Layout, path: &Path) -> Result<StageOutcome> {
        let candidate = absolute(layout, path);
        if !candidate.exists() {
            return Err(Error::FileNotFound(path.display().to_string()));
        }

        let canonical = fs::canonicalize(&candidate).map_err(|e| Error::path_io(&candidate, e))?;
        let meta = fs::metadata(&canonical).map_err(|e| Error::path_io(&canonical, e))?;
        if !meta.is_file() {
            return Err(Error::InvalidPath(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        fs::File::open(&canonical).map_err(|e| Error::path_io(&canonical, e))?;

        let key = staged_key(layout, &canonical)?;
        if let Some(existing) = self.entries.iter().find(|e| e.path == key) {
            debug!("{} already staged", key);
            return Ok(StageOutcome {
                entry: existing.clone(),
                newly_staged: false,
            });
        }

        let entry = copy_into_index(layout, &canonical, key)?;
        let mut paths = self.list();
        paths.push(entry.path.clone());
        layout.write_staged_list(&paths)?;
        self.entries.push(entry.clone());
        info!("Staged {}", entry.path);

        Ok(StageOutcome {
            entry,
            newly_staged: true,
        })
    }

    /// Recursively stages every regular file under `root_dir` that is not yet
    /// staged. Per-file failures are recorded as skipped; cancellation stops
    /// the walk between files and keeps what was already copied.
    pub fn stage_all(
        &mut self,
        layout: &Layout,
        root_dir: &Path,
        exclude_patterns: &[String],
        progress: &dyn Progress,
    ) -> Result<StageAllReport> {
        let start = absolute(layout, root_dir);
        if !start.exists() {
            return Err(Error::FileNotFound(root_dir.display().to_string()));
        }
        let start = fs::canonicalize(&start).map_err(|e| Error::path_io(&start, e))?;
        if !start.is_dir() {
            return Err(Error::InvalidPath(format!(
                "{} is not a directory",
                root_dir.display()
            )));
        }
        check_boundary(layout, &start)?;

        progress.report("Scanning files", 0);
        let files = enumerate_files(layout, &start, exclude_patterns)?;

        let already: HashSet<String> = self.entries.iter().map(|e| e.path.to_lowercase()).collect();
        let mut report = StageAllReport::default();
        let mut pending = Vec::new();
        for file in files {
            match staged_key(layout, &file) {
                Ok(key) if already.contains(&key.to_lowercase()) => report.already_staged += 1,
                Ok(key) => pending.push((file, key)),
                Err(e) => {
                    warn!("Skipping {:?}: {}", file, e);
                    report.skipped.push(file.display().to_string());
                }
            }
        }

        let total = pending.len();
        info!(
            "Staging {} new file(s) from {:?} ({} already staged)",
            total, start, report.already_staged
        );

        let before = self.entries.len();
        for (i, (file, key)) in pending.into_iter().enumerate() {
            if progress.is_cancelled() {
                info!("Add-all cancelled after {} file(s)", report.processed);
                report.cancelled = true;
                break;
            }

            report.processed += 1;
            match copy_into_index(layout, &file, key.clone()) {
                Ok(entry) => {
                    self.entries.push(entry);
                    report.added.push(key.clone());
                }
                Err(e) => {
                    warn!("Skipping {}: {}", key, e);
                    report.skipped.push(key.clone());
                }
            }
            progress.report(&format!("Staged {}", key), percent(i + 1, total));
        }

        if let Err(e) = layout.write_staged_list(&self.list()) {
            self.entries.truncate(before);
            return Err(e);
        }
        if !report.cancelled {
            progress.report("Done", 100);
        }

        Ok(report)
    }

    /// Empties the staged set and its index copies. The list goes first, so
    /// leftover copies are never read back as staged.
    pub fn clear(&mut self, layout: &Layout) -> Result<()> {
        layout.write_staged_list(&[])?;
        self.entries.clear();
        layout.clear_index_copies()
    }

    /// Staged paths whose working copy differs from the staged bytes or is gone.
    pub fn modified_since_staged(&self, layout: &Layout) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| {
                let working = layout.working_path(&entry.path);
                let staged = layout.index_copy(&entry.path);
                match (file_digest(&working), file_digest(&staged)) {
                    (Ok(a), Ok(b)) => a != b,
                    _ => true,
                }
            })
            .map(|entry| entry.path.clone())
            .collect()
    }

    /// Drops entries whose staged bytes already made it into `commit`, along
    /// with their index copies. Finishes a commit that was interrupted after
    /// its journal entry was written.
    pub fn drop_committed(&mut self, layout: &Layout, commit: &Commit) -> Result<usize> {
        let keep: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !in_snapshot(layout, commit, &e.path))
            .map(|e| e.path.clone())
            .collect();
        if keep.len() == self.entries.len() {
            return Ok(0);
        }

        layout.write_staged_list(&keep)?;
        let (kept, done): (Vec<StagedFile>, Vec<StagedFile>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| keep.contains(&e.path));
        self.entries = kept;

        for entry in &done {
            let copy = layout.index_copy(&entry.path);
            if let Err(e) = fs::remove_file(&copy) {
                warn!("Could not remove index copy {:?}: {}", copy, e);
            }
        }
        Ok(done.len())
    }
}

/// Whether the index copy of `path` is byte-identical to its copy in `commit`.
fn in_snapshot(layout: &Layout, commit: &Commit, path: &str) -> bool {
    if !commit.contains(path) {
        return false;
    }
    match (
        file_digest(&layout.index_copy(path)),
        file_digest(&layout.snapshot_copy(commit.id(), path)),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn copy_into_index(layout: &Layout, source: &Path, key: String) -> Result<StagedFile> {
    let size = copy_file(source, &layout.index_copy(&key))?;
    let last_modified = fs::metadata(source)
        .map(|m| modified_time(&m))
        .unwrap_or_else(|_| now());

    Ok(StagedFile::new(key, size, last_modified))
}

fn absolute(layout: &Layout, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        layout.root().join(path)
    }
}

fn modified_time(meta: &fs::Metadata) -> DateTime<Utc> {
    meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| now())
}

/// Accepts the repository root or its immediate parent, never the metadata folder.
fn check_boundary(layout: &Layout, canonical: &Path) -> Result<()> {
    let root = layout.root();
    if canonical.starts_with(layout.data_dir()) {
        return Err(Error::InvalidPath(format!(
            "{} is inside the repository metadata folder",
            canonical.display()
        )));
    }
    if canonical.starts_with(root) {
        return Ok(());
    }
    match root.parent() {
        Some(parent) if canonical.starts_with(parent) => Ok(()),
        _ => Err(Error::OutsideRepository(canonical.display().to_string())),
    }
}

/// Normalized staged path: `/`-separated relative to the root, or absolute
/// for files that live beside the repository.
fn staged_key(layout: &Layout, canonical: &Path) -> Result<String> {
    check_boundary(layout, canonical)?;

    let key = match canonical.strip_prefix(layout.root()) {
        Ok(relative) => {
            let key = relative
                .components()
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part.to_string_lossy().to_string()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("/");
            if Layout::is_reserved_key(&key) {
                return Err(Error::InvalidPath(format!(
                    "{} collides with a name the staging index reserves",
                    key
                )));
            }
            key
        }
        Err(_) => canonical.to_string_lossy().to_string(),
    };

    if key.is_empty() {
        return Err(Error::InvalidPath(canonical.display().to_string()));
    }
    if key.contains(',') || key.contains('\n') || key.contains('\r') {
        return Err(Error::InvalidPath(format!(
            "{} contains a character that cannot be recorded in commit metadata",
            key
        )));
    }
    Ok(key)
}

fn enumerate_files(layout: &Layout, start: &Path, exclude_patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut overrides = OverrideBuilder::new(start);
    for pattern in exclude_patterns {
        overrides
            .add(&format!("!{}", pattern))
            .map_err(|e| Error::Config(format!("bad exclude pattern {}: {}", pattern, e)))?;
    }
    let overrides = overrides
        .build()
        .map_err(|e| Error::Config(format!("bad exclude patterns: {}", e)))?;

    let data_dir = layout.root().join(DATA_DIR);
    let walker = WalkBuilder::new(start)
        .standard_filters(false)
        .follow_links(false)
        .overrides(overrides)
        .filter_entry(move |entry| entry.path() != data_dir)
        .build();

    let mut files = Vec::new();
    for result in walker {
        match result {
            Ok(entry) => {
                if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                    files.push(entry.into_path());
                }
            }
            Err(e) => warn!("Skipping unreadable entry: {}", e),
        }
    }

    files.sort();
    Ok(files)
}
