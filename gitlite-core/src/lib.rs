//! # gitlite-core
//!
//! Core library for gitlite - a lightweight snapshot-based version control
//! system for a single local working directory.
//!
//! Staged files are copied into an index, commits freeze the staged set into
//! an immutable snapshot, and every commit is recorded both on the filesystem
//! (authoritative) and in a relational store used for queryable history.

pub mod commit;
pub mod config;
pub mod diff;
pub mod error;
pub mod fs_store;
pub mod models;
pub mod progress;
pub mod reconcile;
pub mod repository;
pub mod staging;
pub mod storage;
pub mod summary;

pub use config::Config;
pub use diff::{CommitDiff, FileDiff};
pub use error::{Error, ErrorKind, Result};
pub use models::{
    ActivityEntry, Commit, CommitFile, FileStatus, RepositoryInfo, StageAllReport, StageOutcome,
    StagedFile, StatusReport, StoreMode,
};
pub use progress::{Progress, Silent};
pub use repository::Repository;
pub use storage::Storage;
