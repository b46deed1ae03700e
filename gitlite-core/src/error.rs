use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error on {path}: {source}")]
    PathIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid commit message: {0}")]
    InvalidMessage(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path is outside the repository boundary: {0}")]
    OutsideRepository(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Commit not found: {0}")]
    CommitNotFound(String),

    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("Nothing to commit: no files are staged")]
    EmptyCommit,

    #[error("Relational store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error(
        "Commit {commit_id} partially persisted: filesystem snapshot exists, metadata not recorded ({source})"
    )]
    PartiallyPersisted {
        commit_id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Repository lock poisoned")]
    LockPoisoned,
}

/// Coarse failure categories reported to callers across the orchestrator boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Io,
    EmptyCommit,
    StoreUnavailable,
    Transaction,
    PartiallyPersisted,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidMessage(_)
            | Error::InvalidPath(_)
            | Error::OutsideRepository(_)
            | Error::Config(_) => ErrorKind::Validation,
            Error::FileNotFound(_) | Error::CommitNotFound(_) | Error::RepositoryNotFound(_) => {
                ErrorKind::NotFound
            }
            Error::Io(_) | Error::PathIo { .. } | Error::LockPoisoned => ErrorKind::Io,
            Error::EmptyCommit => ErrorKind::EmptyCommit,
            Error::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Error::Database(_) | Error::Transaction(_) => ErrorKind::Transaction,
            Error::PartiallyPersisted { .. } => ErrorKind::PartiallyPersisted,
        }
    }

    pub(crate) fn path_io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Error::PathIo {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}
