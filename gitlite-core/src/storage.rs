use crate::error::{Error, Result};
use crate::models::{
    now, ActivityEntry, Commit, CommitFile, FileStatus, RepositoryInfo, StagedFile, StagedStatus,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};

const SCHEMA_VERSION: i32 = 1;

/// Relational metadata/audit index. The filesystem stays authoritative;
/// everything here is queryable history.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let mut storage = Self { conn };
        storage.initialize()?;
        Ok(storage)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut storage = Self { conn };
        storage.initialize()?;
        Ok(storage)
    }

    fn initialize(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS repositories (
                repo_id INTEGER PRIMARY KEY AUTOINCREMENT,
                repo_name TEXT NOT NULL,
                repo_path TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                last_commit_at TEXT,
                description TEXT
            );

            CREATE TABLE IF NOT EXISTS commits (
                commit_id TEXT PRIMARY KEY,
                repo_id INTEGER NOT NULL,
                message TEXT NOT NULL,
                summary TEXT NOT NULL,
                author TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                file_count INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (repo_id) REFERENCES repositories(repo_id)
            );

            CREATE TABLE IF NOT EXISTS commit_files (
                commit_file_id INTEGER PRIMARY KEY AUTOINCREMENT,
                commit_id TEXT NOT NULL,
                repo_id INTEGER NOT NULL,
                file_path TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (commit_id, file_path),
                FOREIGN KEY (commit_id) REFERENCES commits(commit_id),
                FOREIGN KEY (repo_id) REFERENCES repositories(repo_id)
            );

            CREATE TABLE IF NOT EXISTS staged_files (
                staged_file_id INTEGER PRIMARY KEY AUTOINCREMENT,
                repo_id INTEGER NOT NULL,
                file_path TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                last_modified TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (repo_id) REFERENCES repositories(repo_id)
            );

            CREATE TABLE IF NOT EXISTS activity_logs (
                log_id INTEGER PRIMARY KEY AUTOINCREMENT,
                repo_id INTEGER NOT NULL,
                operation TEXT NOT NULL,
                details TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (repo_id) REFERENCES repositories(repo_id)
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_staged_active
                ON staged_files(repo_id, file_path) WHERE status = 'staged';
            CREATE INDEX IF NOT EXISTS idx_commits_repo ON commits(repo_id);
            CREATE INDEX IF NOT EXISTS idx_commits_timestamp ON commits(timestamp);
            CREATE INDEX IF NOT EXISTS idx_commit_files_commit ON commit_files(commit_id);
            CREATE INDEX IF NOT EXISTS idx_activity_repo ON activity_logs(repo_id);
            "#,
        )?;

        let version: Option<i32> = self
            .conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .optional()?;

        if version.is_none() {
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
        }

        Ok(())
    }

    // Repository operations

    /// Registers the repository by path, returning its stable numeric identity.
    pub fn register_repository(&self, repo: &RepositoryInfo) -> Result<i64> {
        self.conn.execute(
            "INSERT OR IGNORE INTO repositories (repo_name, repo_path, created_at, description)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                repo.name,
                repo.path.to_string_lossy().as_ref(),
                repo.created_at.to_rfc3339(),
                repo.description,
            ],
        )?;

        self.find_repository_id(&repo.path)?
            .ok_or_else(|| Error::RepositoryNotFound(repo.path.display().to_string()))
    }

    pub fn find_repository_id(&self, path: &Path) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT repo_id FROM repositories WHERE repo_path = ?1",
                params![path.to_string_lossy().as_ref()],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn get_repository(&self, repo_id: i64) -> Result<RepositoryInfo> {
        self.conn
            .query_row(
                "SELECT repo_id, repo_name, repo_path, created_at, description
                 FROM repositories WHERE repo_id = ?1",
                params![repo_id],
                repository_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::RepositoryNotFound(repo_id.to_string()))
    }

    // Staged file operations

    pub fn upsert_staged_file(&self, repo_id: i64, staged: &StagedFile) -> Result<()> {
        self.conn.execute(
            "INSERT INTO staged_files (repo_id, file_path, file_size, last_modified, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(repo_id, file_path) WHERE status = 'staged'
             DO UPDATE SET file_size = excluded.file_size, last_modified = excluded.last_modified",
            params![
                repo_id,
                staged.path,
                staged.size as i64,
                staged.last_modified.to_rfc3339(),
                StagedStatus::Staged.as_str(),
                staged.created_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    pub fn get_staged_files(&self, repo_id: i64) -> Result<Vec<StagedFile>> {
        let mut stmt = self.conn.prepare(
            "SELECT repo_id, file_path, file_size, last_modified, status, created_at
             FROM staged_files WHERE repo_id = ?1 AND status = 'staged'
             ORDER BY staged_file_id",
        )?;

        let staged = stmt
            .query_map(params![repo_id], staged_from_row)?
            .collect::<rusqlite::Result<Vec<StagedFile>>>()?;

        Ok(staged)
    }

    // Commit operations

    /// Records a commit, its file rows, clears staged rows, bumps the
    /// repository's last commit time and appends an audit row, atomically.
    pub fn record_commit(
        &self,
        repo_id: i64,
        commit: &Commit,
        files: &[CommitFile],
        details: &str,
    ) -> Result<()> {
        self.record_commit_tx(repo_id, commit, files, details, true)
            .map_err(|e| Error::Transaction(format!("commit {}: {}", commit.id(), e)))
    }

    /// Inserts a commit that the filesystem already holds, without touching
    /// staged rows. Used when replaying commits the store missed.
    pub fn backfill_commit(&self, repo_id: i64, commit: &Commit, files: &[CommitFile]) -> Result<()> {
        let details = format!("backfilled commit {}", commit.id());
        self.record_commit_tx(repo_id, commit, files, &details, false)
            .map_err(|e| Error::Transaction(format!("backfill {}: {}", commit.id(), e)))
    }

    fn record_commit_tx(
        &self,
        repo_id: i64,
        commit: &Commit,
        files: &[CommitFile],
        details: &str,
        consume_staged: bool,
    ) -> rusqlite::Result<()> {
        let created_at = now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO commits (commit_id, repo_id, message, summary, author, timestamp, file_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                commit.id(),
                repo_id,
                commit.message(),
                commit.summary(),
                commit.author(),
                commit.timestamp().to_rfc3339(),
                commit.file_count() as i64,
                created_at,
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO commit_files (commit_id, repo_id, file_path, file_size, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for file in files {
                stmt.execute(params![
                    file.commit_id,
                    repo_id,
                    file.path,
                    file.size as i64,
                    file.status.as_str(),
                    created_at,
                ])?;
            }
        }

        if consume_staged {
            tx.execute(
                "DELETE FROM staged_files WHERE repo_id = ?1 AND status = 'staged'",
                params![repo_id],
            )?;
        }

        tx.execute(
            "UPDATE repositories SET last_commit_at = ?1
             WHERE repo_id = ?2 AND (last_commit_at IS NULL OR last_commit_at < ?1)",
            params![commit.timestamp().to_rfc3339(), repo_id],
        )?;

        tx.execute(
            "INSERT INTO activity_logs (repo_id, operation, details, timestamp, created_at)
             VALUES (?1, 'commit', ?2, ?3, ?3)",
            params![repo_id, details, created_at],
        )?;

        tx.commit()
    }

    /// Deletes a commit and its file rows. Returns whether the commit existed.
    pub fn discard_commit(&self, commit_id: &str) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM commit_files WHERE commit_id = ?1",
            params![commit_id],
        )?;
        let removed = tx.execute("DELETE FROM commits WHERE commit_id = ?1", params![commit_id])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    pub fn commit_exists(&self, commit_id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM commits WHERE commit_id = ?1",
                params![commit_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn get_commit_files(&self, commit_id: &str) -> Result<Vec<CommitFile>> {
        let mut stmt = self.conn.prepare(
            "SELECT commit_id, file_path, file_size, status
             FROM commit_files WHERE commit_id = ?1 ORDER BY commit_file_id",
        )?;

        let files = stmt
            .query_map(params![commit_id], commit_file_from_row)?
            .collect::<rusqlite::Result<Vec<CommitFile>>>()?;

        Ok(files)
    }

    // Activity log operations

    pub fn log_activity(&self, repo_id: i64, operation: &str, details: &str) -> Result<()> {
        let ts = now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO activity_logs (repo_id, operation, details, timestamp, created_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![repo_id, operation, details, ts],
        )?;
        Ok(())
    }

    /// Most recent audit entries first.
    pub fn get_activity(&self, repo_id: i64, limit: usize) -> Result<Vec<ActivityEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT repo_id, operation, details, timestamp
             FROM activity_logs WHERE repo_id = ?1 ORDER BY log_id DESC LIMIT ?2",
        )?;

        let entries = stmt
            .query_map(params![repo_id, limit as i64], |row| {
                Ok(ActivityEntry {
                    repo_id: row.get(0)?,
                    operation: row.get(1)?,
                    details: row.get(2)?,
                    timestamp: parse_rfc3339(row, 3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<ActivityEntry>>>()?;

        Ok(entries)
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn parse_rfc3339(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.into())
        .map_err(|e| conversion_error(idx, e.to_string()))
}

fn repository_from_row(row: &Row) -> rusqlite::Result<RepositoryInfo> {
    let path: String = row.get(2)?;
    Ok(RepositoryInfo {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        path: PathBuf::from(path),
        created_at: parse_rfc3339(row, 3)?,
        description: row.get(4)?,
    })
}

fn staged_from_row(row: &Row) -> rusqlite::Result<StagedFile> {
    let size: i64 = row.get(2)?;
    let status: String = row.get(4)?;

    Ok(StagedFile {
        repo_id: Some(row.get(0)?),
        path: row.get(1)?,
        size: size as u64,
        last_modified: parse_rfc3339(row, 3)?,
        status: StagedStatus::parse(&status)
            .ok_or_else(|| conversion_error(4, format!("unknown staged status {}", status)))?,
        created_at: parse_rfc3339(row, 5)?,
    })
}

fn commit_file_from_row(row: &Row) -> rusqlite::Result<CommitFile> {
    let size: i64 = row.get(2)?;
    let status: String = row.get(3)?;

    Ok(CommitFile {
        commit_id: row.get(0)?,
        path: row.get(1)?,
        size: size as u64,
        status: FileStatus::parse(&status)
            .ok_or_else(|| conversion_error(3, format!("unknown file status {}", status)))?,
    })
}
