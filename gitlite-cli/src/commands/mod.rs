pub mod add;
pub mod add_all;
pub mod commit;
pub mod diff;
pub mod init;
pub mod log;
pub mod serve;
pub mod status;

use anyhow::{Context as _, Result};
use gitlite_core::{Config, Repository};
use gitlite_server::{Orchestrator, TaskEvents, TaskHandle, TaskOutcome, TaskOutput};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Global options shared by every command.
pub struct Context {
    pub repo: PathBuf,
    pub db: Option<PathBuf>,
    pub no_db: bool,
    pub author: Option<String>,
}

impl Context {
    /// The repository's saved configuration with command-line overrides applied.
    pub fn config(&self, root: &Path) -> Result<Config> {
        let mut config = Config::load(root)
            .with_context(|| format!("failed to load configuration under {}", root.display()))?;

        if let Some(author) = &self.author {
            config = config.with_author(author.clone());
        }
        if let Some(db) = &self.db {
            config = config.with_database_path(db.clone());
        }
        if self.no_db {
            config = config.without_database();
        }
        Ok(config)
    }

    pub fn open(&self) -> Result<(Orchestrator, TaskEvents)> {
        let config = self.config(&self.repo)?;
        debug!("Opening repository at {:?}", self.repo);
        let repo = Repository::open(&self.repo, config).with_context(|| {
            format!(
                "no gitlite repository at {}. Run 'gitlite init' first.",
                self.repo.display()
            )
        })?;
        Ok(Orchestrator::new(Arc::new(Mutex::new(repo))))
    }
}

/// Waits for a task and turns a failure into an error carrying its message.
pub async fn finish(handle: TaskHandle) -> Result<TaskOutput> {
    let operation = handle.operation();
    match handle.outcome().await {
        TaskOutcome::Succeeded { output } | TaskOutcome::Cancelled { output } => Ok(output),
        TaskOutcome::Failed { message, kind } => {
            anyhow::bail!("{} failed ({:?}): {}", operation.as_str(), kind, message)
        }
    }
}

pub fn unexpected(output: TaskOutput) -> anyhow::Error {
    anyhow::anyhow!("unexpected task output: {:?}", output)
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context(repo: PathBuf) -> Context {
        Context {
            repo,
            db: None,
            no_db: false,
            author: None,
        }
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_overrides_apply() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(dir.path().to_path_buf());
        ctx.author = Some("alice".to_string());
        ctx.no_db = true;

        let config = ctx.config(dir.path()).unwrap();

        assert_eq!(config.author, "alice");
        assert!(!config.database.enabled);
    }

    #[tokio::test]
    async fn test_open_without_repository_fails() {
        let dir = TempDir::new().unwrap();
        let err = context(dir.path().to_path_buf()).open().err().unwrap();
        assert!(err.to_string().contains("gitlite init"));
    }
}
