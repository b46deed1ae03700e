use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_EXCLUDES: &[&str] = &[
    "data",
    ".git",
    "target",
    "build",
    "out",
    "bin",
    "node_modules",
    ".idea",
    ".vscode",
    ".gradle",
    "__pycache__",
];

/// Repository configuration, constructed once and handed to every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub author: String,
    pub description: Option<String>,
    pub exclude_patterns: Vec<String>,
    pub database: DatabaseConfig,
    pub diff: DiffConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub enabled: bool,
    /// Defaults to `<root>/data/gitlite.db` when unset.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    pub context_lines: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            author: std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .unwrap_or_else(|_| "unknown".to_string()),
            description: None,
            exclude_patterns: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
            database: DatabaseConfig::default(),
            diff: DiffConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self { context_lines: 3 }
    }
}

impl Config {
    pub fn config_path(root: &Path) -> PathBuf {
        root.join("data").join(CONFIG_FILE)
    }

    /// Loads `<root>/data/config.toml`, falling back to defaults when it is absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path).map_err(|e| Error::path_io(&path, e))?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = Self::config_path(root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::path_io(parent, e))?;
        }
        std::fs::write(&path, toml::to_string_pretty(self)?).map_err(|e| Error::path_io(&path, e))
    }

    pub fn validate(&self) -> Result<()> {
        if self.author.trim().is_empty() {
            return Err(Error::Config("author must not be empty".to_string()));
        }
        if self.exclude_patterns.iter().any(|p| p.trim().is_empty()) {
            return Err(Error::Config("exclude patterns must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn database_path(&self, root: &Path) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| root.join("data").join("gitlite.db"))
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_database_path(mut self, path: PathBuf) -> Self {
        self.database.path = Some(path);
        self
    }

    pub fn without_database(mut self) -> Self {
        self.database.enabled = false;
        self
    }
}
