//! Human-readable commit summaries derived from the previous commit.

use crate::models::Commit;
use std::fmt;
use std::path::Path;

const CODE_EXTENSIONS: &[&str] = &[
    "rs", "java", "kt", "py", "js", "jsx", "ts", "tsx", "c", "h", "cc", "cpp", "hpp", "cs",
    "go", "rb", "php", "swift", "scala", "sh", "sql",
];
const DOC_EXTENSIONS: &[&str] = &["md", "txt", "rst", "adoc", "pdf", "doc", "docx", "html"];
const CONFIG_EXTENSIONS: &[&str] = &[
    "toml", "yaml", "yml", "json", "xml", "ini", "cfg", "conf", "properties", "env", "gradle",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Code,
    Docs,
    Config,
    Other,
}

impl FileKind {
    pub fn classify(path: &str) -> Self {
        let ext = Path::new(path)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if CODE_EXTENSIONS.contains(&ext.as_str()) {
            FileKind::Code
        } else if DOC_EXTENSIONS.contains(&ext.as_str()) {
            FileKind::Docs
        } else if CONFIG_EXTENSIONS.contains(&ext.as_str()) {
            FileKind::Config
        } else {
            FileKind::Other
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindCounts {
    pub code: usize,
    pub docs: usize,
    pub config: usize,
}

impl KindCounts {
    pub fn of<'a>(paths: impl IntoIterator<Item = &'a String>) -> Self {
        let mut counts = Self::default();
        for path in paths {
            match FileKind::classify(path) {
                FileKind::Code => counts.code += 1,
                FileKind::Docs => counts.docs += 1,
                FileKind::Config => counts.config += 1,
                FileKind::Other => {}
            }
        }
        counts
    }

    fn is_empty(&self) -> bool {
        self.code == 0 && self.docs == 0 && self.config == 0
    }
}

impl fmt::Display for KindCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.code > 0 {
            parts.push(format!("code: {}", self.code));
        }
        if self.docs > 0 {
            parts.push(format!("docs: {}", self.docs));
        }
        if self.config > 0 {
            parts.push(format!("config: {}", self.config));
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// Summarizes `files` against the previous commit's file count.
pub fn summarize(files: &[String], previous: Option<&Commit>) -> String {
    let total = files.len();
    let before = previous.map(Commit::file_count).unwrap_or(0);

    let headline = if total > before {
        format!("Added {} files (total: {})", total - before, total)
    } else if total < before {
        format!("Removed {} files (total: {})", before - total, total)
    } else {
        format!("Modified {} files", total)
    };

    let counts = KindCounts::of(files);
    if counts.is_empty() {
        headline
    } else {
        format!("{} [{}]", headline, counts)
    }
}
