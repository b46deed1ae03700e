//! # gitlite-sdk
//!
//! Blocking client for front-ends that drive a running `gitlite serve`.
//!
//! ## Example
//!
//! ```no_run
//! use gitlite_sdk::GitliteClient;
//!
//! let client = GitliteClient::new("http://localhost:3030");
//!
//! client.add("src/main.rs").unwrap();
//! let commit = client.commit("Implemented main function", None).unwrap();
//!
//! for entry in client.log().unwrap() {
//!     println!("{} {}", entry.id(), entry.message());
//! }
//! # let _ = commit;
//! ```

use anyhow::Result;
use gitlite_core::{Commit, CommitDiff, ErrorKind, StageAllReport, StageOutcome, StatusReport};
use reqwest::blocking::Response;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct GitliteClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct StageRequest<'a> {
    path: &'a str,
}

#[derive(Serialize)]
struct StageAllRequest<'a> {
    root: Option<&'a str>,
    exclude: Option<&'a [String]>,
}

#[derive(Serialize)]
struct CreateCommitRequest<'a> {
    message: &'a str,
    summary: Option<&'a str>,
}

/// Failure reported by the server.
#[derive(Debug, Clone, Deserialize, thiserror::Error)]
#[error("{kind:?}: {error}")]
pub struct ApiError {
    pub error: String,
    pub kind: ErrorKind,
}

impl GitliteClient {
    /// Create a new gitlite client
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the gitlite server (e.g., "http://localhost:3030")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check server health
    pub fn health_check(&self) -> Result<bool> {
        let response = self.client.get(self.url("/health")).send()?;

        Ok(response.status().is_success())
    }

    pub fn status(&self) -> Result<StatusReport> {
        parse(self.client.get(self.url("/status")).send()?)
    }

    /// Stage one file, relative to the repository root or absolute.
    pub fn add(&self, path: &str) -> Result<StageOutcome> {
        parse(
            self.client
                .post(self.url("/staged"))
                .json(&StageRequest { path })
                .send()?,
        )
    }

    /// Stage every new file under `root` (the repository root when `None`).
    /// `exclude` replaces the configured exclude patterns when given.
    pub fn add_all(&self, root: Option<&str>, exclude: Option<&[String]>) -> Result<StageAllReport> {
        parse(
            self.client
                .post(self.url("/staged/all"))
                .json(&StageAllRequest { root, exclude })
                .send()?,
        )
    }

    pub fn commit(&self, message: &str, summary: Option<&str>) -> Result<Commit> {
        parse(
            self.client
                .post(self.url("/commits"))
                .json(&CreateCommitRequest { message, summary })
                .send()?,
        )
    }

    /// Commit history, newest first
    pub fn log(&self) -> Result<Vec<Commit>> {
        parse(self.client.get(self.url("/commits")).send()?)
    }

    /// Look up a commit by full id or unambiguous prefix
    pub fn get_commit(&self, id: &str) -> Result<Commit> {
        parse(self.client.get(self.url(&format!("/commits/{}", id))).send()?)
    }

    pub fn diff(&self, from: &str, to: &str, detailed: bool) -> Result<CommitDiff> {
        parse(
            self.client
                .get(self.url(&format!("/diff/{}/{}", from, to)))
                .query(&[("detailed", detailed)])
                .send()?,
        )
    }
}

fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json()?);
    }

    let body = response.text()?;
    Err(api_error(status.as_u16(), &body))
}

fn api_error(status: u16, body: &str) -> anyhow::Error {
    match serde_json::from_str::<ApiError>(body) {
        Ok(error) => anyhow::Error::new(error).context(format!("server returned {}", status)),
        Err(_) => anyhow::anyhow!("server returned {}: {}", status, body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = GitliteClient::new("http://localhost:3030/");
        assert_eq!(client.base_url, "http://localhost:3030");
        assert_eq!(client.url("/status"), "http://localhost:3030/status");
    }

    #[test]
    fn test_api_error_keeps_kind() {
        let err = api_error(409, r#"{"error":"Nothing to commit","kind":"empty_commit"}"#);

        let api = err.downcast_ref::<ApiError>().unwrap();
        assert_eq!(api.kind, ErrorKind::EmptyCommit);
        assert_eq!(api.error, "Nothing to commit");
    }

    #[test]
    fn test_api_error_without_json_body() {
        let err = api_error(502, "bad gateway");
        assert_eq!(err.to_string(), "server returned 502: bad gateway");
    }
}
