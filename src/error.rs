//! Typed errors for the fetch and sync pipelines
//!
//! Browsing failures (`FetchError`) and sync failures (`SyncError`) are kept
//! separate so a failed download never masquerades as a failed listing and
//! vice versa. Nothing in this crate retries automatically; errors are
//! surfaced to the caller as-is.

use serde::Deserialize;
use std::fmt;
use thiserror::Error;

use crate::planner::RepoKey;

/// Error body returned by the Gitea API on non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub message: String,
}

/// Failure while fetching a resource collection from the hosting API.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level failure (DNS, connection refused, timeout).
    #[error("transport failure for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success HTTP status.
    #[error("HTTP {status} from {url} (errors: {}; message: {})", .body.errors.join(", "), .body.message)]
    RemoteApi {
        status: u16,
        url: String,
        body: ApiErrorBody,
    },
}

impl FetchError {
    /// Build a `RemoteApi` error from a non-success response, surfacing the
    /// server's `errors` and `message` fields verbatim. A body that is not
    /// the expected JSON shape degrades to empty fields rather than hiding
    /// the HTTP status.
    pub(crate) async fn from_response(url: String, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.json::<ApiErrorBody>().await.unwrap_or_default();
        FetchError::RemoteApi { status, url, body }
    }
}

/// The stage of a repository sync at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    /// Creating the local repository directory.
    EnsureDir,
    /// Initializing the repository and registering the remote.
    Init,
    /// Appending sparse-checkout patterns.
    Patterns,
    /// Pulling from the remote default branch.
    Pull,
    /// Hard-resetting the working tree.
    Reset,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStage::EnsureDir => "directory creation",
            SyncStage::Init => "repository initialization",
            SyncStage::Patterns => "sparse-checkout pattern update",
            SyncStage::Pull => "pull",
            SyncStage::Reset => "hard reset",
        };
        f.write_str(name)
    }
}

/// A single repository's sync aborted. Other repositories are unaffected.
#[derive(Debug, Error)]
#[error("sync of {repo} failed during {stage}: {source}")]
pub struct SyncError {
    pub repo: RepoKey,
    pub stage: SyncStage,
    #[source]
    pub source: anyhow::Error,
}

impl SyncError {
    pub fn new(repo: RepoKey, stage: SyncStage, source: anyhow::Error) -> Self {
        Self {
            repo,
            stage,
            source,
        }
    }
}

/// A required external tool is missing; the whole operation is refused
/// before any per-repository task starts.
#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error("git was not found on this host: {0}")]
    GitUnavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_api_display_surfaces_server_fields() {
        let err = FetchError::RemoteApi {
            status: 403,
            url: "http://localhost:3000/api/v1/user/repos".to_string(),
            body: ApiErrorBody {
                errors: vec!["token scope".to_string()],
                message: "forbidden".to_string(),
            },
        };

        let text = err.to_string();
        assert!(text.contains("403"));
        assert!(text.contains("/api/v1/user/repos"));
        assert!(text.contains("token scope"));
        assert!(text.contains("forbidden"));
    }

    #[test]
    fn api_error_body_tolerates_missing_fields() {
        let body: ApiErrorBody = serde_json::from_str("{}").unwrap();
        assert!(body.errors.is_empty());
        assert!(body.message.is_empty());
    }

    #[test]
    fn sync_error_names_repo_and_stage() {
        let err = SyncError::new(
            RepoKey::new("alice", "backend"),
            SyncStage::Pull,
            anyhow::anyhow!("remote hung up"),
        );
        let text = err.to_string();
        assert!(text.contains("alice/backend"));
        assert!(text.contains("pull"));
    }
}
