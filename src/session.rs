//! Authenticated Gitea session
//!
//! A `Session` replaces ad-hoc global connection state with an explicit
//! context object: service URL, credentials and a shared HTTP client. It is
//! created once at successful login, handed to the pager and the sync
//! engine, and dropped at exit.

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::FetchError;

/// Connection context for one Gitea server.
#[derive(Debug, Clone)]
pub struct Session {
    http: reqwest::Client,
    service_url: String,
    username: String,
    password: String,
}

impl Session {
    /// Create a session without contacting the server. Intended for callers
    /// that have already validated the credentials (and for tests that talk
    /// to a local fixture instead of a live server).
    pub fn with_credentials(
        service_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let service_url = service_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            service_url,
            username: username.into(),
            password: password.into(),
        }
    }

    /// Validate credentials against `GET {service}/api/v1/user` and return
    /// a ready session. A non-success status (wrong password, missing user)
    /// is surfaced as [`FetchError::RemoteApi`].
    pub async fn login(
        service_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Arc<Self>, FetchError> {
        let session = Self::with_credentials(service_url, username, password);
        let url = format!("{}/api/v1/user", session.service_url);

        debug!("validating credentials against {url}");
        let response = session
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(FetchError::from_response(url, response).await);
        }

        info!(
            "authenticated against {} as {}",
            session.service_url, session.username
        );
        Ok(Arc::new(session))
    }

    /// Start a GET request with basic authentication applied.
    pub(crate) fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Listing endpoint for the authenticated user's repositories.
    pub fn repos_url(&self) -> String {
        format!("{}/api/v1/user/repos", self.service_url)
    }

    /// Directory-contents endpoint; an empty `path` lists the repo root.
    pub fn contents_url(&self, owner: &str, repo: &str, path: &str) -> String {
        format!(
            "{}/api/v1/repos/{}/{}/contents/{}",
            self.service_url, owner, repo, path
        )
    }

    /// Remote URL used for the local repository's `origin`.
    pub fn clone_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/{}/{}.git", self.service_url, owner, repo)
    }
}
