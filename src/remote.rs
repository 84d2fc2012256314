//! Paginated fetching of remote resource collections
//!
//! The Gitea API returns collections (repositories, directory listings) in
//! pages. `RemotePager` hides the paging: it requests pages sequentially
//! starting at 1 and stops at the first empty page. A non-success status on
//! any page aborts the whole fetch; nothing is retried here, retry policy
//! belongs to the caller.

use futures::stream::{Stream, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::error::FetchError;
use crate::session::Session;

/// Page size used against the Gitea API (its per-page maximum).
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Repository record as returned by `GET /api/v1/user/repos`.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoRecord {
    pub name: String,
    pub owner: OwnerRecord,
    pub default_branch: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OwnerRecord {
    pub login: String,
}

/// Content record as returned by `GET /api/v1/repos/{owner}/{repo}/contents/{path}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentRecord {
    pub name: String,
    /// `"file"` or `"dir"`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub size: u64,
}

/// Fetches one resource collection, transparently paging until exhausted.
#[derive(Debug, Clone)]
pub struct RemotePager {
    session: Arc<Session>,
    page_size: usize,
}

impl RemotePager {
    pub fn new(session: Arc<Session>) -> Self {
        Self::with_page_size(session, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(session: Arc<Session>, page_size: usize) -> Self {
        Self { session, page_size }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Lazy stream of pages for `url`. Each call starts a fresh cursor at
    /// page 1; pages are requested strictly in order, and the stream ends
    /// at the first empty page. Errors terminate the stream.
    pub fn pages<T>(
        &self,
        url: &str,
    ) -> impl Stream<Item = Result<Vec<T>, FetchError>>
    where
        T: DeserializeOwned,
    {
        let session = Arc::clone(&self.session);
        let url = url.to_string();
        let page_size = self.page_size;

        futures::stream::try_unfold(1u32, move |page| {
            let session = Arc::clone(&session);
            let url = url.clone();
            async move {
                let items = fetch_page::<T>(&session, &url, page, page_size).await?;
                if items.is_empty() {
                    debug!("page {page} of {url} is empty, fetch complete");
                    Ok(None)
                } else {
                    debug!("page {page} of {url}: {} items", items.len());
                    Ok(Some((items, page + 1)))
                }
            }
        })
    }

    /// Fetch every page of `url` and concatenate the items.
    pub async fn fetch_all<T>(&self, url: &str) -> Result<Vec<T>, FetchError>
    where
        T: DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut pages = std::pin::pin!(self.pages::<T>(url));
        while let Some(page) = pages.try_next().await? {
            items.extend(page);
        }
        Ok(items)
    }
}

async fn fetch_page<T>(
    session: &Session,
    url: &str,
    page: u32,
    page_size: usize,
) -> Result<Vec<T>, FetchError>
where
    T: DeserializeOwned,
{
    let response = session
        .get(url)
        .query(&[("page", page.to_string()), ("limit", page_size.to_string())])
        .send()
        .await
        .map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

    if !response.status().is_success() {
        return Err(FetchError::from_response(url.to_string(), response).await);
    }

    response
        .json::<Vec<T>>()
        .await
        .map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })
}
