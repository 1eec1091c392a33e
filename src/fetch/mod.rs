//! Upstream feed clients
//!
//! Thin HTTP wrappers around the backend endpoints. Every call returns a
//! `SyncResult`; the sync engine decides how failures degrade.

mod dag;
mod prices;
mod trl;

pub use dag::DagEventFetcher;
pub use prices::PriceFetcher;
pub use trl::TrlFetcher;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::trace;

use crate::error::{SyncError, SyncResult};
use crate::types::{FeedKind, Record, SyncWindow};

/// Retrieves the records of one feed inside a time window
#[async_trait]
pub trait DeltaFetcher<R: Record>: Send + Sync {
    fn feed(&self) -> FeedKind;

    async fn fetch(&self, window: SyncWindow) -> SyncResult<Vec<R>>;
}

/// Shared HTTP client for the pipeline backend
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET `path` and decode the JSON body.
    ///
    /// Non-2xx statuses are errors; the body is read as text first so a
    /// malformed payload surfaces as [`SyncError::Decode`].
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> SyncResult<T> {
        let url = self.url(path);
        let response = self.client.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text().await?;
        trace!(url = %url, bytes = body.len(), "Raw response received");
        decode_body(&body)
    }
}

pub(crate) fn decode_body<T: DeserializeOwned>(body: &str) -> SyncResult<T> {
    Ok(serde_json::from_str(body)?)
}

/// Query pairs carrying the window bounds
pub(crate) fn window_query(window: &SyncWindow) -> Vec<(&'static str, String)> {
    vec![("start", window.start_param()), ("end", window.end_param())]
}
