//! TRL news feed: `GET /trl?start&end`

use async_trait::async_trait;
use tracing::debug;

use super::{window_query, ApiClient, DeltaFetcher};
use crate::error::SyncResult;
use crate::types::{FeedKind, SyncWindow, TrlEvent};

#[derive(Debug, Clone)]
pub struct TrlFetcher {
    api: ApiClient,
}

impl TrlFetcher {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl DeltaFetcher<TrlEvent> for TrlFetcher {
    fn feed(&self) -> FeedKind {
        FeedKind::Trl
    }

    async fn fetch(&self, window: SyncWindow) -> SyncResult<Vec<TrlEvent>> {
        let events: Vec<TrlEvent> = self.api.get_json("trl", &window_query(&window)).await?;
        debug!(window = %window, count = events.len(), "Fetched TRL events");
        Ok(events)
    }
}
