//! DAG task events: `GET /status/events?dag_name&limit`
//!
//! The endpoint has no time range, so the window is applied client side.

use async_trait::async_trait;
use tracing::debug;

use super::{ApiClient, DeltaFetcher};
use crate::error::SyncResult;
use crate::types::{DagEvent, FeedKind, Record, SyncWindow};

#[derive(Debug, Clone)]
pub struct DagEventFetcher {
    api: ApiClient,
    dag_name: String,
    limit: usize,
}

impl DagEventFetcher {
    pub fn new(api: ApiClient, dag_name: &str, limit: usize) -> Self {
        Self {
            api,
            dag_name: dag_name.to_string(),
            limit,
        }
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::with_capacity(2);
        if !self.dag_name.is_empty() {
            query.push(("dag_name", self.dag_name.clone()));
        }
        if self.limit > 0 {
            query.push(("limit", self.limit.to_string()));
        }
        query
    }
}

/// Drop events created before the window start. Events whose timestamp
/// does not parse are kept; the merge dedupes them by key.
fn since_window_start(events: Vec<DagEvent>, window: &SyncWindow) -> Vec<DagEvent> {
    events
        .into_iter()
        .filter(|e| e.timestamp().map_or(true, |ts| ts >= window.start))
        .collect()
}

#[async_trait]
impl DeltaFetcher<DagEvent> for DagEventFetcher {
    fn feed(&self) -> FeedKind {
        FeedKind::DagEvents
    }

    async fn fetch(&self, window: SyncWindow) -> SyncResult<Vec<DagEvent>> {
        let events: Vec<DagEvent> = self.api.get_json("status/events", &self.query()).await?;
        let received = events.len();
        let events = since_window_start(events, &window);
        debug!(
            dag = %self.dag_name,
            received,
            kept = events.len(),
            window = %window,
            "Fetched DAG events"
        );
        Ok(events)
    }
}
