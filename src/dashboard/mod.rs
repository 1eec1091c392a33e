//! Dashboard Module
//!
//! HTTP API over the synchronized feeds: current datasets, DAG run views
//! and manual reload/clear commands.
//! Only compiled when the `dashboard` feature is enabled.

mod api;
mod types;

pub use api::create_router;
pub use types::*;

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::dag::{summarize_runs, PipelineTopology, DEFAULT_LAST_RUNS};
use crate::overlay::{attach_trl, AnnotatedCandle};
use crate::sync::{FeedHandle, SyncCommand};
use crate::types::{DagEvent, FeedKind, PriceCandle, Record, TrlEvent};

/// Handles of the running feeds; a disabled feed has none
#[derive(Debug, Clone, Default)]
pub struct FeedHandles {
    pub prices: Option<FeedHandle<PriceCandle>>,
    pub trl: Option<FeedHandle<TrlEvent>>,
    pub dag: Option<FeedHandle<DagEvent>>,
}

impl FeedHandles {
    pub fn is_enabled(&self, feed: FeedKind) -> bool {
        match feed {
            FeedKind::Prices => self.prices.is_some(),
            FeedKind::Trl => self.trl.is_some(),
            FeedKind::DagEvents => self.dag.is_some(),
        }
    }

    fn record_count(&self, feed: FeedKind) -> usize {
        match feed {
            FeedKind::Prices => self.prices.as_ref().map_or(0, |h| h.dataset().len()),
            FeedKind::Trl => self.trl.as_ref().map_or(0, |h| h.dataset().len()),
            FeedKind::DagEvents => self.dag.as_ref().map_or(0, |h| h.dataset().len()),
        }
    }

    /// `None` when the feed is disabled, otherwise whether the runner took it
    pub async fn send(&self, feed: FeedKind, command: SyncCommand) -> Option<bool> {
        match feed {
            FeedKind::Prices => dispatch(self.prices.as_ref(), command).await,
            FeedKind::Trl => dispatch(self.trl.as_ref(), command).await,
            FeedKind::DagEvents => dispatch(self.dag.as_ref(), command).await,
        }
    }
}

async fn dispatch<R: Record>(handle: Option<&FeedHandle<R>>, command: SyncCommand) -> Option<bool> {
    let handle = handle?;
    Some(match command {
        SyncCommand::Reload => handle.reload().await,
        SyncCommand::ClearCache => handle.clear_cache().await,
        SyncCommand::Shutdown => handle.shutdown().await,
    })
}

/// Shared state for the dashboard API
#[derive(Debug)]
pub struct DashboardMemory {
    pub handles: FeedHandles,
    pub topology: PipelineTopology,
    pub last_runs: usize,
    started_at: DateTime<Utc>,
}

impl DashboardMemory {
    pub fn new(handles: FeedHandles) -> Self {
        Self {
            handles,
            topology: PipelineTopology::default(),
            last_runs: DEFAULT_LAST_RUNS,
            started_at: Utc::now(),
        }
    }

    pub fn with_topology(mut self, topology: PipelineTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_last_runs(mut self, last_runs: usize) -> Self {
        self.last_runs = last_runs;
        self
    }

    /// Price candles with the TRL news overlay, empty when prices are off
    pub fn annotated_prices(&self) -> Vec<AnnotatedCandle> {
        let Some(prices) = &self.handles.prices else {
            return Vec::new();
        };
        let trl = self
            .handles
            .trl
            .as_ref()
            .map(|h| h.dataset())
            .unwrap_or_default();
        attach_trl(&prices.dataset(), &trl)
    }

    pub fn runs(&self, limit: usize) -> Vec<RunResponse> {
        let Some(dag) = &self.handles.dag else {
            return Vec::new();
        };
        summarize_runs(&dag.dataset(), limit)
            .iter()
            .map(|run| {
                RunResponse::new(
                    run,
                    self.topology.graph(run),
                    self.topology.gantt_links(run),
                )
            })
            .collect()
    }

    pub fn health(&self) -> HealthResponse {
        let now = Utc::now();
        HealthResponse {
            feeds: FeedKind::ALL
                .iter()
                .map(|&feed| FeedHealthResponse {
                    feed: feed.to_string(),
                    enabled: self.handles.is_enabled(feed),
                    records: self.handles.record_count(feed),
                })
                .collect(),
            uptime_secs: (now - self.started_at).num_seconds(),
            updated_at: now.timestamp_millis(),
        }
    }
}

/// Start the dashboard server
pub async fn start_server(memory: Arc<DashboardMemory>, bind_addr: &str) -> anyhow::Result<()> {
    let app = create_router(memory);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;

    tracing::info!("🖥️ Dashboard API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
