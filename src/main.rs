//! pipeline-feeds daemon
//!
//! Keeps the price, TRL and DAG event caches in sync with the pipeline
//! backend and, with the `dashboard` feature, serves them over HTTP.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pipeline_feeds::config::AppConfig;
use pipeline_feeds::fetch::{ApiClient, DagEventFetcher, DeltaFetcher, PriceFetcher, TrlFetcher};
use pipeline_feeds::oracle::{FingerprintOracle, HttpFingerprintOracle};
use pipeline_feeds::persistence::{JsonFileStore, LocalCache};
use pipeline_feeds::sync::{FeedHandle, FeedRunner, SyncEngine};
use pipeline_feeds::types::{DagEvent, PriceCandle, Record, TrlEvent};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pipeline_feeds=info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn spawn_feed<R: Record>(
    config: &AppConfig,
    cache: &LocalCache,
    oracle: &Arc<dyn FingerprintOracle>,
    fetcher: Arc<dyn DeltaFetcher<R>>,
) -> (FeedHandle<R>, JoinHandle<()>) {
    let engine = SyncEngine::new(cache.clone(), oracle.clone(), fetcher)
        .with_horizon(config.sync.horizon())
        .with_merge_policy(config.sync.merge_policy);
    FeedRunner::spawn(engine, config.sync.poll_interval())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::load()?;
    info!("🚀 pipeline-feeds v{} starting", env!("CARGO_PKG_VERSION"));
    info!("⚙️ {}", config);

    let api = ApiClient::new(&config.api.base_url, config.api.timeout())
        .context("Failed to build HTTP client")?;
    let oracle: Arc<dyn FingerprintOracle> = Arc::new(HttpFingerprintOracle::new(api.clone()));
    let store = JsonFileStore::open(&config.cache.data_dir).with_context(|| {
        format!(
            "Failed to open cache directory {}",
            config.cache.data_dir.display()
        )
    })?;
    let cache = LocalCache::new(Arc::new(store));

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    let prices = if config.prices.enabled {
        let fetcher = PriceFetcher::new(api.clone(), &config.prices.symbol, &config.prices.interval);
        let (handle, task) = spawn_feed::<PriceCandle>(&config, &cache, &oracle, Arc::new(fetcher));
        tasks.push(task);
        Some(handle)
    } else {
        None
    };

    let trl = if config.trl.enabled {
        let fetcher = TrlFetcher::new(api.clone());
        let (handle, task) = spawn_feed::<TrlEvent>(&config, &cache, &oracle, Arc::new(fetcher));
        tasks.push(task);
        Some(handle)
    } else {
        None
    };

    let dag = if config.dag.enabled {
        let fetcher = DagEventFetcher::new(api.clone(), &config.dag.dag_name, config.dag.limit);
        let (handle, task) = spawn_feed::<DagEvent>(&config, &cache, &oracle, Arc::new(fetcher));
        tasks.push(task);
        Some(handle)
    } else {
        None
    };

    if tasks.is_empty() {
        warn!("No feed enabled, nothing to do");
        return Ok(());
    }
    info!(feeds = tasks.len(), "✅ Feed runners spawned");

    #[cfg(feature = "dashboard")]
    serve_dashboard(&config, prices.clone(), trl.clone(), dag.clone());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("🛑 Shutdown requested");

    if let Some(handle) = &prices {
        handle.shutdown().await;
    }
    if let Some(handle) = &trl {
        handle.shutdown().await;
    }
    if let Some(handle) = &dag {
        handle.shutdown().await;
    }

    for task in tasks {
        match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Feed runner panicked"),
            Err(_) => warn!("Feed runner did not stop in time"),
        }
    }

    info!("👋 pipeline-feeds stopped");
    Ok(())
}

#[cfg(feature = "dashboard")]
fn serve_dashboard(
    config: &AppConfig,
    prices: Option<FeedHandle<PriceCandle>>,
    trl: Option<FeedHandle<TrlEvent>>,
    dag: Option<FeedHandle<DagEvent>>,
) {
    use pipeline_feeds::dag::PipelineTopology;
    use pipeline_feeds::dashboard::{start_server, DashboardMemory, FeedHandles};

    if !config.dashboard.enabled {
        return;
    }

    let memory = DashboardMemory::new(FeedHandles { prices, trl, dag })
        .with_topology(PipelineTopology::training(
            &config.dag.cryptos,
            &config.dag.models,
        ))
        .with_last_runs(config.dag.last_runs);
    let bind_addr = config.dashboard.bind_addr.clone();

    tokio::spawn(async move {
        if let Err(e) = start_server(Arc::new(memory), &bind_addr).await {
            tracing::error!(error = %e, "Dashboard server failed");
        }
    });
}
