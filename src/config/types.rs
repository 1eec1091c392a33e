//! Configuration sections

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::sync::MergePolicy;
use crate::types::MAX_HORIZON_DAYS;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Pipeline backend base URL
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Seconds between background cycles
    pub poll_interval_secs: u64,
    /// Cold-start lookback in days
    pub horizon_days: i64,
    /// keep_cached | prefer_fetched
    pub merge_policy: MergePolicy,
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Lookback clamped to `1..=MAX_HORIZON_DAYS`
    pub fn horizon(&self) -> chrono::Duration {
        chrono::Duration::days(self.horizon_days.clamp(1, MAX_HORIZON_DAYS))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricesConfig {
    pub enabled: bool,
    /// Trading pair, e.g. BTCUSDT
    pub symbol: String,
    /// Candle interval (1h, 15m)
    pub interval: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrlConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DagConfig {
    pub enabled: bool,
    pub dag_name: String,
    /// Upper bound on events per request
    pub limit: usize,
    /// Runs kept in summaries
    pub last_runs: usize,
    /// Cryptos with a post-training task per model
    pub cryptos: Vec<String>,
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub bind_addr: String,
}
