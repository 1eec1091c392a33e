//! Configuration management for pipeline-feeds
//!
//! Loads from optional config files + environment variables

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::types::MAX_HORIZON_DAYS;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub sync: SyncConfig,
    pub prices: PricesConfig,
    pub trl: TrlConfig,
    pub dag: DagConfig,
    pub cache: CacheConfig,
    pub dashboard: DashboardConfig,
}

impl AppConfig {
    /// Built-in defaults for every key
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let builder = Config::builder()
            // API defaults
            .set_default("api.base_url", "http://localhost:8000")?
            .set_default("api.timeout_secs", 30)?
            // Sync defaults
            .set_default("sync.poll_interval_secs", 60)?
            .set_default("sync.horizon_days", crate::types::DEFAULT_HORIZON_DAYS)?
            .set_default("sync.merge_policy", "keep_cached")?
            // Feed defaults
            .set_default("prices.enabled", true)?
            .set_default("prices.symbol", "BTCUSDT")?
            .set_default("prices.interval", "1h")?
            .set_default("trl.enabled", true)?
            .set_default("dag.enabled", true)?
            .set_default("dag.dag_name", "training_pipeline")?
            .set_default("dag.limit", 300)?
            .set_default("dag.last_runs", crate::dag::DEFAULT_LAST_RUNS as u64)?
            .set_default("dag.cryptos", vec!["BTCUSDT"])?
            .set_default("dag.models", vec!["lightgbm", "tst"])?
            // Cache defaults
            .set_default("cache.data_dir", "./data")?
            // Dashboard defaults
            .set_default("dashboard.enabled", true)?
            .set_default("dashboard.bind_addr", "127.0.0.1:3001")?;
        Ok(builder)
    }

    /// Load configuration from file and environment.
    ///
    /// The caller loads `.env` beforehand.
    pub fn load() -> Result<Self> {
        let config = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (PIPEFEEDS__SYNC__POLL_INTERVAL_SECS=30)
            .add_source(
                Environment::with_prefix("PIPEFEEDS")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("dag.cryptos")
                    .with_list_parse_key("dag.models")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app_config.validate()?;

        Ok(app_config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            bail!("api.base_url must not be empty");
        }
        if self.sync.poll_interval_secs == 0 {
            bail!("sync.poll_interval_secs must be at least 1");
        }
        if self.sync.horizon_days <= 0 {
            bail!("sync.horizon_days must be positive");
        }
        if self.sync.horizon_days > MAX_HORIZON_DAYS {
            bail!(
                "sync.horizon_days must be at most {} (got {})",
                MAX_HORIZON_DAYS,
                self.sync.horizon_days
            );
        }
        if self.prices.enabled && self.prices.symbol.trim().is_empty() {
            bail!("prices.symbol must be set when the prices feed is enabled");
        }
        Ok(())
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        let feeds: Vec<&str> = [
            (self.prices.enabled, "prices"),
            (self.trl.enabled, "trl"),
            (self.dag.enabled, "dag"),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, name)| *name)
        .collect();

        format!(
            "api={} feeds={:?} poll={}s horizon={}d merge={:?} data_dir={}",
            self.api.base_url,
            feeds,
            self.sync.poll_interval_secs,
            self.sync.horizon_days,
            self.sync.merge_policy,
            self.cache.data_dir.display()
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
