//! Candle feed: `GET /prices/{symbol}?start&end&interval`

use async_trait::async_trait;
use tracing::debug;

use super::{window_query, ApiClient, DeltaFetcher};
use crate::error::SyncResult;
use crate::types::{FeedKind, PriceCandle, SyncWindow};

#[derive(Debug, Clone)]
pub struct PriceFetcher {
    api: ApiClient,
    symbol: String,
    interval: String,
}

impl PriceFetcher {
    pub fn new(api: ApiClient, symbol: &str, interval: &str) -> Self {
        Self {
            api,
            symbol: symbol.to_lowercase(),
            interval: interval.to_string(),
        }
    }

    fn path(&self) -> String {
        format!("prices/{}", self.symbol)
    }

    fn query(&self, window: &SyncWindow) -> Vec<(&'static str, String)> {
        let mut query = window_query(window);
        query.push(("interval", self.interval.clone()));
        query
    }
}

#[async_trait]
impl DeltaFetcher<PriceCandle> for PriceFetcher {
    fn feed(&self) -> FeedKind {
        FeedKind::Prices
    }

    async fn fetch(&self, window: SyncWindow) -> SyncResult<Vec<PriceCandle>> {
        let candles: Vec<PriceCandle> = self
            .api
            .get_json(&self.path(), &self.query(&window))
            .await?;
        debug!(
            symbol = %self.symbol,
            interval = %self.interval,
            window = %window,
            count = candles.len(),
            "Fetched candles"
        );
        Ok(candles)
    }
}
