//! Local cache persistence
//!
//! Keeps, per feed, the last merged record sequence and the fingerprint it
//! was synced under. Missing or corrupt entries read back as a cold cache.

mod store;

pub use store::{CacheStore, JsonFileStore, MemoryStore};

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::SyncResult;
use crate::types::{FeedKind, Fingerprint, Record};

/// Cached state of one feed
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<R> {
    pub records: Vec<R>,
    pub fingerprint: Option<Fingerprint>,
}

impl<R> Default for CacheEntry<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            fingerprint: None,
        }
    }
}

impl<R> CacheEntry<R> {
    pub fn new(records: Vec<R>, fingerprint: Option<Fingerprint>) -> Self {
        Self {
            records,
            fingerprint,
        }
    }

    /// No records cached, the next window starts at the horizon
    pub fn is_cold(&self) -> bool {
        self.records.is_empty()
    }
}

/// Typed view over a [`CacheStore`], one entry per feed
#[derive(Clone)]
pub struct LocalCache {
    store: Arc<dyn CacheStore>,
}

impl LocalCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Read a feed's entry, degrading to a cold entry on any failure
    pub fn read<R: Record>(&self, feed: FeedKind) -> CacheEntry<R> {
        let fingerprint = match self.store.get(feed.fingerprint_key()) {
            Ok(Some(token)) if !token.trim().is_empty() => Some(Fingerprint::new(token)),
            Ok(_) => None,
            Err(e) => {
                warn!(feed = %feed, error = %e, "Fingerprint unreadable, treating cache as cold");
                return CacheEntry::default();
            }
        };

        let records = match self.store.get(feed.data_key()) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<R>>(&raw) {
                Ok(records) => records,
                Err(e) => {
                    warn!(feed = %feed, error = %e, "Cached records corrupt, treating cache as cold");
                    return CacheEntry::default();
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(feed = %feed, error = %e, "Cached records unreadable, treating cache as cold");
                return CacheEntry::default();
            }
        };

        debug!(
            feed = %feed,
            records = records.len(),
            fingerprint = ?fingerprint,
            "Cache entry loaded"
        );
        CacheEntry::new(records, fingerprint)
    }

    /// Overwrite a feed's whole entry
    pub fn write<R: Record>(&self, feed: FeedKind, entry: &CacheEntry<R>) -> SyncResult<()> {
        self.write_records(feed, &entry.records)?;
        match &entry.fingerprint {
            Some(fingerprint) => self.write_fingerprint(feed, fingerprint),
            None => self.store.remove(feed.fingerprint_key()),
        }
    }

    pub fn write_records<R: Record>(&self, feed: FeedKind, records: &[R]) -> SyncResult<()> {
        let json = serde_json::to_string(records)?;
        self.store.set(feed.data_key(), &json)
    }

    pub fn write_fingerprint(&self, feed: FeedKind, fingerprint: &Fingerprint) -> SyncResult<()> {
        self.store.set(feed.fingerprint_key(), fingerprint.as_str())
    }

    /// Drop the cached records but keep the fingerprint
    pub fn clear_records(&self, feed: FeedKind) -> SyncResult<()> {
        self.store.remove(feed.data_key())
    }

    /// Drop both records and fingerprint; the next cycle cold-starts
    pub fn clear(&self, feed: FeedKind) -> SyncResult<()> {
        self.store.remove(feed.data_key())?;
        self.store.remove(feed.fingerprint_key())?;
        info!(feed = %feed, "🧹 Local cache cleared");
        Ok(())
    }
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PriceCandle;
    use serde_json::Map;

    fn candle(open_time: &str, close: f64) -> PriceCandle {
        PriceCandle {
            open_time: open_time.to_string(),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close,
            volume: 3.0,
            extra: Map::new(),
        }
    }

    fn cache_with_store() -> (LocalCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (LocalCache::new(store.clone()), store)
    }

    #[test]
    fn missing_entry_reads_as_cold() {
        let (cache, _) = cache_with_store();
        let entry: CacheEntry<PriceCandle> = cache.read(FeedKind::Prices);
        assert!(entry.is_cold());
        assert_eq!(entry.fingerprint, None);
    }

    #[test]
    fn write_then_read_returns_same_entry() {
        let (cache, _) = cache_with_store();
        let entry = CacheEntry::new(
            vec![candle("2025-08-09T10:00:00", 1.5), candle("2025-08-09T11:00:00", 1.6)],
            Some(Fingerprint::from("abc")),
        );
        cache.write(FeedKind::Prices, &entry).unwrap();

        let back: CacheEntry<PriceCandle> = cache.read(FeedKind::Prices);
        assert_eq!(back, entry);
    }

    #[test]
    fn corrupt_records_read_as_cold_start() {
        let (cache, store) = cache_with_store();
        store.set("pricesData", "{not json").unwrap();
        store.set("lastPricesFingerprint", "abc").unwrap();

        let entry: CacheEntry<PriceCandle> = cache.read(FeedKind::Prices);
        assert!(entry.is_cold());
        assert_eq!(entry.fingerprint, None);
    }

    #[test]
    fn clear_removes_records_and_fingerprint_for_one_feed_only() {
        let (cache, store) = cache_with_store();
        let entry = CacheEntry::new(vec![candle("t1", 1.0)], Some(Fingerprint::from("abc")));
        cache.write(FeedKind::Prices, &entry).unwrap();
        store.set("trlData", "[]").unwrap();

        cache.clear(FeedKind::Prices).unwrap();

        assert_eq!(store.get("pricesData").unwrap(), None);
        assert_eq!(store.get("lastPricesFingerprint").unwrap(), None);
        assert_eq!(store.get("trlData").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn clear_records_keeps_fingerprint() {
        let (cache, _) = cache_with_store();
        let entry = CacheEntry::new(vec![candle("t1", 1.0)], Some(Fingerprint::from("xyz")));
        cache.write(FeedKind::Prices, &entry).unwrap();

        cache.clear_records(FeedKind::Prices).unwrap();

        let back: CacheEntry<PriceCandle> = cache.read(FeedKind::Prices);
        assert!(back.is_cold());
        assert_eq!(back.fingerprint, Some(Fingerprint::from("xyz")));
    }
}
