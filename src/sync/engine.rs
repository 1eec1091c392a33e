//! One feed's read-check-fetch-merge-publish cycle

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::merge::{merge_records, MergePolicy};
use crate::error::SyncResult;
use crate::fetch::DeltaFetcher;
use crate::oracle::FingerprintOracle;
use crate::persistence::{CacheEntry, LocalCache};
use crate::types::{FeedKind, Fingerprint, Record, SyncWindow, DEFAULT_HORIZON_DAYS};

/// Generation counter shared by a runner and its handles.
///
/// Advancing it makes every outstanding [`CycleToken`] stale.
#[derive(Debug, Clone, Default)]
pub struct Liveness {
    generation: Arc<AtomicU64>,
}

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CycleToken {
        CycleToken {
            generation: Some(self.generation.clone()),
            issued: self.generation.load(Ordering::SeqCst),
        }
    }

    /// Returns the new generation
    pub fn advance(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Permission for one cycle to write and publish
#[derive(Debug, Clone)]
pub struct CycleToken {
    generation: Option<Arc<AtomicU64>>,
    issued: u64,
}

impl CycleToken {
    /// Token that never goes stale, for one-off cycles
    pub fn detached() -> Self {
        Self {
            generation: None,
            issued: 0,
        }
    }

    pub fn is_live(&self) -> bool {
        match &self.generation {
            Some(generation) => generation.load(Ordering::SeqCst) == self.issued,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Nothing cached, window starts at the horizon
    Cold,
    /// Cached records present, window resumes at the last one
    Warm,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheState::Cold => write!(f, "cold"),
            CacheState::Warm => write!(f, "warm"),
        }
    }
}

/// What a completed cycle did
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub feed: FeedKind,
    pub state: CacheState,
    pub window: SyncWindow,
    /// Fingerprint in force after the cycle
    pub fingerprint: Option<Fingerprint>,
    /// False when the oracle could not be read this cycle
    pub fingerprint_refreshed: bool,
    pub invalidated: bool,
    pub fetch_failed: bool,
    pub fetched: usize,
    pub added: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle of the same engine was still in flight
    Skipped,
    /// The cycle token went stale; nothing was written or published
    Abandoned,
}

/// Clears the in-flight flag even when the cycle future is dropped
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Incremental synchronizer for one feed
pub struct SyncEngine<R: Record> {
    feed: FeedKind,
    cache: LocalCache,
    oracle: Arc<dyn FingerprintOracle>,
    fetcher: Arc<dyn DeltaFetcher<R>>,
    horizon: Duration,
    policy: MergePolicy,
    in_flight: AtomicBool,
    published: watch::Sender<Arc<Vec<R>>>,
}

impl<R: Record> SyncEngine<R> {
    pub fn new(
        cache: LocalCache,
        oracle: Arc<dyn FingerprintOracle>,
        fetcher: Arc<dyn DeltaFetcher<R>>,
    ) -> Self {
        let (published, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            feed: fetcher.feed(),
            cache,
            oracle,
            fetcher,
            horizon: Duration::days(DEFAULT_HORIZON_DAYS),
            policy: MergePolicy::default(),
            in_flight: AtomicBool::new(false),
            published,
        }
    }

    pub fn with_horizon(mut self, horizon: Duration) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn feed(&self) -> FeedKind {
        self.feed
    }

    pub fn horizon(&self) -> Duration {
        self.horizon
    }

    /// Receiver of every published dataset
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<R>>> {
        self.published.subscribe()
    }

    /// Last published dataset
    pub fn latest(&self) -> Arc<Vec<R>> {
        self.published.borrow().clone()
    }

    /// Publish whatever the cache holds, before any network round trip
    pub fn preload(&self) -> usize {
        let entry = self.cache.read::<R>(self.feed);
        let count = entry.records.len();
        if count > 0 {
            self.published.send_replace(Arc::new(entry.records));
            debug!(feed = %self.feed, records = count, "Cached dataset preloaded");
        }
        count
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Forget this feed's cached records and fingerprint
    pub fn clear_cache(&self) -> SyncResult<()> {
        self.cache.clear(self.feed)
    }

    /// Run one cycle that cannot be cancelled
    pub async fn run_once(&self) -> CycleOutcome {
        self.run_cycle(&CycleToken::detached()).await
    }

    pub async fn run_cycle(&self, token: &CycleToken) -> CycleOutcome {
        self.run_cycle_at(Utc::now(), token).await
    }

    /// Run one cycle with `now` as the window end
    pub async fn run_cycle_at(&self, now: DateTime<Utc>, token: &CycleToken) -> CycleOutcome {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!(feed = %self.feed, "Cycle already in flight, skipping");
            return CycleOutcome::Skipped;
        };

        let CacheEntry {
            mut records,
            fingerprint: cached_fingerprint,
        } = self.cache.read::<R>(self.feed);

        let (fingerprint, refreshed) = match self.oracle.current().await {
            Ok(current) => (Some(current), true),
            Err(e) => {
                warn!(
                    feed = %self.feed,
                    error = %e,
                    "Fingerprint unavailable, keeping cached fingerprint"
                );
                (cached_fingerprint.clone(), false)
            }
        };

        if !token.is_live() {
            debug!(feed = %self.feed, "Cycle abandoned after fingerprint check");
            return CycleOutcome::Abandoned;
        }

        let mut invalidated = false;
        if refreshed {
            if let (Some(previous), Some(current)) = (&cached_fingerprint, &fingerprint) {
                if previous != current {
                    info!(
                        feed = %self.feed,
                        previous = %previous,
                        current = %current,
                        discarded = records.len(),
                        "♻️ Upstream fingerprint changed, invalidating cache"
                    );
                    records.clear();
                    invalidated = true;
                    if let Err(e) = self.cache.clear_records(self.feed) {
                        warn!(feed = %self.feed, error = %e, "Failed to clear cached records");
                    }
                }
            }
            if let Some(current) = &fingerprint {
                if let Err(e) = self.cache.write_fingerprint(self.feed, current) {
                    warn!(feed = %self.feed, error = %e, "Failed to persist fingerprint");
                }
            }
        }

        let (state, window) = self.window_for(&records, now);

        let (fetched, fetch_failed) = match self.fetcher.fetch(window).await {
            Ok(fetched) => (fetched, false),
            Err(e) => {
                warn!(
                    feed = %self.feed,
                    window = %window,
                    error = %e,
                    "Delta fetch failed, no new data this cycle"
                );
                (Vec::new(), true)
            }
        };

        if !token.is_live() {
            debug!(feed = %self.feed, "Cycle abandoned after delta fetch");
            return CycleOutcome::Abandoned;
        }

        let fetched_count = fetched.len();
        let merged = merge_records(records, fetched, self.policy);

        if !merged.records.is_empty() {
            if let Err(e) = self.cache.write_records(self.feed, &merged.records) {
                warn!(feed = %self.feed, error = %e, "Failed to persist merged records");
            }
        }

        let total = merged.records.len();
        self.published.send_replace(Arc::new(merged.records));

        debug!(
            feed = %self.feed,
            state = %state,
            fetched = fetched_count,
            added = merged.added,
            replaced = merged.replaced,
            total,
            "Dataset published"
        );

        CycleOutcome::Completed(CycleReport {
            feed: self.feed,
            state,
            window,
            fingerprint,
            fingerprint_refreshed: refreshed,
            invalidated,
            fetch_failed,
            fetched: fetched_count,
            added: merged.added,
            total,
        })
    }

    fn window_for(&self, records: &[R], now: DateTime<Utc>) -> (CacheState, SyncWindow) {
        let Some(last) = records.last() else {
            return (CacheState::Cold, SyncWindow::cold(now, self.horizon));
        };
        match last.timestamp() {
            Some(ts) => (CacheState::Warm, SyncWindow::resume(ts, now)),
            None => {
                warn!(
                    feed = %self.feed,
                    key = %last.key(),
                    "Last cached record has no usable timestamp, resyncing from horizon"
                );
                (CacheState::Warm, SyncWindow::cold(now, self.horizon))
            }
        }
    }
}

impl<R: Record> fmt::Debug for SyncEngine<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("feed", &self.feed)
            .field("horizon_days", &self.horizon.num_days())
            .field("policy", &self.policy)
            .field("in_flight", &self.is_in_flight())
            .finish()
    }
}
