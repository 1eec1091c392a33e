//! Per-feed scheduler
//!
//! Runs a cycle at startup, on every poll tick and on demand. Commands
//! arriving mid-cycle abandon it: the handle advances the generation so the
//! cycle can no longer write, and the runner drops the cycle future.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::engine::{CycleOutcome, Liveness, SyncEngine};
use crate::types::{FeedKind, Record};

const COMMAND_QUEUE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    /// Run a cycle now, keeping the cache
    Reload,
    /// Clear the feed's cache, then run a cold cycle
    ClearCache,
    Shutdown,
}

/// Control side of a running feed, cheap to clone
#[derive(Debug, Clone)]
pub struct FeedHandle<R: Record> {
    feed: FeedKind,
    commands: mpsc::Sender<SyncCommand>,
    liveness: Liveness,
    dataset: watch::Receiver<Arc<Vec<R>>>,
}

impl<R: Record> FeedHandle<R> {
    pub fn feed(&self) -> FeedKind {
        self.feed
    }

    /// Returns false once the runner has stopped
    pub async fn reload(&self) -> bool {
        self.send(SyncCommand::Reload).await
    }

    pub async fn clear_cache(&self) -> bool {
        self.send(SyncCommand::ClearCache).await
    }

    pub async fn shutdown(&self) -> bool {
        self.send(SyncCommand::Shutdown).await
    }

    async fn send(&self, command: SyncCommand) -> bool {
        // Stale any in-flight cycle before the runner even sees the command
        self.liveness.advance();
        self.commands.send(command).await.is_ok()
    }

    /// Last published dataset
    pub fn dataset(&self) -> Arc<Vec<R>> {
        self.dataset.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<R>>> {
        self.dataset.clone()
    }
}

pub struct FeedRunner<R: Record> {
    engine: SyncEngine<R>,
    poll_interval: Duration,
    commands: mpsc::Receiver<SyncCommand>,
    liveness: Liveness,
}

impl<R: Record> FeedRunner<R> {
    pub fn new(engine: SyncEngine<R>, poll_interval: Duration) -> (Self, FeedHandle<R>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let liveness = Liveness::new();
        let handle = FeedHandle {
            feed: engine.feed(),
            commands: tx,
            liveness: liveness.clone(),
            dataset: engine.subscribe(),
        };
        let runner = Self {
            engine,
            poll_interval,
            commands: rx,
            liveness,
        };
        (runner, handle)
    }

    /// Spawn the runner on the current tokio runtime
    pub fn spawn(engine: SyncEngine<R>, poll_interval: Duration) -> (FeedHandle<R>, JoinHandle<()>) {
        let (runner, handle) = Self::new(engine, poll_interval);
        let task = tokio::spawn(runner.run());
        (handle, task)
    }

    pub async fn run(mut self) {
        let feed = self.engine.feed();
        info!(
            feed = %feed,
            poll_secs = self.poll_interval.as_secs(),
            "🔄 Feed runner started"
        );
        self.engine.preload();

        // First tick fires immediately: the startup cycle
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut pending: Option<SyncCommand> = None;

        loop {
            let command = match pending.take() {
                Some(command) => Some(command),
                None => tokio::select! {
                    _ = ticker.tick() => None,
                    command = self.commands.recv() => Some(command.unwrap_or(SyncCommand::Shutdown)),
                },
            };

            match command {
                Some(SyncCommand::Shutdown) => break,
                Some(SyncCommand::ClearCache) => {
                    if let Err(e) = self.engine.clear_cache() {
                        warn!(feed = %feed, error = %e, "Failed to clear cache");
                    }
                }
                Some(SyncCommand::Reload) | None => {}
            }
            if let Some(command) = command {
                debug!(feed = %feed, command = ?command, "Manual trigger");
                ticker.reset();
            }

            let token = self.liveness.token();
            let cycle = self.engine.run_cycle(&token);
            tokio::pin!(cycle);

            tokio::select! {
                outcome = &mut cycle => log_outcome(feed, &outcome),
                command = self.commands.recv() => {
                    debug!(feed = %feed, "In-flight cycle abandoned");
                    pending = Some(command.unwrap_or(SyncCommand::Shutdown));
                }
            }
        }

        self.liveness.advance();
        info!(feed = %feed, "Feed runner stopped");
    }
}

fn log_outcome(feed: FeedKind, outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Completed(report) => info!(
            feed = %feed,
            state = %report.state,
            invalidated = report.invalidated,
            fetched = report.fetched,
            added = report.added,
            total = report.total,
            "✅ Sync cycle complete"
        ),
        CycleOutcome::Skipped => debug!(feed = %feed, "Sync cycle skipped"),
        CycleOutcome::Abandoned => debug!(feed = %feed, "Sync cycle abandoned"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::CacheStore;
    use crate::sync::testing::*;
    use crate::types::{DagEvent, TaskStatus};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);
    const HOURLY: Duration = Duration::from_secs(3600);

    async fn next_dataset(rx: &mut watch::Receiver<Arc<Vec<DagEvent>>>) -> Arc<Vec<DagEvent>> {
        timeout(WAIT, rx.changed())
            .await
            .expect("dataset should be published")
            .expect("runner alive");
        rx.borrow_and_update().clone()
    }

    #[tokio::test]
    async fn startup_cycle_publishes_then_reload_appends() {
        let (cache, _) = memory_cache();
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .then_ok(vec![event("2025-10-01T00:00:00", TaskStatus::Success)])
                .then_ok(vec![event("2025-10-02T00:00:00", TaskStatus::Running)]),
        );
        let engine = SyncEngine::new(cache, Arc::new(oracle_sequence(&["abc"])), fetcher.clone());
        let (handle, task) = FeedRunner::spawn(engine, HOURLY);
        let mut rx = handle.subscribe();

        let first = next_dataset(&mut rx).await;
        assert_eq!(created(&first), vec!["2025-10-01T00:00:00"]);

        assert!(handle.reload().await);
        let second = next_dataset(&mut rx).await;
        assert_eq!(
            created(&second),
            vec!["2025-10-01T00:00:00", "2025-10-02T00:00:00"]
        );
        assert_eq!(fetcher.windows()[1].start_param(), "2025-10-01T00:00:00");

        assert!(handle.shutdown().await);
        timeout(WAIT, task).await.unwrap().unwrap();
        assert!(!handle.reload().await);
    }

    #[tokio::test]
    async fn clear_cache_command_cold_starts_next_cycle() {
        let (cache, store) = memory_cache();
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .then_ok(vec![event("2025-10-01T00:00:00", TaskStatus::Success)])
                .then_ok(vec![event("2025-10-03T00:00:00", TaskStatus::Success)]),
        );
        let engine = SyncEngine::new(cache, Arc::new(oracle_sequence(&["abc"])), fetcher.clone())
            .with_horizon(chrono::Duration::days(7));
        let (handle, task) = FeedRunner::spawn(engine, HOURLY);
        let mut rx = handle.subscribe();
        next_dataset(&mut rx).await;

        assert!(handle.clear_cache().await);
        let after = next_dataset(&mut rx).await;

        assert_eq!(created(&after), vec!["2025-10-03T00:00:00"]);
        let windows = fetcher.windows();
        assert_eq!(windows[1].end - windows[1].start, chrono::Duration::days(7));
        assert!(store.get("dagEventsData").unwrap().is_some());

        handle.shutdown().await;
        timeout(WAIT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn reload_during_slow_fetch_abandons_the_stale_cycle() {
        let (cache, _) = memory_cache();
        let fetcher = Arc::new(GatedFetcher::new(vec![event(
            "2025-10-02T00:00:00",
            TaskStatus::Success,
        )]));
        let engine = SyncEngine::new(cache, Arc::new(oracle_sequence(&["abc"])), fetcher.clone());
        let (handle, task) = FeedRunner::spawn(engine, HOURLY);
        let mut rx = handle.subscribe();

        // wait until the startup cycle is parked inside the fetcher
        timeout(WAIT, async {
            while fetcher.calls() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert!(handle.reload().await);
        let published = next_dataset(&mut rx).await;

        assert_eq!(created(&published), vec!["2025-10-02T00:00:00"]);
        assert_eq!(fetcher.calls(), 2);

        handle.shutdown().await;
        timeout(WAIT, task).await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn poll_interval_drives_the_next_cycle() {
        let (cache, _) = memory_cache();
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .then_ok(vec![event("2025-10-01T00:00:00", TaskStatus::Success)])
                .then_ok(vec![event("2025-10-02T00:00:00", TaskStatus::Success)]),
        );
        let engine = SyncEngine::new(cache, Arc::new(oracle_sequence(&["abc"])), fetcher.clone());
        let poll = Duration::from_secs(60);
        let started = tokio::time::Instant::now();
        let (handle, task) = FeedRunner::spawn(engine, poll);
        let mut rx = handle.subscribe();

        next_dataset(&mut rx).await;
        assert_eq!(fetcher.windows().len(), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;
        assert_eq!(fetcher.windows().len(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        let second = next_dataset(&mut rx).await;

        assert!(started.elapsed() >= poll);
        assert_eq!(
            created(&second),
            vec!["2025-10-01T00:00:00", "2025-10-02T00:00:00"]
        );
        let windows = fetcher.windows();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].start_param(), "2025-10-01T00:00:00");

        handle.shutdown().await;
        timeout(WAIT, task).await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn tick_during_in_flight_fetch_starts_no_second_fetch() {
        let (cache, _) = memory_cache();
        let fetcher = Arc::new(GatedFetcher::new(vec![event(
            "2025-10-02T00:00:00",
            TaskStatus::Success,
        )]));
        let gate = fetcher.gate.clone();
        let engine = SyncEngine::new(cache, Arc::new(oracle_sequence(&["abc"])), fetcher.clone());
        let (handle, task) = FeedRunner::spawn(engine, Duration::from_secs(60));
        let mut rx = handle.subscribe();

        timeout(WAIT, async {
            while fetcher.calls() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        // several poll intervals elapse while the startup fetch is parked
        tokio::time::advance(Duration::from_secs(150)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(fetcher.calls(), 1);
        assert!(handle.dataset().is_empty());

        gate.notify_one();
        let published = next_dataset(&mut rx).await;
        assert_eq!(created(&published), vec!["2025-10-02T00:00:00"]);

        // missed ticks collapse into one catch-up cycle
        timeout(WAIT, async {
            while fetcher.calls() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        handle.shutdown().await;
        timeout(WAIT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn dropping_every_handle_stops_the_runner() {
        let (cache, _) = memory_cache();
        let engine = SyncEngine::new(
            cache,
            Arc::new(oracle_sequence(&["abc"])),
            Arc::new(ScriptedFetcher::new()),
        );
        let (handle, task) = FeedRunner::spawn(engine, HOURLY);
        drop(handle);

        timeout(WAIT, task).await.unwrap().unwrap();
    }
}
