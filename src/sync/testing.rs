//! Fakes shared by the engine and runner tests

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::error::{SyncError, SyncResult};
use crate::fetch::DeltaFetcher;
use crate::oracle::MockFingerprintOracle;
use crate::persistence::{LocalCache, MemoryStore};
use crate::types::{DagEvent, FeedKind, Fingerprint, SyncWindow, TaskStatus};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 4, 12, 0, 0).unwrap()
}

pub fn event(created_at: &str, status: TaskStatus) -> DagEvent {
    DagEvent {
        run_id: "scheduled__2025-10-04T00:00:00".to_string(),
        task_name: "vast_ai_train".to_string(),
        dag_name: Some("training_pipeline".to_string()),
        status,
        start_time: None,
        end_time: None,
        created_at: created_at.to_string(),
        message: None,
        model_name: None,
        event_type: None,
    }
}

pub fn created(records: &[DagEvent]) -> Vec<&str> {
    records.iter().map(|r| r.created_at.as_str()).collect()
}

pub fn memory_cache() -> (LocalCache, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (LocalCache::new(store.clone()), store)
}

pub fn http_down() -> SyncError {
    SyncError::Status {
        status: 503,
        url: "http://backend/test".to_string(),
    }
}

/// Oracle returning the given tokens in order, repeating the last one
pub fn oracle_sequence(tokens: &[&str]) -> MockFingerprintOracle {
    let tokens: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    let mut calls = 0usize;
    let mut oracle = MockFingerprintOracle::new();
    oracle.expect_current().returning(move || {
        let idx = calls.min(tokens.len().saturating_sub(1));
        calls += 1;
        Ok(Fingerprint::new(tokens[idx].clone()))
    });
    oracle
}

pub fn failing_oracle() -> MockFingerprintOracle {
    let mut oracle = MockFingerprintOracle::new();
    oracle.expect_current().returning(|| Err(http_down()));
    oracle
}

/// Fetcher replaying scripted responses and recording requested windows
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<VecDeque<SyncResult<Vec<DagEvent>>>>,
    windows: Mutex<Vec<SyncWindow>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_ok(self, records: Vec<DagEvent>) -> Self {
        self.responses.lock().unwrap().push_back(Ok(records));
        self
    }

    pub fn then_err(self) -> Self {
        self.responses.lock().unwrap().push_back(Err(http_down()));
        self
    }

    pub fn windows(&self) -> Vec<SyncWindow> {
        self.windows.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeltaFetcher<DagEvent> for ScriptedFetcher {
    fn feed(&self) -> FeedKind {
        FeedKind::DagEvents
    }

    async fn fetch(&self, window: SyncWindow) -> SyncResult<Vec<DagEvent>> {
        self.windows.lock().unwrap().push(window);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Fetcher whose first call parks until released
pub struct GatedFetcher {
    pub gate: Arc<Notify>,
    pub calls: Mutex<usize>,
    pub records: Vec<DagEvent>,
}

impl GatedFetcher {
    pub fn new(records: Vec<DagEvent>) -> Self {
        Self {
            gate: Arc::new(Notify::new()),
            calls: Mutex::new(0),
            records,
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl DeltaFetcher<DagEvent> for GatedFetcher {
    fn feed(&self) -> FeedKind {
        FeedKind::DagEvents
    }

    async fn fetch(&self, _window: SyncWindow) -> SyncResult<Vec<DagEvent>> {
        let first = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls == 1
        };
        if first {
            self.gate.notified().await;
        }
        Ok(self.records.clone())
    }
}
