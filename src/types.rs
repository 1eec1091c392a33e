//! Core types used throughout the feed synchronizer
//!
//! Defines the feeds, their records, fingerprints and the sync window.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Default cold-start lookback (about six months)
pub const DEFAULT_HORIZON_DAYS: i64 = 182;
/// Longest accepted cold-start lookback
pub const MAX_HORIZON_DAYS: i64 = 3650;

/// Format of the `start`/`end` query parameters sent upstream
pub const QUERY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Independent record streams, each with its own cache entry and fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    Prices,
    Trl,
    DagEvents,
}

impl FeedKind {
    pub const ALL: [FeedKind; 3] = [FeedKind::Prices, FeedKind::Trl, FeedKind::DagEvents];

    /// Storage key holding the serialized record sequence
    pub fn data_key(&self) -> &'static str {
        match self {
            FeedKind::Prices => "pricesData",
            FeedKind::Trl => "trlData",
            FeedKind::DagEvents => "dagEventsData",
        }
    }

    /// Storage key holding the last seen fingerprint token
    pub fn fingerprint_key(&self) -> &'static str {
        match self {
            FeedKind::Prices => "lastPricesFingerprint",
            FeedKind::Trl => "lastTRLFingerprint",
            FeedKind::DagEvents => "lastDagEventsFingerprint",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "prices" | "price" => Some(FeedKind::Prices),
            "trl" => Some(FeedKind::Trl),
            "dag" | "dag_events" | "events" => Some(FeedKind::DagEvents),
            _ => None,
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedKind::Prices => write!(f, "prices"),
            FeedKind::Trl => write!(f, "trl"),
            FeedKind::DagEvents => write!(f, "dag_events"),
        }
    }
}

/// A data point of one feed.
///
/// `key` identifies the record for dedupe; `timestamp` is its temporal
/// position, used to resume the next sync window.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    fn key(&self) -> String;

    fn timestamp(&self) -> Option<DateTime<Utc>>;
}

/// Opaque token describing the upstream sync generation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Fingerprint {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl From<String> for Fingerprint {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Time range requested from a delta fetcher in one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    /// Window for an empty cache: the whole lookback horizon, saturating at
    /// the earliest representable instant
    pub fn cold(now: DateTime<Utc>, horizon: Duration) -> Self {
        Self {
            start: now.checked_sub_signed(horizon).unwrap_or(DateTime::<Utc>::MIN_UTC),
            end: now,
        }
    }

    /// Window resuming at the last known record (inclusive)
    pub fn resume(from: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            start: from,
            end: now,
        }
    }

    pub fn start_param(&self) -> String {
        self.start.format(QUERY_TIME_FORMAT).to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format(QUERY_TIME_FORMAT).to_string()
    }
}

impl fmt::Display for SyncWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} .. {}]", self.start_param(), self.end_param())
    }
}

/// Parse the timestamp shapes the backend emits.
///
/// Naive timestamps are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Hourly (or other interval) OHLCV candle with model prediction columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceCandle {
    pub open_time: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Per-model prediction columns (`tst_1`, `lightgbm_2`, ...) and any
    /// other field the backend adds
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PriceCandle {
    /// Prediction emitted by a model column, if present and numeric
    pub fn prediction(&self, column: &str) -> Option<f64> {
        self.extra.get(column).and_then(Value::as_f64)
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

impl Record for PriceCandle {
    fn key(&self) -> String {
        self.open_time.clone()
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.open_time)
    }
}

/// News item scored by the TRL models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrlEvent {
    pub date: String,
    pub link: String,
    pub trl_1: Option<f64>,
    pub trl_2: Option<f64>,
    pub trl_3: Option<f64>,
    pub price_change: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for TrlEvent {
    fn key(&self) -> String {
        self.link.clone()
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.date)
    }
}

/// Task state reported by the pipeline scheduler
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Success,
    Failed,
    Running,
    Skipped,
    /// Any status string not listed above, kept verbatim
    Other(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Skipped => "SKIPPED",
            TaskStatus::Other(s) => s,
        }
    }

    /// Gantt progress fraction
    pub fn progress(&self) -> f64 {
        match self {
            TaskStatus::Success => 1.0,
            TaskStatus::Running => 0.5,
            _ => 0.0,
        }
    }
}

impl From<String> for TaskStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "SUCCESS" => TaskStatus::Success,
            "FAILED" => TaskStatus::Failed,
            "RUNNING" => TaskStatus::Running,
            "SKIPPED" => TaskStatus::Skipped,
            _ => TaskStatus::Other(s),
        }
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task-status event from the training DAG
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagEvent {
    pub run_id: String,
    pub task_name: String,
    #[serde(default)]
    pub dag_name: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
}

impl Record for DagEvent {
    fn key(&self) -> String {
        format!("{}|{}|{}", self.run_id, self.task_name, self.created_at)
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.created_at)
    }
}
