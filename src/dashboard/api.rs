//! Dashboard HTTP API
//!
//! REST endpoints for the dashboard frontend.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use super::types::*;
use super::DashboardMemory;
use crate::sync::SyncCommand;
use crate::types::FeedKind;

/// Create the API router with all endpoints
pub fn create_router(memory: Arc<DashboardMemory>) -> Router {
    Router::new()
        // Datasets
        .route("/api/feeds/prices", get(get_prices))
        .route("/api/feeds/trl", get(get_trl))
        .route("/api/feeds/dag", get(get_dag_events))
        .route("/api/dag/runs", get(get_dag_runs))
        // Commands
        .route("/api/feeds/:feed/reload", post(reload_feed))
        .route("/api/feeds/:feed/clear", post(clear_feed))
        .route("/api/health", get(get_health))
        // State
        .with_state(memory)
        // CORS for frontend
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<()>::error(msg))).into_response()
}

fn disabled(feed: FeedKind) -> Response {
    error_response(StatusCode::NOT_FOUND, format!("feed {} is disabled", feed))
}

// ─────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PricesQuery {
    overlay: Option<bool>,
}

/// GET /api/feeds/prices?overlay=true - Candles, optionally with TRL news attached
async fn get_prices(
    Query(query): Query<PricesQuery>,
    State(memory): State<Arc<DashboardMemory>>,
) -> Response {
    let Some(prices) = &memory.handles.prices else {
        return disabled(FeedKind::Prices);
    };
    if query.overlay.unwrap_or(false) {
        let annotated = memory.annotated_prices();
        return Json(ApiResponse::success(FeedSnapshot::new(FeedKind::Prices, annotated)))
            .into_response();
    }
    let records = prices.dataset().as_ref().clone();
    Json(ApiResponse::success(FeedSnapshot::new(FeedKind::Prices, records))).into_response()
}

/// GET /api/feeds/trl - Scored news items
async fn get_trl(State(memory): State<Arc<DashboardMemory>>) -> Response {
    match &memory.handles.trl {
        Some(trl) => {
            let records = trl.dataset().as_ref().clone();
            Json(ApiResponse::success(FeedSnapshot::new(FeedKind::Trl, records))).into_response()
        }
        None => disabled(FeedKind::Trl),
    }
}

/// GET /api/feeds/dag - Raw pipeline task events
async fn get_dag_events(State(memory): State<Arc<DashboardMemory>>) -> Response {
    match &memory.handles.dag {
        Some(dag) => {
            let records = dag.dataset().as_ref().clone();
            Json(ApiResponse::success(FeedSnapshot::new(FeedKind::DagEvents, records)))
                .into_response()
        }
        None => disabled(FeedKind::DagEvents),
    }
}

#[derive(Debug, Deserialize)]
struct RunsQuery {
    limit: Option<usize>,
}

/// GET /api/dag/runs?limit=5 - Latest runs, newest first
async fn get_dag_runs(
    Query(query): Query<RunsQuery>,
    State(memory): State<Arc<DashboardMemory>>,
) -> Response {
    if memory.handles.dag.is_none() {
        return disabled(FeedKind::DagEvents);
    }
    let limit = query.limit.unwrap_or(memory.last_runs);
    if limit == 0 || limit > 100 {
        return error_response(StatusCode::BAD_REQUEST, "limit must be between 1 and 100");
    }
    Json(ApiResponse::success(memory.runs(limit))).into_response()
}

/// POST /api/feeds/:feed/reload - Immediate cycle, cache kept
async fn reload_feed(
    Path(feed): Path<String>,
    State(memory): State<Arc<DashboardMemory>>,
) -> Response {
    send_command(&memory, &feed, SyncCommand::Reload).await
}

/// POST /api/feeds/:feed/clear - Drop the feed's cache, then cold cycle
async fn clear_feed(
    Path(feed): Path<String>,
    State(memory): State<Arc<DashboardMemory>>,
) -> Response {
    send_command(&memory, &feed, SyncCommand::ClearCache).await
}

async fn send_command(memory: &DashboardMemory, raw: &str, command: SyncCommand) -> Response {
    let Some(feed) = FeedKind::from_str(raw) else {
        return error_response(StatusCode::NOT_FOUND, format!("unknown feed {}", raw));
    };
    match memory.handles.send(feed, command).await {
        None => disabled(feed),
        Some(true) => {
            info!(feed = %feed, command = ?command, "🖥️ Command from dashboard");
            (
                StatusCode::ACCEPTED,
                Json(ApiResponse::success(CommandResponse::new(feed, command, true))),
            )
                .into_response()
        }
        Some(false) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("feed {} runner is not running", feed),
        ),
    }
}

/// GET /api/health - Enabled feeds and dataset sizes
async fn get_health(State(memory): State<Arc<DashboardMemory>>) -> impl IntoResponse {
    Json(ApiResponse::success(memory.health()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::FeedHandles;
    use crate::error::SyncResult;
    use crate::fetch::DeltaFetcher;
    use crate::oracle::MockFingerprintOracle;
    use crate::persistence::{LocalCache, MemoryStore};
    use crate::sync::{FeedHandle, FeedRunner, SyncEngine};
    use crate::types::{DagEvent, PriceCandle, Record, SyncWindow, TaskStatus, TrlEvent};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Map, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    struct Idle(FeedKind);

    #[async_trait]
    impl<R: Record> DeltaFetcher<R> for Idle {
        fn feed(&self) -> FeedKind {
            self.0
        }

        async fn fetch(&self, _window: SyncWindow) -> SyncResult<Vec<R>> {
            Ok(Vec::new())
        }
    }

    /// Handle over a preloaded, not yet running feed; the runner is returned
    /// so its command queue stays open
    fn preloaded<R: Record>(feed: FeedKind, records: Vec<R>) -> (FeedHandle<R>, FeedRunner<R>) {
        let cache = LocalCache::new(Arc::new(MemoryStore::new()));
        cache.write_records(feed, &records).unwrap();
        let engine = SyncEngine::new(cache, Arc::new(MockFingerprintOracle::new()), Arc::new(Idle(feed)));
        engine.preload();
        let (runner, handle) = FeedRunner::new(engine, Duration::from_secs(60));
        (handle, runner)
    }

    fn candle(open_time: &str) -> PriceCandle {
        PriceCandle {
            open_time: open_time.to_string(),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 12.0,
            extra: Map::new(),
        }
    }

    fn news(date: &str) -> TrlEvent {
        TrlEvent {
            date: date.to_string(),
            link: "https://news/1".to_string(),
            trl_1: Some(0.7),
            trl_2: Some(0.2),
            trl_3: None,
            price_change: Some(1.5),
            extra: Map::new(),
        }
    }

    fn dag_event(task: &str, created_at: &str, status: TaskStatus) -> DagEvent {
        DagEvent {
            run_id: "scheduled__2025-10-01T00:00:00".to_string(),
            task_name: task.to_string(),
            dag_name: None,
            status,
            start_time: None,
            end_time: None,
            created_at: created_at.to_string(),
            message: None,
            model_name: None,
            event_type: None,
        }
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn prices_with_overlay_carry_news() {
        let (prices, _prices_runner) = preloaded(
            FeedKind::Prices,
            vec![candle("2025-10-01T00:00:00"), candle("2025-10-01T01:00:00")],
        );
        let (trl, _trl_runner) = preloaded(FeedKind::Trl, vec![news("2025-10-01T00:50:00")]);
        let memory = Arc::new(DashboardMemory::new(FeedHandles {
            prices: Some(prices),
            trl: Some(trl),
            dag: None,
        }));

        let (status, plain) = call(create_router(memory.clone()), "GET", "/api/feeds/prices").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(plain["data"]["count"], 2);
        assert!(plain["data"]["records"][0].get("news").is_none());

        let (_, overlaid) = call(create_router(memory), "GET", "/api/feeds/prices?overlay=true").await;
        assert_eq!(overlaid["data"]["records"][0]["news"], Value::Null);
        assert_eq!(overlaid["data"]["records"][1]["news"]["link"], "https://news/1");
    }

    #[tokio::test]
    async fn disabled_feed_is_not_found() {
        let memory = Arc::new(DashboardMemory::new(FeedHandles::default()));

        let (status, body) = call(create_router(memory.clone()), "GET", "/api/feeds/trl").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "feed trl is disabled");

        let (status, _) = call(create_router(memory), "POST", "/api/feeds/prices/reload").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dag_runs_include_graph_and_links() {
        let (dag, _runner) = preloaded(
            FeedKind::DagEvents,
            vec![
                dag_event("pre_train_dataset", "2025-10-01T00:00:00", TaskStatus::Running),
                dag_event("pre_train_dataset", "2025-10-01T00:30:00", TaskStatus::Success),
                dag_event("flush_and_init", "2025-10-01T00:31:00", TaskStatus::Running),
            ],
        );
        let memory = Arc::new(DashboardMemory::new(FeedHandles {
            dag: Some(dag),
            ..FeedHandles::default()
        }));

        let (status, body) = call(create_router(memory), "GET", "/api/dag/runs").await;

        assert_eq!(status, StatusCode::OK);
        let run = &body["data"][0];
        assert_eq!(run["run_id"], "scheduled__2025-10-01T00:00:00");
        assert_eq!(run["tasks"][0]["duration_minutes"], 30.0);
        assert_eq!(run["tasks"][1]["progress"], 0.5);
        assert_eq!(
            run["links"],
            json!([{ "id": 1, "source": 1, "target": 2, "type": "0" }])
        );
        let train = run["graph"]
            .as_array()
            .unwrap()
            .iter()
            .find(|n| n["id"] == "vast_ai_train")
            .unwrap();
        assert_eq!(train["status"], "NOT STARTED");
    }

    #[tokio::test]
    async fn commands_are_accepted_until_runner_stops() {
        let (dag, runner) = preloaded::<DagEvent>(FeedKind::DagEvents, Vec::new());
        let memory = Arc::new(DashboardMemory::new(FeedHandles {
            dag: Some(dag),
            ..FeedHandles::default()
        }));

        let (status, body) = call(create_router(memory.clone()), "POST", "/api/feeds/dag/clear").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["data"]["command"], "clearcache");
        assert_eq!(body["data"]["feed"], "dag_events");

        drop(runner);
        let (status, _) = call(create_router(memory.clone()), "POST", "/api/feeds/dag/reload").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = call(create_router(memory), "POST", "/api/feeds/weather/reload").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_reports_every_feed() {
        let (trl, _runner) = preloaded(FeedKind::Trl, vec![news("2025-10-01T00:00:00")]);
        let memory = Arc::new(DashboardMemory::new(FeedHandles {
            trl: Some(trl),
            ..FeedHandles::default()
        }));

        let (status, body) = call(create_router(memory), "GET", "/api/health").await;

        assert_eq!(status, StatusCode::OK);
        let feeds = body["data"]["feeds"].as_array().unwrap();
        assert_eq!(feeds.len(), 3);
        assert_eq!(feeds[1], json!({ "feed": "trl", "enabled": true, "records": 1 }));
        assert_eq!(feeds[0]["enabled"], false);
    }
}
