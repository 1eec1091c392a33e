//! Dashboard API Types
//!
//! DTOs for HTTP communication with the dashboard frontend.

use serde::{Deserialize, Serialize};

use crate::dag::{DagRun, GanttLink, GraphNode};
use crate::sync::SyncCommand;
use crate::types::FeedKind;

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Last published dataset of one feed
#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot<T> {
    pub feed: FeedKind,
    pub count: usize,
    pub records: Vec<T>,
}

impl<T> FeedSnapshot<T> {
    pub fn new(feed: FeedKind, records: Vec<T>) -> Self {
        Self {
            feed,
            count: records.len(),
            records,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskResponse {
    pub task_name: String,
    pub status: String,
    pub event_type: Option<String>,
    pub message: Option<String>,
    pub model_name: Option<String>,
    pub start_time: String,
    pub end_time: Option<String>,
    pub duration_minutes: Option<f64>,
    pub progress: f64,
}

/// One run with its graph and gantt views
#[derive(Debug, Clone, Serialize)]
pub struct RunResponse {
    pub run_id: String,
    pub tasks: Vec<TaskResponse>,
    pub graph: Vec<GraphNode>,
    pub links: Vec<GanttLink>,
}

impl RunResponse {
    pub fn new(run: &DagRun, graph: Vec<GraphNode>, links: Vec<GanttLink>) -> Self {
        let tasks = run
            .tasks
            .iter()
            .map(|t| TaskResponse {
                task_name: t.task_name.clone(),
                status: t.status.to_string(),
                event_type: t.event_type.clone(),
                message: t.message.clone(),
                model_name: t.model_name.clone(),
                start_time: t.start_time.clone(),
                end_time: t.end_time.clone(),
                duration_minutes: t.duration_minutes(),
                progress: t.progress(),
            })
            .collect();
        Self {
            run_id: run.run_id.clone(),
            tasks,
            graph,
            links,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandResponse {
    pub feed: FeedKind,
    pub command: String,
    pub accepted: bool,
}

impl CommandResponse {
    pub fn new(feed: FeedKind, command: SyncCommand, accepted: bool) -> Self {
        Self {
            feed,
            command: format!("{:?}", command).to_lowercase(),
            accepted,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FeedHealthResponse {
    pub feed: String,
    pub enabled: bool,
    pub records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HealthResponse {
    pub feeds: Vec<FeedHealthResponse>,
    pub uptime_secs: i64,
    pub updated_at: i64,
}
