//! DAG run summaries
//!
//! Turns the raw task-event feed into per-run task spans: events are grouped
//! by run, the last N runs are kept, and repeated events of one task are
//! collapsed into a single span whose end is the latest event.

mod topology;

pub use topology::{GanttLink, GraphNode, PipelineEdge, PipelineTopology, NOT_STARTED};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::types::{parse_timestamp, DagEvent, TaskStatus};

pub const DEFAULT_LAST_RUNS: usize = 10;

/// One task of a run, from its first to its latest event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSpan {
    pub task_name: String,
    pub status: TaskStatus,
    pub event_type: Option<String>,
    pub message: Option<String>,
    pub model_name: Option<String>,
    pub start_time: String,
    pub end_time: Option<String>,
}

impl TaskSpan {
    pub fn duration_minutes(&self) -> Option<f64> {
        let start = parse_timestamp(&self.start_time)?;
        let end = parse_timestamp(self.end_time.as_deref()?)?;
        Some((end - start).num_seconds() as f64 / 60.0)
    }

    pub fn progress(&self) -> f64 {
        self.status.progress()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DagRun {
    pub run_id: String,
    pub tasks: Vec<TaskSpan>,
    /// Latest task start in the run
    pub latest_start: Option<DateTime<Utc>>,
}

impl DagRun {
    pub fn task(&self, name: &str) -> Option<&TaskSpan> {
        self.tasks.iter().find(|t| t.task_name == name)
    }
}

/// Run ids look like `scheduled__2025-09-28T18:00:00`; order by the part
/// after `__`.
fn run_order_key(run_id: &str) -> &str {
    run_id.split("__").nth(1).unwrap_or(run_id)
}

fn time_key(raw: &str) -> (Option<DateTime<Utc>>, &str) {
    (parse_timestamp(raw), raw)
}

/// Events grouped by run, keeping the `n` most recent runs (oldest first)
pub fn last_n_runs(events: &[DagEvent], n: usize) -> Vec<(String, Vec<&DagEvent>)> {
    let mut groups: HashMap<&str, Vec<&DagEvent>> = HashMap::new();
    for event in events {
        groups.entry(event.run_id.as_str()).or_default().push(event);
    }

    let mut run_ids: Vec<&str> = groups.keys().copied().collect();
    run_ids.sort_by(|a, b| run_order_key(a).cmp(run_order_key(b)).then(a.cmp(b)));
    let skip = run_ids.len().saturating_sub(n);

    run_ids
        .into_iter()
        .skip(skip)
        .map(|run_id| {
            let events = groups.remove(run_id).unwrap_or_default();
            (run_id.to_string(), events)
        })
        .collect()
}

/// Collapse a run's events into one span per task.
///
/// Events are replayed in `created_at` order: the first event of a task
/// opens the span, every later one moves its end and overwrites status,
/// event type and message.
pub fn collapse_tasks(events: &[&DagEvent]) -> Vec<TaskSpan> {
    let mut ordered: Vec<&DagEvent> = events.to_vec();
    ordered.sort_by(|a, b| time_key(&a.created_at).cmp(&time_key(&b.created_at)));

    let mut spans: Vec<TaskSpan> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for event in ordered {
        let existing = index.get(event.task_name.as_str()).copied();
        match existing {
            Some(pos) => {
                let span = &mut spans[pos];
                span.end_time = Some(event.created_at.clone());
                span.status = event.status.clone();
                span.event_type = event.event_type.clone();
                span.message = event.message.clone();
            }
            None => {
                index.insert(event.task_name.as_str(), spans.len());
                spans.push(TaskSpan {
                    task_name: event.task_name.clone(),
                    status: event.status.clone(),
                    event_type: event.event_type.clone(),
                    message: event.message.clone(),
                    model_name: event.model_name.clone(),
                    start_time: event.created_at.clone(),
                    end_time: None,
                });
            }
        }
    }

    spans.sort_by(|a, b| time_key(&a.start_time).cmp(&time_key(&b.start_time)));
    spans
}

/// The `n` most recent runs, newest first
pub fn summarize_runs(events: &[DagEvent], n: usize) -> Vec<DagRun> {
    let mut runs: Vec<DagRun> = last_n_runs(events, n)
        .into_iter()
        .map(|(run_id, events)| {
            let tasks = collapse_tasks(&events);
            let latest_start = tasks
                .iter()
                .filter_map(|t| parse_timestamp(&t.start_time))
                .max();
            DagRun {
                run_id,
                tasks,
                latest_start,
            }
        })
        .collect();

    runs.sort_by(|a, b| b.latest_start.cmp(&a.latest_start));
    debug!(events = events.len(), runs = runs.len(), "DAG runs summarized");
    runs
}
