//! Static topology of the training pipeline DAG, joined against a run's
//! task spans for graph and gantt rendering.

use serde::Serialize;
use std::collections::HashMap;

use super::DagRun;

pub const NOT_STARTED: &str = "NOT STARTED";

const PRE_TRAIN: &str = "pre_train_dataset";
const FLUSH: &str = "flush_and_init";
const TRAIN: &str = "vast_ai_train";
const POST_TRAIN_TRL: &str = "post_train_trl";
const MONITOR: &str = "monitor_all_to_kill";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineEdge {
    pub from: String,
    pub to: String,
}

impl PipelineEdge {
    fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub status: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

/// Finish-to-start dependency between two tasks of a run.
/// `source`/`target` are 1-based positions in the run's task list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GanttLink {
    pub id: usize,
    pub source: usize,
    pub target: usize,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Clone)]
pub struct PipelineTopology {
    edges: Vec<PipelineEdge>,
}

impl PipelineTopology {
    /// Pipeline edges for the configured cryptos and models.
    ///
    /// One `post_train_<CRYPTO>_<model>` task hangs off training per pair.
    pub fn training(cryptos: &[String], models: &[String]) -> Self {
        let mut edges = vec![
            PipelineEdge::new(PRE_TRAIN, FLUSH),
            PipelineEdge::new(FLUSH, TRAIN),
            PipelineEdge::new(TRAIN, POST_TRAIN_TRL),
        ];
        for crypto in cryptos {
            for model in models {
                edges.push(PipelineEdge::new(
                    TRAIN,
                    format!("post_train_{}_{}", crypto, model),
                ));
            }
        }
        edges.push(PipelineEdge::new(TRAIN, MONITOR));
        Self { edges }
    }

    pub fn edges(&self) -> &[PipelineEdge] {
        &self.edges
    }

    /// Every task named by an edge, in first-seen order
    pub fn nodes(&self) -> Vec<&str> {
        let mut nodes: Vec<&str> = Vec::new();
        for edge in &self.edges {
            for name in [edge.from.as_str(), edge.to.as_str()] {
                if !nodes.contains(&name) {
                    nodes.push(name);
                }
            }
        }
        nodes
    }

    pub fn graph(&self, run: &DagRun) -> Vec<GraphNode> {
        self.nodes()
            .into_iter()
            .map(|name| match run.task(name) {
                Some(span) => GraphNode {
                    id: name.to_string(),
                    status: span.status.to_string(),
                    start_time: Some(span.start_time.clone()),
                    end_time: span.end_time.clone(),
                },
                None => GraphNode {
                    id: name.to_string(),
                    status: NOT_STARTED.to_string(),
                    start_time: None,
                    end_time: None,
                },
            })
            .collect()
    }

    /// Links only between tasks present in the run
    pub fn gantt_links(&self, run: &DagRun) -> Vec<GanttLink> {
        let positions: HashMap<&str, usize> = run
            .tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.task_name.as_str(), i + 1))
            .collect();

        self.edges
            .iter()
            .enumerate()
            .filter_map(|(i, edge)| {
                let source = *positions.get(edge.from.as_str())?;
                let target = *positions.get(edge.to.as_str())?;
                Some(GanttLink {
                    id: i + 1,
                    source,
                    target,
                    kind: "0",
                })
            })
            .collect()
    }
}

impl Default for PipelineTopology {
    fn default() -> Self {
        Self::training(
            &["BTCUSDT".to_string()],
            &["lightgbm".to_string(), "tst".to_string()],
        )
    }
}
