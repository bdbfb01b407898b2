//! Dependency-driven scheduling of one flow run.
//!
//! Every node gets exactly one unit: a future that waits for all of the
//! node's direct predecessors, decides whether the node still belongs to the
//! run, and if so executes it. All units are joined on the calling task, so
//! independent nodes interleave at their await points while a node never
//! starts before its inputs settled.

use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info};

use cogflow_core::error::Result;
use cogflow_core::traits::ProgressSink;
use cogflow_core::types::{EdgeExecutionState, RunId};

use crate::branch::BranchEvaluator;
use crate::executor::NodeExecutor;
use crate::graph::FlowGraph;
use crate::history::build_history;
use crate::state::{RunState, UnitHandle};

/// How a node's unit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Completed,
    Failed,
    Skipped,
}

/// Outcome of a single node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeResult {
    pub node_id: String,
    pub status: NodeStatus,
    /// The node's final text; `None` when it failed or was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Outcome of a whole run. Results are in node-list order.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub results: Vec<NodeResult>,
}

impl RunSummary {
    pub fn result(&self, node_id: &str) -> Option<&NodeResult> {
        self.results.iter().find(|r| r.node_id == node_id)
    }

    pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
        self.result(node_id).map(|r| r.status)
    }

    pub fn count(&self, status: NodeStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}

/// Runs every node of a graph in dependency order.
///
/// Run-scoped presentation state (responses, selections, edge states) is
/// expected to be cleared by the caller before `run`.
pub struct Scheduler<'a> {
    graph: &'a FlowGraph,
    executor: &'a NodeExecutor,
    evaluator: &'a BranchEvaluator,
    sink: &'a dyn ProgressSink,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        graph: &'a FlowGraph,
        executor: &'a NodeExecutor,
        evaluator: &'a BranchEvaluator,
        sink: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            graph,
            executor,
            evaluator,
            sink,
        }
    }

    /// Run the graph to completion.
    ///
    /// Fails only if the graph is structurally invalid, before any node
    /// runs. Node failures are contained and reported in the summary.
    pub async fn run(&self, run_id: RunId) -> Result<RunSummary> {
        let order = self.graph.validate()?;
        let started_at = Utc::now();
        let start = Instant::now();
        info!(run_id = %run_id, nodes = order.len(), "Flow run started");

        let mut state = RunState::new();
        let handles: Vec<UnitHandle> = self
            .graph
            .nodes()
            .iter()
            .map(|n| state.register(&n.id))
            .collect();

        let state = &state;
        let results = join_all(handles.into_iter().map(|h| self.unit(state, h))).await;

        let summary = RunSummary {
            run_id,
            started_at,
            elapsed_ms: start.elapsed().as_millis() as u64,
            results,
        };
        info!(
            run_id = %summary.run_id,
            completed = summary.count(NodeStatus::Completed),
            failed = summary.count(NodeStatus::Failed),
            skipped = summary.count(NodeStatus::Skipped),
            elapsed_ms = summary.elapsed_ms,
            "Flow run finished"
        );
        Ok(summary)
    }

    async fn unit(&self, state: &RunState, handle: UnitHandle) -> NodeResult {
        let node_id = handle.node_id().to_string();
        let parents = self.graph.incomers(&node_id);
        for parent in &parents {
            state.wait_for(&parent.id).await;
        }

        let start = Instant::now();
        let skipped = |handle: UnitHandle| {
            handle.resolve(None);
            NodeResult {
                node_id: node_id.clone(),
                status: NodeStatus::Skipped,
                text: None,
                error: None,
                elapsed_ms: 0,
            }
        };

        if state.is_skipped(&node_id) {
            debug!(node_id = %node_id, "Node skipped");
            return skipped(handle);
        }

        let passed_over = parents.iter().find(|p| {
            p.is_decision()
                && state
                    .chosen_child(&p.id)
                    .is_some_and(|chosen| chosen != node_id)
        });
        if let Some(decision) = passed_over {
            debug!(node_id = %node_id, decision = %decision.id, "Node not on chosen branch");
            state.skip_subtree(self.graph, self.sink, &node_id);
            return skipped(handle);
        }

        let Some(node) = self.graph.node(&node_id) else {
            return skipped(handle);
        };

        debug!(node_id = %node_id, "Node started");
        self.sink.set_node_response(&node_id, "", true);
        let history = build_history(&node_id, self.graph, &state.completed_text());

        let outcome = if self.graph.branches_at(&node_id) {
            let transcript = NodeExecutor::request(node, history);
            self.evaluator
                .evaluate(self.graph, node, transcript, state, self.sink)
                .await
        } else {
            let outcome = self.executor.execute(node, history, self.sink).await;
            for edge in self.graph.outgoing_edges(&node_id) {
                self.sink.set_edge_state(&edge.id, EdgeExecutionState::Complete);
            }
            outcome
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(text) => {
                debug!(node_id = %node_id, elapsed_ms, "Node completed");
                state.record_text(&node_id, text.clone());
                handle.resolve(Some(text.clone()));
                NodeResult {
                    node_id,
                    status: NodeStatus::Completed,
                    text: Some(text),
                    error: None,
                    elapsed_ms,
                }
            }
            Err(e) => {
                debug!(node_id = %node_id, elapsed_ms, "Node failed");
                state.record_text(&node_id, "");
                handle.resolve(None);
                NodeResult {
                    node_id,
                    status: NodeStatus::Failed,
                    text: None,
                    error: Some(e.to_string()),
                    elapsed_ms,
                }
            }
        }
    }
}
