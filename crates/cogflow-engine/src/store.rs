//! The flow store: the current graph plus the run-scoped state shown next
//! to it, and the `run_flow` / `reset_flow` entry points.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use cogflow_core::error::Result;
use cogflow_core::event::EventBus;
use cogflow_core::traits::ProgressSink;
use cogflow_core::types::*;

use crate::engine::FlowEngine;
use crate::graph::FlowGraph;
use crate::scheduler::{NodeStatus, RunSummary};
use crate::state::lock;

/// What the current run did to a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeRunState {
    pub response: String,
    pub loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionState>,
}

/// Result of [`FlowStore::run_flow`].
#[derive(Debug)]
pub enum RunOutcome {
    /// Another run was in progress; nothing was done.
    AlreadyRunning,
    Finished(RunSummary),
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct FlowStore {
    graph: Mutex<Arc<FlowGraph>>,
    nodes: Mutex<HashMap<String, NodeRunState>>,
    edges: Mutex<HashMap<String, EdgeExecutionState>>,
    running: AtomicBool,
    event_bus: Arc<EventBus>,
}

impl FlowStore {
    pub fn new(graph: FlowGraph, event_bus: Arc<EventBus>) -> Self {
        let store = Self {
            graph: Mutex::new(Arc::new(graph)),
            nodes: Mutex::new(HashMap::new()),
            edges: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            event_bus,
        };
        store.clear();
        store
    }

    /// The graph the next run will use.
    pub fn graph(&self) -> Arc<FlowGraph> {
        lock(&self.graph).clone()
    }

    /// Replace the graph. Run-scoped state is cleared.
    pub fn set_graph(&self, graph: FlowGraph) {
        *lock(&self.graph) = Arc::new(graph);
        self.reset_flow();
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn node_state(&self, node_id: &str) -> Option<NodeRunState> {
        lock(&self.nodes).get(node_id).cloned()
    }

    pub fn edge_state(&self, edge_id: &str) -> Option<EdgeExecutionState> {
        lock(&self.edges).get(edge_id).copied()
    }

    /// Every node's run state, keyed by node id.
    pub fn node_states(&self) -> HashMap<String, NodeRunState> {
        lock(&self.nodes).clone()
    }

    /// Clear every node's response, loading flag and selection, and every
    /// edge state.
    pub fn reset_flow(&self) {
        self.clear();
        self.event_bus.publish(FlowEvent::Reset);
    }

    fn clear(&self) {
        let graph = self.graph();
        *lock(&self.nodes) = graph
            .nodes()
            .iter()
            .map(|n| (n.id.clone(), NodeRunState::default()))
            .collect();
        lock(&self.edges).clear();
    }

    /// Run the current graph end to end.
    ///
    /// Returns `AlreadyRunning` without side effects if a run is in
    /// progress. Otherwise run-scoped state is reset and every node is
    /// scheduled. Errors only for structurally invalid graphs.
    pub async fn run_flow(&self, engine: &FlowEngine) -> Result<RunOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Flow run requested while another is in progress");
            return Ok(RunOutcome::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);

        self.reset_flow();
        let graph = self.graph();
        let run_id = RunId::new();
        info!(run_id = %run_id, nodes = graph.nodes().len(), "Flow run started");
        self.event_bus.publish(FlowEvent::RunStarted {
            run_id: run_id.clone(),
            node_count: graph.nodes().len(),
            started_at: Utc::now(),
        });

        match engine.run_with_id(&graph, self, run_id.clone()).await {
            Ok(summary) => {
                info!(
                    run_id = %run_id,
                    completed = summary.count(NodeStatus::Completed),
                    failed = summary.count(NodeStatus::Failed),
                    skipped = summary.count(NodeStatus::Skipped),
                    elapsed_ms = summary.elapsed_ms,
                    "Flow run finished"
                );
                self.event_bus.publish(FlowEvent::RunComplete {
                    run_id,
                    completed: summary.count(NodeStatus::Completed),
                    failed: summary.count(NodeStatus::Failed),
                    skipped: summary.count(NodeStatus::Skipped),
                    elapsed_ms: summary.elapsed_ms,
                });
                Ok(RunOutcome::Finished(summary))
            }
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Flow run rejected");
                self.event_bus.publish(FlowEvent::RunFailed {
                    run_id,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }
}

impl ProgressSink for FlowStore {
    fn set_node_response(&self, node_id: &str, text: &str, loading: bool) {
        {
            let mut nodes = lock(&self.nodes);
            let state = nodes.entry(node_id.to_string()).or_default();
            state.response = text.to_string();
            state.loading = loading;
        }
        self.event_bus.publish(FlowEvent::NodeResponse {
            node_id: node_id.to_string(),
            text: text.to_string(),
            loading,
        });
    }

    fn set_node_selection(&self, node_id: &str, state: SelectionState) {
        lock(&self.nodes)
            .entry(node_id.to_string())
            .or_default()
            .selection = Some(state);
        self.event_bus.publish(FlowEvent::NodeSelection {
            node_id: node_id.to_string(),
            state,
        });
    }

    fn set_edge_state(&self, edge_id: &str, state: EdgeExecutionState) {
        lock(&self.edges).insert(edge_id.to_string(), state);
        self.event_bus.publish(FlowEvent::EdgeState {
            edge_id: edge_id.to_string(),
            state,
        });
    }
}

impl std::fmt::Debug for FlowStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowStore")
            .field("nodes", &self.graph().nodes().len())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node};

    fn store() -> FlowStore {
        let graph = FlowGraph::new(
            vec![Node::new("a", "A"), Node::new("b", "B")],
            vec![Edge::new("a", "b")],
        );
        FlowStore::new(graph, Arc::new(EventBus::default()))
    }

    #[test]
    fn test_sink_updates_state() {
        let store = store();
        store.set_node_response("a", "partial", true);
        store.set_node_selection("b", SelectionState::Skipped);
        store.set_edge_state("a->b", EdgeExecutionState::Skipped);

        let a = store.node_state("a").unwrap();
        assert_eq!(a.response, "partial");
        assert!(a.loading);
        assert_eq!(
            store.node_state("b").unwrap().selection,
            Some(SelectionState::Skipped)
        );
        assert_eq!(store.edge_state("a->b"), Some(EdgeExecutionState::Skipped));
    }

    #[test]
    fn test_reset_twice_equals_once() {
        let store = store();
        store.set_node_response("a", "text", false);
        store.set_node_selection("a", SelectionState::Selected);
        store.set_edge_state("a->b", EdgeExecutionState::Complete);

        store.reset_flow();
        let once = (store.node_states(), store.edge_state("a->b"));
        store.reset_flow();
        let twice = (store.node_states(), store.edge_state("a->b"));

        assert_eq!(once, twice);
        assert_eq!(once.0["a"], NodeRunState::default());
        assert_eq!(once.1, None);
    }

    #[tokio::test]
    async fn test_events_mirror_sink_calls() {
        let store = store();
        let mut rx = store.event_bus().subscribe();
        store.set_node_response("a", "hi", false);
        store.reset_flow();

        match rx.recv().await.unwrap() {
            FlowEvent::NodeResponse { node_id, text, loading } => {
                assert_eq!(node_id, "a");
                assert_eq!(text, "hi");
                assert!(!loading);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(rx.recv().await.unwrap(), FlowEvent::Reset));
    }

    #[test]
    fn test_set_graph_resets_state() {
        let store = store();
        store.set_node_response("a", "old", false);
        store.set_graph(FlowGraph::new(vec![Node::new("z", "Z")], vec![]));
        assert!(store.node_state("a").is_none());
        assert_eq!(store.node_state("z"), Some(NodeRunState::default()));
    }
}
