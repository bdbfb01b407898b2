//! Run-scoped state shared by the units of one flow run.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, warn};

use cogflow_core::traits::ProgressSink;
use cogflow_core::types::{EdgeExecutionState, SelectionState};

use crate::graph::FlowGraph;

/// `None` while a unit runs; `Some(result)` once it resolved.
type Completion = Option<Option<String>>;

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Resolves one unit. Dropping it unresolved counts as an empty result for
/// anyone waiting.
#[derive(Debug)]
pub struct UnitHandle {
    node_id: String,
    tx: watch::Sender<Completion>,
}

impl UnitHandle {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn resolve(self, text: Option<String>) {
        self.tx.send_replace(Some(text));
    }
}

/// State for a single run. Filled monotonically and dropped at run end.
#[derive(Debug, Default)]
pub struct RunState {
    pending: HashMap<String, watch::Receiver<Completion>>,
    completed_text: Mutex<HashMap<String, String>>,
    chosen_child: Mutex<HashMap<String, String>>,
    skipped: Mutex<HashSet<String>>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit for `node_id`. All units must be registered before any
    /// of them starts waiting.
    pub fn register(&mut self, node_id: &str) -> UnitHandle {
        let (tx, rx) = watch::channel(None);
        self.pending.insert(node_id.to_string(), rx);
        UnitHandle {
            node_id: node_id.to_string(),
            tx,
        }
    }

    /// Wait for the unit of `node_id` and return its result.
    ///
    /// An unknown unit, or one whose handle was dropped, resolves to `None`.
    pub async fn wait_for(&self, node_id: &str) -> Option<String> {
        let Some(rx) = self.pending.get(node_id) else {
            warn!(node_id = %node_id, "No unit registered for dependency, treating as empty");
            return None;
        };
        let mut rx = rx.clone();
        let result = match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone().flatten(),
            Err(_) => None,
        };
        result
    }

    pub fn record_text(&self, node_id: &str, text: impl Into<String>) {
        lock(&self.completed_text).insert(node_id.to_string(), text.into());
    }

    /// A copy of every answer recorded so far.
    pub fn completed_text(&self) -> HashMap<String, String> {
        lock(&self.completed_text).clone()
    }

    pub fn record_choice(&self, decision_id: &str, child_id: &str) {
        lock(&self.chosen_child).insert(decision_id.to_string(), child_id.to_string());
    }

    pub fn chosen_child(&self, decision_id: &str) -> Option<String> {
        lock(&self.chosen_child).get(decision_id).cloned()
    }

    pub fn is_skipped(&self, node_id: &str) -> bool {
        lock(&self.skipped).contains(node_id)
    }

    /// Exclude `node_id` and everything reachable from it.
    ///
    /// Each newly skipped node is reported as `Skipped` and its outgoing
    /// edges as skipped. Nodes already skipped are left alone, so calling
    /// this again, or on an overlapping subtree, is a no-op for them.
    pub fn skip_subtree(&self, graph: &FlowGraph, sink: &dyn ProgressSink, node_id: &str) {
        let mut stack = vec![node_id.to_string()];
        while let Some(id) = stack.pop() {
            if !lock(&self.skipped).insert(id.clone()) {
                continue;
            }
            debug!(node_id = %id, "Skipping node");
            sink.set_node_selection(&id, SelectionState::Skipped);
            for edge in graph.outgoing_edges(&id) {
                sink.set_edge_state(&edge.id, EdgeExecutionState::Skipped);
            }
            stack.extend(graph.outgoers(&id).into_iter().rev().map(|n| n.id.clone()));
        }
    }
}
