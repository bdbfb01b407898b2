use std::sync::Arc;

use tracing::{info, warn};

use cogflow_core::error::{CogflowError, Result};
use cogflow_core::traits::{BranchSelector, ProgressSink};
use cogflow_core::types::*;

use crate::graph::{FlowGraph, Node};
use crate::state::RunState;

/// Picks the one child of a decision node that continues the run.
pub struct BranchEvaluator {
    selector: Arc<dyn BranchSelector>,
}

/// The response recorded for a decision node.
pub fn decision_text(chosen: &Node, reasoning: &str) -> String {
    let label = if chosen.label.is_empty() {
        &chosen.id
    } else {
        &chosen.label
    };
    format!("Selected: {}\n\nReason: {}", label, reasoning)
}

impl BranchEvaluator {
    pub fn new(selector: Arc<dyn BranchSelector>) -> Self {
        Self { selector }
    }

    /// Ask the selector to choose among `children`.
    ///
    /// Fails with `InvalidSelection` if the answer names a node that was not
    /// offered.
    pub async fn choose(
        &self,
        node_id: &str,
        history: Vec<ChatMessage>,
        condition_prompt: &str,
        children: &[&Node],
    ) -> Result<BranchDecision> {
        let request = BranchRequest {
            messages: history,
            condition_prompt: condition_prompt.to_string(),
            children: children
                .iter()
                .map(|c| BranchChild {
                    id: c.id.clone(),
                    label: c.label.clone(),
                    prompt: c.prompt.clone(),
                })
                .collect(),
        };

        let decision = self.selector.select(request.clone()).await?;
        if !request.offers(&decision.selected_child_id) {
            return Err(CogflowError::InvalidSelection {
                node_id: node_id.to_string(),
                selected: decision.selected_child_id,
            });
        }
        Ok(decision)
    }

    /// Run decision node `node` and apply the choice to the run.
    ///
    /// The chosen child is marked selected and every other child's subtree
    /// skipped. If no valid choice is made, every child is skipped and the
    /// node's response is cleared.
    pub async fn evaluate(
        &self,
        graph: &FlowGraph,
        node: &Node,
        history: Vec<ChatMessage>,
        state: &RunState,
        sink: &dyn ProgressSink,
    ) -> Result<String> {
        let children = graph.outgoers(&node.id);
        let decision = match self
            .choose(&node.id, history, &node.condition_prompt, &children)
            .await
        {
            Ok(d) => d,
            Err(e) => {
                warn!(node_id = %node.id, error = %e, "Branch selection failed, skipping all children");
                sink.set_node_response(&node.id, "", false);
                for edge in graph.outgoing_edges(&node.id) {
                    sink.set_edge_state(&edge.id, EdgeExecutionState::Skipped);
                }
                for child in &children {
                    state.skip_subtree(graph, sink, &child.id);
                }
                return Err(e);
            }
        };

        let chosen_id = decision.selected_child_id.as_str();
        info!(node_id = %node.id, selected = %chosen_id, "Branch selected");
        state.record_choice(&node.id, chosen_id);

        let text = children
            .iter()
            .find(|c| c.id == chosen_id)
            .map(|c| decision_text(c, &decision.reasoning))
            .unwrap_or_default();
        sink.set_node_response(&node.id, &text, false);
        sink.set_node_selection(chosen_id, SelectionState::Selected);

        for edge in graph.outgoing_edges(&node.id) {
            let edge_state = if edge.target == chosen_id {
                EdgeExecutionState::Selected
            } else {
                EdgeExecutionState::Skipped
            };
            sink.set_edge_state(&edge.id, edge_state);
        }
        for child in children.iter().filter(|c| c.id != chosen_id) {
            state.skip_subtree(graph, sink, &child.id);
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Edge;
    use cogflow_test_utils::{MockBranchSelector, RecordingSink};

    fn fork() -> FlowGraph {
        FlowGraph::new(
            vec![
                Node::new("a", "Start").with_prompt("hi").choosing("which way"),
                Node::new("b", "Left").with_prompt("go left"),
                Node::new("c", "Right"),
                Node::new("d", "After right"),
            ],
            vec![Edge::new("a", "b"), Edge::new("a", "c"), Edge::new("c", "d")],
        )
    }

    async fn run(selector: MockBranchSelector) -> (Result<String>, RunState, RecordingSink) {
        let g = fork();
        let state = RunState::new();
        let sink = RecordingSink::new();
        let evaluator = BranchEvaluator::new(Arc::new(selector));
        let node = g.node("a").unwrap();
        let result = evaluator
            .evaluate(&g, node, vec![ChatMessage::user("hi")], &state, &sink)
            .await;
        (result, state, sink)
    }

    #[test]
    fn test_decision_text() {
        let node = Node::new("b", "Left");
        assert_eq!(decision_text(&node, "shorter"), "Selected: Left\n\nReason: shorter");
        let unnamed = Node::new("b", "");
        assert_eq!(decision_text(&unnamed, ""), "Selected: b\n\nReason: ");
    }

    #[tokio::test]
    async fn test_choice_applied() {
        let selector = MockBranchSelector::choosing("b", "it fits");
        let (result, state, sink) = run(selector.clone()).await;

        assert_eq!(result.unwrap(), "Selected: Left\n\nReason: it fits");
        assert_eq!(state.chosen_child("a").as_deref(), Some("b"));
        assert_eq!(sink.selection("b"), Some(SelectionState::Selected));
        assert!(state.is_skipped("c"));
        assert!(state.is_skipped("d"));
        assert!(!state.is_skipped("b"));
        assert_eq!(sink.edge_state("a->b"), Some(EdgeExecutionState::Selected));
        assert_eq!(sink.edge_state("a->c"), Some(EdgeExecutionState::Skipped));
        assert_eq!(sink.edge_state("c->d"), Some(EdgeExecutionState::Skipped));

        let request = &selector.requests()[0];
        assert_eq!(request.condition_prompt, "which way");
        assert_eq!(request.children.len(), 2);
        assert_eq!(request.children[0].prompt, "go left");
        assert_eq!(request.messages, vec![ChatMessage::user("hi")]);
    }

    #[tokio::test]
    async fn test_unknown_choice_rejected() {
        let (result, state, sink) = run(MockBranchSelector::choosing("zzz", "")).await;
        assert!(matches!(
            result,
            Err(CogflowError::InvalidSelection { ref selected, .. }) if selected == "zzz"
        ));
        assert_eq!(state.chosen_child("a"), None);
        for id in ["b", "c", "d"] {
            assert!(state.is_skipped(id));
        }
        assert_eq!(sink.last_response("a"), Some((String::new(), false)));
    }

    #[tokio::test]
    async fn test_selector_failure_skips_every_child() {
        let (result, state, sink) = run(MockBranchSelector::failing()).await;
        assert!(matches!(result, Err(CogflowError::BranchSelection(_))));
        assert!(state.is_skipped("b"));
        assert!(state.is_skipped("c"));
        assert_eq!(sink.edge_state("a->b"), Some(EdgeExecutionState::Skipped));
        assert_eq!(sink.selection("b"), Some(SelectionState::Skipped));
    }
}
