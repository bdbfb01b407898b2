#![allow(dead_code)]

use std::sync::Arc;

use cogflow_core::event::EventBus;
use cogflow_engine::{Edge, FlowEngine, FlowGraph, FlowStore, Node};
use cogflow_test_utils::{test_model, MockBranchSelector, MockLlmClient};

pub fn engine(llm: &MockLlmClient, selector: &MockBranchSelector) -> FlowEngine {
    FlowEngine::new(Arc::new(llm.clone()), Arc::new(selector.clone()), test_model())
}

pub fn store(graph: FlowGraph) -> FlowStore {
    FlowStore::new(graph, Arc::new(EventBus::new(1024)))
}

/// `a -> b`, `a -> c`.
pub fn fan_out() -> FlowGraph {
    FlowGraph::new(
        vec![
            Node::new("a", "Root").with_prompt("hi"),
            Node::new("b", "Left").with_prompt("left?"),
            Node::new("c", "Right").with_prompt("right?"),
        ],
        vec![Edge::new("a", "b"), Edge::new("a", "c")],
    )
}

/// Decision node `d` over `x`, `y`, `z`; each child has one follow-up
/// (`x1`, `y1`, `z1`).
pub fn three_way() -> FlowGraph {
    let mut nodes = vec![Node::new("d", "Decide").with_prompt("topic").choosing("most relevant")];
    let mut edges = Vec::new();
    for (id, label) in [("x", "Ex"), ("y", "Why"), ("z", "Zed")] {
        let follow = format!("{}1", id);
        nodes.push(Node::new(id, label).with_prompt(format!("run {}", id)));
        nodes.push(Node::new(follow.clone(), "follow-up").with_prompt(format!("run {}", follow)));
        edges.push(Edge::new("d", id));
        edges.push(Edge::new(id, follow));
    }
    FlowGraph::new(nodes, edges)
}
