//! Conversation history for a node, built from its ancestor chain.

use std::collections::{HashMap, HashSet};

use cogflow_core::types::ChatMessage;

use crate::graph::FlowGraph;

/// Build the transcript a node's request starts with.
///
/// Walks the first-incomer chain from `node_id` back to a root and emits, in
/// root-to-node order, each ancestor's prompt as a user turn (skipped when
/// empty) followed by its recorded answer as an assistant turn (whenever an
/// entry exists in `completed_text`, even an empty one). The node's own
/// prompt is not included.
pub fn build_history(
    node_id: &str,
    graph: &FlowGraph,
    completed_text: &HashMap<String, String>,
) -> Vec<ChatMessage> {
    let mut chain = Vec::new();
    let mut visited = HashSet::from([node_id.to_string()]);
    let mut current = node_id.to_string();

    while let Some(parent) = graph.incomers(&current).into_iter().next() {
        if !visited.insert(parent.id.clone()) {
            break;
        }
        chain.push(parent);
        current = parent.id.clone();
    }

    let mut messages = Vec::with_capacity(chain.len() * 2);
    for ancestor in chain.into_iter().rev() {
        if !ancestor.prompt.is_empty() {
            messages.push(ChatMessage::user(ancestor.prompt.clone()));
        }
        if let Some(text) = completed_text.get(&ancestor.id) {
            messages.push(ChatMessage::assistant(text.clone()));
        }
    }
    messages
}
