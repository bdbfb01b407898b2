//! Flow graph model: nodes, edges, and the read-only accessors the engine
//! runs against.
//!
//! A flow is a directed graph of `Node`s connected by `Edge`s. An edge
//! `a -> b` means `b` runs after `a` settled and sees `a`'s answer in its
//! transcript (when `a` is `b`'s first parent). Graphs are stored as JSON
//! `{ "nodes": [...], "edges": [...] }` using the editor's camelCase field
//! names.

pub mod edge;
pub mod node;

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use cogflow_core::error::{CogflowError, Result};

pub use edge::{default_edge_id, Edge};
pub use node::{ExecutionMode, Node};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GraphFile {
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
}

/// An immutable snapshot of a flow graph.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    index: HashMap<String, usize>,
}

impl Serialize for FlowGraph {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        GraphFile {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FlowGraph {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let file = GraphFile::deserialize(deserializer)?;
        Ok(Self::new(file.nodes, file.edges))
    }
}

impl FlowGraph {
    /// Build a snapshot, assigning ids to edges that have none.
    pub fn new(nodes: Vec<Node>, mut edges: Vec<Edge>) -> Self {
        for edge in edges.iter_mut().filter(|e| e.id.is_empty()) {
            edge.id = default_edge_id(&edge.source, &edge.target);
        }
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            // First occurrence wins; duplicates are reported by `validate`
            index.entry(node.id.clone()).or_insert(i);
        }
        Self {
            nodes,
            edges,
            index,
        }
    }

    /// Parse a graph from its JSON form.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a graph from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Edges ending at `id`, in edge-list order.
    pub fn incoming_edges(&self, id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.target == id).collect()
    }

    /// Edges starting at `id`, in edge-list order.
    pub fn outgoing_edges(&self, id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.source == id).collect()
    }

    /// Direct predecessors of `id`, in edge-list order, each at most once.
    ///
    /// Edges whose source is not a known node are ignored. An unknown `id`
    /// has no incomers.
    pub fn incomers(&self, id: &str) -> Vec<&Node> {
        self.collect_nodes(self.edges.iter().filter(|e| e.target == id).map(|e| e.source.as_str()))
    }

    /// Direct successors of `id`, in edge-list order, each at most once.
    pub fn outgoers(&self, id: &str) -> Vec<&Node> {
        self.collect_nodes(self.edges.iter().filter(|e| e.source == id).map(|e| e.target.as_str()))
    }

    fn collect_nodes<'a>(&'a self, ids: impl Iterator<Item = &'a str>) -> Vec<&'a Node> {
        let mut seen = HashSet::new();
        ids.filter(|id| seen.insert(*id))
            .filter_map(|id| self.node(id))
            .collect()
    }

    /// Whether `id` branches at run time: a decision node with more than one
    /// child. A decision node with a single child runs like any other.
    pub fn branches_at(&self, id: &str) -> bool {
        self.node(id).is_some_and(Node::is_decision) && self.outgoers(id).len() > 1
    }

    /// Edges naming a node that does not exist.
    pub fn dangling_edges(&self) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|e| !self.contains(&e.source) || !self.contains(&e.target))
            .collect()
    }

    /// Check the structural invariants a run relies on and return the node
    /// ids in a valid execution order.
    ///
    /// Duplicate node ids and directed cycles are errors. Dangling edges are
    /// logged and ignored.
    pub fn validate(&self) -> Result<Vec<String>> {
        if self.index.len() != self.nodes.len() {
            let mut seen = HashSet::new();
            let dupes: Vec<&str> = self
                .nodes
                .iter()
                .filter(|n| !seen.insert(n.id.as_str()))
                .map(|n| n.id.as_str())
                .collect();
            return Err(CogflowError::InvalidGraph(format!(
                "duplicate node ids: {}",
                dupes.join(", ")
            )));
        }

        for edge in self.dangling_edges() {
            warn!(
                edge_id = %edge.id,
                source = %edge.source,
                target = %edge.target,
                "Edge references an unknown node, ignoring"
            );
        }

        self.topological_order()
    }

    /// Kahn's algorithm over the known nodes. Ties resolve in node-list order.
    fn topological_order(&self) -> Result<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> =
            self.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
        let live_edges: Vec<&Edge> = self
            .edges
            .iter()
            .filter(|e| self.contains(&e.source) && self.contains(&e.target))
            .collect();
        for edge in &live_edges {
            *in_degree.entry(edge.target.as_str()).or_default() += 1;
        }

        let mut ready: VecDeque<&str> = self
            .nodes
            .iter()
            .map(|n| n.id.as_str())
            .filter(|id| in_degree[id] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = ready.pop_front() {
            order.push(id.to_string());
            for edge in live_edges.iter().filter(|e| e.source == id) {
                let degree = in_degree.entry(edge.target.as_str()).or_default();
                *degree -= 1;
                if *degree == 0 {
                    ready.push_back(edge.target.as_str());
                }
            }
        }

        if order.len() < self.nodes.len() {
            let stuck: Vec<String> = self
                .nodes
                .iter()
                .filter(|n| in_degree[n.id.as_str()] > 0)
                .map(|n| n.id.clone())
                .collect();
            return Err(CogflowError::CycleDetected { nodes: stuck });
        }
        Ok(order)
    }
}
