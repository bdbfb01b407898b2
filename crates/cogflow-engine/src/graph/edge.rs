use serde::{Deserialize, Serialize};

/// A directed dependency between two nodes in the flow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Unique identifier; filled in from the endpoints when absent.
    #[serde(default)]
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Editor connection point on the source; ignored by execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    /// Editor connection point on the target; ignored by execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Edge {
    /// Create an edge with an id derived from its endpoints.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: default_edge_id(&source, &target),
            source,
            target,
            source_handle: None,
            target_handle: None,
        }
    }

    /// Set an explicit id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// The id given to edges that arrive without one.
pub fn default_edge_id(source: &str, target: &str) -> String {
    format!("{}->{}", source, target)
}
