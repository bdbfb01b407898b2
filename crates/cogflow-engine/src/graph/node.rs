use serde::{Deserialize, Serialize};

/// How a node continues into its children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Every child runs.
    #[default]
    All,
    /// Exactly one child is selected at run time.
    Choose,
}

/// A reasoning step in the flow graph.
///
/// Execution-relevant fields are typed; anything the editor stores on a node
/// (position, colour, collapsed state...) lands in `extra` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier for this node.
    pub id: String,
    /// Human-readable name, offered to branch selection as context.
    #[serde(default)]
    pub label: String,
    /// User-authored prompt; may be empty.
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    /// Selection criterion; only read when `execution_mode` is `Choose`.
    #[serde(default)]
    pub condition_prompt: String,
    /// Editor-owned presentation fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Node {
    /// Create a new node with minimal configuration.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            prompt: String::new(),
            execution_mode: ExecutionMode::All,
            condition_prompt: String::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Set the prompt.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Make this a decision node choosing by `condition`.
    pub fn choosing(mut self, condition: impl Into<String>) -> Self {
        self.execution_mode = ExecutionMode::Choose;
        self.condition_prompt = condition.into();
        self
    }

    /// Whether this node is configured to pick one child.
    ///
    /// A decision node with fewer than two children still runs as a normal
    /// node; see [`crate::graph::FlowGraph::branches_at`].
    pub fn is_decision(&self) -> bool {
        self.execution_mode == ExecutionMode::Choose && !self.condition_prompt.trim().is_empty()
    }
}
