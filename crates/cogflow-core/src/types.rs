use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of one flow run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single turn of a conversation transcript.
///
/// Serializes as `{"role": "user", "content": "..."}`, which is the wire
/// shape both external calls expect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// Stop reason from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

/// A streaming delta from the LLM.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// The response is complete.
    Stop(StopReason),

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
}

/// A child offered to the branch-selection call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BranchChild {
    pub id: String,
    pub label: String,
    pub prompt: String,
}

/// Request body of the branch-selection call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchRequest {
    pub messages: Vec<ChatMessage>,
    pub condition_prompt: String,
    pub children: Vec<BranchChild>,
}

impl BranchRequest {
    /// Whether `id` names one of the offered children.
    pub fn offers(&self, id: &str) -> bool {
        self.children.iter().any(|c| c.id == id)
    }
}

/// Response of the branch-selection call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BranchDecision {
    pub selected_child_id: String,
    #[serde(default)]
    pub reasoning: String,
}

/// Whether a node ended up on the chosen path of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SelectionState {
    Selected,
    Skipped,
}

/// Observational state of an edge during a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EdgeExecutionState {
    Selected,
    Skipped,
    Complete,
}

impl std::fmt::Display for EdgeExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Selected => "selected",
            Self::Skipped => "skipped",
            Self::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// Flow event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    /// A run started.
    RunStarted {
        run_id: RunId,
        node_count: usize,
        started_at: DateTime<Utc>,
    },
    /// A node's response changed (streamed delta or final text).
    NodeResponse {
        node_id: String,
        text: String,
        loading: bool,
    },
    /// A node was marked selected or skipped.
    NodeSelection {
        node_id: String,
        state: SelectionState,
    },
    /// An edge changed execution state.
    EdgeState {
        edge_id: String,
        state: EdgeExecutionState,
    },
    /// All units of a run resolved.
    RunComplete {
        run_id: RunId,
        completed: usize,
        failed: usize,
        skipped: usize,
        elapsed_ms: u64,
    },
    /// A run was rejected before scheduling (e.g. a cycle).
    RunFailed { run_id: RunId, error: String },
    /// Run-scoped state was cleared.
    Reset,
}
