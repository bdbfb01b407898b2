use thiserror::Error;

#[derive(Debug, Error)]
pub enum CogflowError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM provider not supported: {0}")]
    UnsupportedProvider(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Branch selection errors
    #[error("Branch selection failed: {0}")]
    BranchSelection(String),

    #[error("Branch selection returned unknown child '{selected}' for node {node_id}")]
    InvalidSelection { node_id: String, selected: String },

    // Graph errors
    #[error("Cycle detected in flow graph involving nodes: {}", .nodes.join(", "))]
    CycleDetected { nodes: Vec<String> },

    #[error("Invalid flow graph: {0}")]
    InvalidGraph(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CogflowError>;
