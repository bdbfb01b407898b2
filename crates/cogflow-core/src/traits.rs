use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// Streaming text generation.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}

/// Picks exactly one child of a decision node.
pub trait BranchSelector: Send + Sync + 'static {
    /// Choose one of `request.children`.
    ///
    /// Implementations are not required to validate the returned id; the
    /// engine rejects ids outside the offered set.
    fn select(&self, request: BranchRequest) -> BoxFuture<'_, Result<BranchDecision>>;
}

/// Receives run progress for presentation or storage.
///
/// Calls are purely observational; nothing a sink does feeds back into
/// scheduling.
pub trait ProgressSink: Send + Sync {
    /// Called repeatedly while a node streams, and once more when it settles.
    fn set_node_response(&self, node_id: &str, text: &str, loading: bool);

    /// Called when a node is put on, or excluded from, the chosen path.
    fn set_node_selection(&self, node_id: &str, state: SelectionState);

    /// Called as edges are traversed, selected, or skipped.
    fn set_edge_state(&self, edge_id: &str, state: EdgeExecutionState);
}
