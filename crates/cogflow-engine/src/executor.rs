use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{debug, warn};

use cogflow_core::config::ModelConfig;
use cogflow_core::error::Result;
use cogflow_core::traits::{LlmClient, ProgressSink};
use cogflow_core::types::{ChatMessage, StreamDelta};

use crate::graph::Node;

/// Runs a normal node: one streamed text-generation request.
pub struct NodeExecutor {
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
}

impl NodeExecutor {
    pub fn new(llm: Arc<dyn LlmClient>, model: ModelConfig) -> Self {
        Self { llm, model }
    }

    /// The request sent for `node`: its history, then its own prompt.
    pub fn request(node: &Node, history: Vec<ChatMessage>) -> Vec<ChatMessage> {
        let mut messages = history;
        if !node.prompt.is_empty() {
            messages.push(ChatMessage::user(node.prompt.clone()));
        }
        messages
    }

    /// Open the request for `node` and yield its text fragments.
    pub async fn stream(
        &self,
        node: &Node,
        history: Vec<ChatMessage>,
    ) -> Result<BoxStream<'_, Result<String>>> {
        let messages = Self::request(node, history);
        debug!(node_id = %node.id, turns = messages.len(), "Sending node request");
        let deltas = self.llm.chat_stream(&self.model, messages).await?;
        Ok(deltas
            .filter_map(|delta| async move {
                match delta {
                    Ok(StreamDelta::TextDelta(text)) => Some(Ok(text)),
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                }
            })
            .boxed())
    }

    /// Run `node` to completion, publishing progress to `sink`.
    ///
    /// Each fragment publishes the accumulated text with `loading = true`.
    /// On success the final text is published with `loading = false`; on any
    /// failure the response is cleared instead and the error returned.
    pub async fn execute(
        &self,
        node: &Node,
        history: Vec<ChatMessage>,
        sink: &dyn ProgressSink,
    ) -> Result<String> {
        match self.accumulate(node, history, sink).await {
            Ok(text) => {
                sink.set_node_response(&node.id, &text, false);
                Ok(text)
            }
            Err(e) => {
                warn!(node_id = %node.id, error = %e, "Node execution failed");
                sink.set_node_response(&node.id, "", false);
                Err(e)
            }
        }
    }

    async fn accumulate(
        &self,
        node: &Node,
        history: Vec<ChatMessage>,
        sink: &dyn ProgressSink,
    ) -> Result<String> {
        let mut stream = self.stream(node, history).await?;
        let mut text = String::new();
        while let Some(fragment) = stream.next().await {
            text.push_str(&fragment?);
            sink.set_node_response(&node.id, &text, true);
        }
        Ok(text)
    }
}
