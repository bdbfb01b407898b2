//! Mocks for the external collaborators of a flow run.
//!
//! Everything here is `Clone` and shares state through `Arc`, so a test can
//! hand one clone to the engine and keep another to inspect calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};

use cogflow_core::config::ModelConfig;
use cogflow_core::error::{CogflowError, Result};
use cogflow_core::traits::{BranchSelector, LlmClient, ProgressSink};
use cogflow_core::types::*;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// A failure the mock reproduces on every matching call.
#[derive(Debug, Clone)]
enum Failure {
    Request(String),
    Stream(String),
    Other(String),
}

impl Failure {
    fn from_error(e: CogflowError) -> Self {
        match e {
            CogflowError::LlmRequest(m) => Self::Request(m),
            CogflowError::LlmStream(m) => Self::Stream(m),
            other => Self::Other(other.to_string()),
        }
    }

    fn to_error(&self) -> CogflowError {
        match self {
            Self::Request(m) => CogflowError::LlmRequest(m.clone()),
            Self::Stream(m) => CogflowError::LlmStream(m.clone()),
            Self::Other(m) => CogflowError::LlmRequest(m.clone()),
        }
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(Failure),
    /// Streams `partial`, then yields a stream error.
    BreakAfter(String),
}

#[derive(Default)]
struct LlmState {
    replies: HashMap<String, Reply>,
    delays: HashMap<String, Duration>,
    default: Option<Reply>,
    calls: Vec<Vec<ChatMessage>>,
}

/// Scripted text-generation client.
///
/// Replies are keyed by the content of the last user turn of a request (for
/// a flow node, its own prompt). Unmatched requests get the default reply,
/// or an echo of the last user turn when no default is set.
#[derive(Clone, Default)]
pub struct MockLlmClient {
    state: Arc<Mutex<LlmState>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply `text` to requests whose last user turn is `prompt`.
    pub fn with_reply(self, prompt: impl Into<String>, text: impl Into<String>) -> Self {
        lock(&self.state)
            .replies
            .insert(prompt.into(), Reply::Text(text.into()));
        self
    }

    /// Fail requests whose last user turn is `prompt` with an HTTP 500.
    pub fn failing_on(self, prompt: impl Into<String>) -> Self {
        let failure = Failure::Request("HTTP 500 Internal Server Error: mock".into());
        lock(&self.state)
            .replies
            .insert(prompt.into(), Reply::Fail(failure));
        self
    }

    /// Stream `partial` for `prompt`, then break the stream.
    pub fn breaking_on(self, prompt: impl Into<String>, partial: impl Into<String>) -> Self {
        lock(&self.state)
            .replies
            .insert(prompt.into(), Reply::BreakAfter(partial.into()));
        self
    }

    /// Wait `delay` before answering `prompt`.
    pub fn with_delay(self, prompt: impl Into<String>, delay: Duration) -> Self {
        lock(&self.state).delays.insert(prompt.into(), delay);
        self
    }

    pub fn with_default(self, text: impl Into<String>) -> Self {
        lock(&self.state).default = Some(Reply::Text(text.into()));
        self
    }

    pub fn failing_by_default(self) -> Self {
        self.failing_by_default_with(CogflowError::LlmRequest("HTTP 500: mock".into()))
    }

    pub fn failing_by_default_with(self, error: CogflowError) -> Self {
        lock(&self.state).default = Some(Reply::Fail(Failure::from_error(error)));
        self
    }

    /// Every request received so far, in arrival order.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        lock(&self.state).calls.clone()
    }

    /// The request whose last user turn is `prompt`, if any.
    pub fn call_for(&self, prompt: &str) -> Option<Vec<ChatMessage>> {
        self.calls()
            .into_iter()
            .find(|msgs| last_user(msgs) == Some(prompt))
    }
}

fn last_user(messages: &[ChatMessage]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
}

/// Split text into word-sized chunks, keeping the separators.
pub fn chunk_text(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(str::to_string).collect()
}

impl LlmClient for MockLlmClient {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        Box::pin(async move {
            let key = last_user(&messages).unwrap_or_default().to_string();
            let (reply, delay) = {
                let mut state = lock(&self.state);
                state.calls.push(messages.clone());
                let reply = state
                    .replies
                    .get(&key)
                    .or(state.default.as_ref())
                    .cloned()
                    .unwrap_or_else(|| Reply::Text(format!("echo: {}", key)));
                (reply, state.delays.get(&key).copied())
            };

            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let items: Vec<Result<StreamDelta>> = match reply {
                Reply::Text(text) => chunk_text(&text)
                    .into_iter()
                    .map(|c| Ok(StreamDelta::TextDelta(c)))
                    .chain(std::iter::once(Ok(StreamDelta::Stop(StopReason::EndTurn))))
                    .collect(),
                Reply::Fail(failure) => return Err(failure.to_error()),
                Reply::BreakAfter(partial) => chunk_text(&partial)
                    .into_iter()
                    .map(|c| Ok(StreamDelta::TextDelta(c)))
                    .chain(std::iter::once(Err(CogflowError::LlmStream(
                        "connection reset".into(),
                    ))))
                    .collect(),
            };

            Ok(Box::pin(stream::iter(items)) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

#[derive(Default)]
struct SelectorState {
    by_condition: HashMap<String, BranchDecision>,
    default: Option<BranchDecision>,
    fail: bool,
    requests: Vec<BranchRequest>,
}

/// Scripted branch selector.
#[derive(Clone, Default)]
pub struct MockBranchSelector {
    state: Arc<Mutex<SelectorState>>,
}

impl MockBranchSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always choose `child_id`.
    pub fn choosing(child_id: impl Into<String>, reasoning: impl Into<String>) -> Self {
        let selector = Self::new();
        lock(&selector.state).default = Some(BranchDecision {
            selected_child_id: child_id.into(),
            reasoning: reasoning.into(),
        });
        selector
    }

    /// Choose `child_id` when the request's condition prompt is `condition`.
    pub fn with_choice(
        self,
        condition: impl Into<String>,
        child_id: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        lock(&self.state).by_condition.insert(
            condition.into(),
            BranchDecision {
                selected_child_id: child_id.into(),
                reasoning: reasoning.into(),
            },
        );
        self
    }

    /// Fail every call.
    pub fn failing() -> Self {
        let selector = Self::new();
        lock(&selector.state).fail = true;
        selector
    }

    pub fn requests(&self) -> Vec<BranchRequest> {
        lock(&self.state).requests.clone()
    }
}

impl BranchSelector for MockBranchSelector {
    fn select(&self, request: BranchRequest) -> BoxFuture<'_, Result<BranchDecision>> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.requests.push(request.clone());
            if state.fail {
                return Err(CogflowError::BranchSelection("HTTP 503: mock".into()));
            }
            state
                .by_condition
                .get(&request.condition_prompt)
                .or(state.default.as_ref())
                .cloned()
                .ok_or_else(|| CogflowError::BranchSelection("no scripted choice".into()))
        })
    }
}

/// One call received by a [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Response {
        node_id: String,
        text: String,
        loading: bool,
    },
    Selection {
        node_id: String,
        state: SelectionState,
    },
    Edge {
        edge_id: String,
        state: EdgeExecutionState,
    },
}

/// Progress sink that records every call in order.
#[derive(Clone, Default)]
pub struct RecordingSink {
    calls: Arc<Mutex<Vec<SinkCall>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        lock(&self.calls).clone()
    }

    /// `(text, loading)` pairs published for a node, in order.
    pub fn responses(&self, node_id: &str) -> Vec<(String, bool)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::Response {
                    node_id: id,
                    text,
                    loading,
                } if id == node_id => Some((text, loading)),
                _ => None,
            })
            .collect()
    }

    /// The last `(text, loading)` pair published for a node.
    pub fn last_response(&self, node_id: &str) -> Option<(String, bool)> {
        self.responses(node_id).pop()
    }

    /// The last selection state published for a node.
    pub fn selection(&self, node_id: &str) -> Option<SelectionState> {
        self.calls().into_iter().rev().find_map(|c| match c {
            SinkCall::Selection { node_id: id, state } if id == node_id => Some(state),
            _ => None,
        })
    }

    /// The last state published for an edge.
    pub fn edge_state(&self, edge_id: &str) -> Option<EdgeExecutionState> {
        self.calls().into_iter().rev().find_map(|c| match c {
            SinkCall::Edge { edge_id: id, state } if id == edge_id => Some(state),
            _ => None,
        })
    }
}

impl ProgressSink for RecordingSink {
    fn set_node_response(&self, node_id: &str, text: &str, loading: bool) {
        lock(&self.calls).push(SinkCall::Response {
            node_id: node_id.to_string(),
            text: text.to_string(),
            loading,
        });
    }

    fn set_node_selection(&self, node_id: &str, state: SelectionState) {
        lock(&self.calls).push(SinkCall::Selection {
            node_id: node_id.to_string(),
            state,
        });
    }

    fn set_edge_state(&self, edge_id: &str, state: EdgeExecutionState) {
        lock(&self.calls).push(SinkCall::Edge {
            edge_id: edge_id.to_string(),
            state,
        });
    }
}

/// A throwaway model config for mocks.
pub fn test_model() -> ModelConfig {
    ModelConfig::new("mock", "mock-model")
}
