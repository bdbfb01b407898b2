use std::sync::Arc;

use futures::future::BoxFuture;
use futures::StreamExt;
use serde::Deserialize;
use tracing::warn;

use cogflow_core::config::ModelConfig;
use cogflow_core::error::{CogflowError, Result};
use cogflow_core::traits::{BranchSelector, LlmClient};
use cogflow_core::types::{BranchDecision, BranchRequest, ChatMessage, StreamDelta};

/// Branch selection answered by a language model.
///
/// The conversation so far is replayed, followed by a user turn listing the
/// candidate children and asking for a JSON verdict.
pub struct LlmBranchSelector {
    llm: Arc<dyn LlmClient>,
    config: ModelConfig,
}

impl LlmBranchSelector {
    pub fn new(llm: Arc<dyn LlmClient>, config: ModelConfig) -> Self {
        Self { llm, config }
    }
}

/// Build the instruction turn appended to the transcript.
pub(crate) fn selection_prompt(request: &BranchRequest) -> String {
    let options = request
        .children
        .iter()
        .map(|c| {
            if c.prompt.is_empty() {
                format!("- id: {}\n  label: {}", c.id, c.label)
            } else {
                format!("- id: {}\n  label: {}\n  prompt: {}", c.id, c.label, c.prompt)
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Based on the conversation above, choose exactly one of the following next steps.

Criterion: {}

Options:
{}

Respond with ONLY valid JSON:
{{
  "selectedChildId": "<one of the option ids>",
  "reasoning": "brief explanation"
}}"#,
        request.condition_prompt, options,
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectionResponse {
    selected_child_id: String,
    #[serde(default)]
    reasoning: String,
}

/// Parse a decision from model output, tolerating prose and code fences
/// around the JSON object.
pub(crate) fn parse_decision(response: &str) -> Result<BranchDecision> {
    let json_str = extract_json(response);
    match serde_json::from_str::<SelectionResponse>(json_str) {
        Ok(resp) => Ok(BranchDecision {
            selected_child_id: resp.selected_child_id.trim().to_string(),
            reasoning: resp.reasoning,
        }),
        Err(e) => {
            warn!(error = %e, response = %response, "Failed to parse branch selection");
            Err(CogflowError::LlmParse(e.to_string()))
        }
    }
}

/// Extract the outermost `{...}` span from text.
fn extract_json(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text.trim(),
    }
}

impl BranchSelector for LlmBranchSelector {
    fn select(&self, request: BranchRequest) -> BoxFuture<'_, Result<BranchDecision>> {
        Box::pin(async move {
            let mut messages = request.messages.clone();
            messages.push(ChatMessage::user(selection_prompt(&request)));

            let mut stream = self
                .llm
                .chat_stream(&self.config, messages)
                .await
                .map_err(|e| CogflowError::BranchSelection(e.to_string()))?;

            let mut response_text = String::new();
            while let Some(delta) = stream.next().await {
                match delta {
                    Ok(StreamDelta::TextDelta(text)) => response_text.push_str(&text),
                    Ok(_) => {}
                    Err(e) => return Err(CogflowError::BranchSelection(e.to_string())),
                }
            }

            parse_decision(&response_text)
        })
    }
}
