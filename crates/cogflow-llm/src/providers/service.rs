use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use cogflow_core::config::ModelConfig;
use cogflow_core::error::{CogflowError, Result};
use cogflow_core::traits::{BranchSelector, LlmClient};
use cogflow_core::types::*;

use crate::streaming::Utf8Chunker;

const GENERATE_PATH: &str = "/generate";
const CHOOSE_PATH: &str = "/choose";

/// Client for a flow service exposing `/generate` and `/choose`.
///
/// `/generate` takes `{messages}` and streams the answer as plain text;
/// `/choose` takes `{messages, conditionPrompt, children}` and returns
/// `{selectedChildId, reasoning}`.
pub struct ServiceClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    messages: &'a [ChatMessage],
}

impl ServiceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    /// Build a client from the `base_url` and `api_key` of a model config.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let base_url = config.base_url.as_deref().ok_or_else(|| {
            CogflowError::Config("provider \"service\" requires model.base_url".into())
        })?;
        Ok(Self::new(base_url).with_api_key(config.api_key.clone()))
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.post(format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        req
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown".to_string());
    Err(CogflowError::LlmRequest(format!("HTTP {}: {}", status, body)))
}

impl LlmClient for ServiceClient {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        Box::pin(async move {
            let response = self
                .post(GENERATE_PATH)
                .json(&GenerateRequest {
                    messages: &messages,
                })
                .send()
                .await
                .map_err(|e| CogflowError::LlmRequest(e.to_string()))?;
            let response = check_status(response).await?;

            let mut decoder = Utf8Chunker::new();
            let deltas = response.bytes_stream().filter_map(move |chunk| {
                let delta = match chunk {
                    Ok(bytes) => match decoder.push(&bytes) {
                        Ok(text) if text.is_empty() => None,
                        Ok(text) => Some(Ok(StreamDelta::TextDelta(text))),
                        Err(e) => Some(Err(e)),
                    },
                    Err(e) => Some(Err(CogflowError::LlmStream(e.to_string()))),
                };
                futures::future::ready(delta)
            });

            Ok(Box::pin(deltas) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

impl BranchSelector for ServiceClient {
    fn select(&self, request: BranchRequest) -> BoxFuture<'_, Result<BranchDecision>> {
        Box::pin(async move {
            debug!(
                children = request.children.len(),
                "Requesting branch selection from service"
            );
            let response = self
                .post(CHOOSE_PATH)
                .json(&request)
                .send()
                .await
                .map_err(|e| CogflowError::BranchSelection(e.to_string()))?;
            let response = check_status(response)
                .await
                .map_err(|e| CogflowError::BranchSelection(e.to_string()))?;

            response
                .json::<BranchDecision>()
                .await
                .map_err(|e| CogflowError::BranchSelection(format!("malformed response: {}", e)))
        })
    }
}
