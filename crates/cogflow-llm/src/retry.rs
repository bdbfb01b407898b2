use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use rand::Rng;
use tracing::{debug, info, warn};

use cogflow_core::config::{ModelConfig, RetryConfig};
use cogflow_core::error::{CogflowError, Result};
use cogflow_core::traits::LlmClient;
use cogflow_core::types::*;

/// An LLM client that retries transient failures and then moves down a
/// chain of fallback models.
///
/// Every model in the chain gets the same retry budget. Only opening the
/// stream is retried; once deltas flow, a mid-stream error is surfaced to
/// the caller as-is. When the whole chain fails the primary's error is
/// returned.
pub struct RetryingClient {
    primary: Box<dyn LlmClient>,
    fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(
        primary: Box<dyn LlmClient>,
        fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            retry_config,
        }
    }
}

/// What to do after a model failed to open a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    /// Transient: ask the same model again after a backoff.
    Retry,
    /// The same request will fail the same way; move to the next model.
    NextModel,
}

/// The status code of an `HTTP <code> ...: <body>` request error.
fn http_status(msg: &str) -> Option<u16> {
    let rest = msg.strip_prefix("HTTP ")?;
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

fn classify(e: &CogflowError) -> Disposition {
    match e {
        CogflowError::LlmRequest(msg) => match http_status(msg) {
            // Request timeout, too early, rate limited, server side
            Some(408 | 425 | 429) | Some(500..=599) => Disposition::Retry,
            Some(_) => Disposition::NextModel,
            // No status means the request never got an answer
            None => Disposition::Retry,
        },
        CogflowError::LlmStream(_) => Disposition::Retry,
        _ => Disposition::NextModel,
    }
}

/// Delay before retry number `retry` (zero based): doubling from the
/// initial backoff, capped, with 20% jitter either way.
fn backoff_delay(retry: u32, config: &RetryConfig) -> Duration {
    let ms = 2u64
        .checked_pow(retry)
        .and_then(|factor| config.initial_backoff_ms.checked_mul(factor))
        .unwrap_or(u64::MAX)
        .min(config.max_backoff_ms);
    let jitter = rand::thread_rng().gen_range(0.8..=1.2);
    Duration::from_millis((ms as f64 * jitter) as u64)
}

/// Open a stream on one model, retrying transient failures.
async fn open_with_retries<'a>(
    client: &'a dyn LlmClient,
    model: &ModelConfig,
    messages: &[ChatMessage],
    retry_config: &RetryConfig,
) -> Result<BoxStream<'a, Result<StreamDelta>>> {
    let mut retry = 0;
    loop {
        let err = match client.chat_stream(model, messages.to_vec()).await {
            Ok(stream) => return Ok(stream),
            Err(e) => e,
        };
        let disposition = classify(&err);
        if disposition == Disposition::NextModel || retry >= retry_config.max_retries {
            debug!(
                model = %model.model_id,
                attempts = retry + 1,
                ?disposition,
                error = %err,
                "Giving up on model"
            );
            return Err(err);
        }

        let delay = backoff_delay(retry, retry_config);
        warn!(
            model = %model.model_id,
            attempt = retry + 1,
            max_retries = retry_config.max_retries,
            backoff_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying LLM request"
        );
        tokio::time::sleep(delay).await;
        retry += 1;
    }
}

impl LlmClient for RetryingClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();

        Box::pin(async move {
            let primary_err =
                match open_with_retries(self.primary.as_ref(), &config, &messages, &self.retry_config)
                    .await
                {
                    Ok(stream) => return Ok(stream),
                    Err(e) => e,
                };

            for (fb_config, fb_client) in &self.fallbacks {
                info!(
                    from = %config.model_id,
                    to = %fb_config.model_id,
                    provider = %fb_config.provider,
                    "Falling back to alternative model"
                );
                match open_with_retries(fb_client.as_ref(), fb_config, &messages, &self.retry_config)
                    .await
                {
                    Ok(stream) => return Ok(stream),
                    Err(e) => warn!(model = %fb_config.model_id, error = %e, "Fallback model failed"),
                }
            }

            Err(primary_err)
        })
    }
}
