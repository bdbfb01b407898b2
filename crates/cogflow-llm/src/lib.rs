pub mod branch;
pub mod providers;
pub mod retry;
pub mod streaming;

use std::sync::Arc;

use cogflow_core::config::{AppConfig, ModelConfig};
use cogflow_core::error::{CogflowError, Result};
use cogflow_core::traits::{BranchSelector, LlmClient};

pub use branch::LlmBranchSelector;
pub use providers::openai::OpenAiClient;
pub use providers::service::ServiceClient;
pub use retry::RetryingClient;

/// Create an LLM client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider.as_str() {
        "service" => Ok(Box::new(ServiceClient::from_config(config)?)),
        "openai" | "ollama" | "vllm" | "groq" | "openrouter" | "compatible" => {
            Ok(Box::new(OpenAiClient::new()))
        }
        other => Err(CogflowError::UnsupportedProvider(other.to_string())),
    }
}

/// Create the text-generation client for an app config, wrapped with retries
/// and fallbacks when the model config asks for them.
pub fn create_generator(config: &AppConfig) -> Result<Arc<dyn LlmClient>> {
    let primary = create_client(&config.model)?;
    if config.model.retry.is_none() && config.fallback_models.is_empty() {
        return Ok(Arc::from(primary));
    }

    let fallbacks = config
        .fallback_models
        .iter()
        .map(|fb| Ok((fb.clone(), create_client(fb)?)))
        .collect::<Result<Vec<_>>>()?;
    let retry = config.model.retry.clone().unwrap_or_default();
    Ok(Arc::new(RetryingClient::new(primary, fallbacks, retry)))
}

/// Create the branch selector for an app config.
///
/// A `service` branch model talks to the service's `/choose` endpoint; any
/// other provider answers through `llm` with a JSON prompt.
pub fn create_selector(
    config: &AppConfig,
    llm: Arc<dyn LlmClient>,
) -> Result<Arc<dyn BranchSelector>> {
    let model = config.branch_model();
    match model.provider.as_str() {
        "service" => Ok(Arc::new(ServiceClient::from_config(model)?)),
        _ => {
            // A dedicated branch model may use a different provider
            let llm = if config.branch_model.is_some() {
                Arc::from(create_client(model)?)
            } else {
                llm
            };
            Ok(Arc::new(LlmBranchSelector::new(llm, model.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_rejected() {
        let config = ModelConfig::new("carrier-pigeon", "m");
        assert!(matches!(
            create_client(&config),
            Err(CogflowError::UnsupportedProvider(p)) if p == "carrier-pigeon"
        ));
    }

    #[test]
    fn test_service_selector_needs_base_url() {
        let config = AppConfig::from_toml(
            r#"
[model]
provider = "service"
base_url = "http://flow.local"
"#,
        )
        .unwrap();
        let llm = create_generator(&config).unwrap();
        assert!(create_selector(&config, llm).is_ok());

        let config = AppConfig::from_toml("[model]\nprovider = \"service\"\n").unwrap();
        assert!(create_generator(&config).is_err());
    }

    #[test]
    fn test_generator_with_retry() {
        let config = AppConfig::from_toml(
            r#"
[model]
model_id = "gpt-4o-mini"

[model.retry]
max_retries = 1
"#,
        )
        .unwrap();
        assert!(create_generator(&config).is_ok());
    }
}
