use std::io::Write;

use cogflow_core::config::AppConfig;
use cogflow_core::error::CogflowError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[model]
provider = "openai"
model_id = "gpt-4o-mini"
api_key = "sk-test-key"
base_url = "http://localhost:11434/v1"
max_tokens = 2048
temperature = 0.5

[model.retry]
max_retries = 5
initial_backoff_ms = 200

[model.extra_headers]
X-Team = "research"

[branch_model]
provider = "service"
base_url = "http://localhost:8080/api"

[[fallback_models]]
provider = "groq"
model_id = "llama-3.1-8b-instant"

[engine]
event_capacity = 64

[log]
filter = "cogflow_engine=debug,warn"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.model.provider, "openai");
    assert_eq!(config.model.model_id, "gpt-4o-mini");
    assert_eq!(config.model.api_key, Some("sk-test-key".to_string()));
    assert_eq!(config.model.max_tokens, 2048);
    assert_eq!(config.model.extra_headers["X-Team"], "research");

    let retry = config.model.retry.as_ref().expect("retry present");
    assert_eq!(retry.max_retries, 5);
    assert_eq!(retry.initial_backoff_ms, 200);
    assert_eq!(retry.max_backoff_ms, 30000);

    assert_eq!(config.branch_model().provider, "service");
    assert_eq!(config.fallback_models.len(), 1);
    assert_eq!(config.engine.event_capacity, 64);
    assert_eq!(config.log.filter, "cogflow_engine=debug,warn");
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("COGFLOW_TEST_API_KEY", "expanded-key-value");

    let toml_content = r#"
[model]
model_id = "test-model"
api_key = "${COGFLOW_TEST_API_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.model.api_key, Some("expanded-key-value".to_string()));

    std::env::remove_var("COGFLOW_TEST_API_KEY");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml_content = r#"
[model]
model_id = "llama3.2"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.model.provider, "openai");
    assert_eq!(config.model.max_tokens, 4096);
    assert!(config.model.retry.is_none());
    assert!(config.branch_model.is_none());
    assert_eq!(config.branch_model().model_id, "llama3.2");
    assert!(config.fallback_models.is_empty());
    assert_eq!(config.engine.event_capacity, 1024);
    assert_eq!(config.log.filter, "info");
}

#[test]
fn test_missing_file_reported() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let err = AppConfig::load(&dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, CogflowError::ConfigNotFound(_)));
}

#[test]
fn test_invalid_toml_reported() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[model\nmodel_id = 1").expect("write toml");
    let err = AppConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, CogflowError::Config(_)));
}
