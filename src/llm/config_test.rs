use super::*;
use std::collections::HashMap;

fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn parse(pairs: &[(&str, &str)]) -> Result<LlmConfig, LlmError> {
    let vars = vars(pairs);
    LlmConfig::from_lookup(|key| vars.get(key).cloned())
}

#[test]
fn defaults_to_anthropic() {
    let cfg = parse(&[("LLM_API_KEY_ENV", "TEST_KEY"), ("TEST_KEY", "secret")]).unwrap();
    assert_eq!(cfg.provider, LlmProviderKind::Anthropic);
    assert_eq!(cfg.model, "claude-sonnet-4-5-20250929");
    assert_eq!(cfg.base_url, DEFAULT_ANTHROPIC_BASE_URL);
    assert_eq!(
        cfg.timeouts,
        LlmTimeouts { request_secs: DEFAULT_LLM_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_LLM_CONNECT_TIMEOUT_SECS }
    );
    assert_eq!(cfg.api_key, "secret");
}

#[test]
fn parses_openai_overrides() {
    let cfg = parse(&[
        ("LLM_PROVIDER", "openai"),
        ("LLM_API_KEY_ENV", "OPENAI_API_KEY"),
        ("OPENAI_API_KEY", "sk-test"),
        ("LLM_BASE_URL", "https://example.test/v1/"),
        ("LLM_REQUEST_TIMEOUT_SECS", "42"),
        ("LLM_CONNECT_TIMEOUT_SECS", "7"),
    ])
    .unwrap();
    assert_eq!(cfg.provider, LlmProviderKind::OpenAi);
    assert_eq!(cfg.model, "gpt-4o-mini");
    assert_eq!(cfg.base_url, "https://example.test/v1");
    assert_eq!(cfg.timeouts, LlmTimeouts { request_secs: 42, connect_secs: 7 });
}

#[test]
fn unknown_provider_errors() {
    let err = parse(&[("LLM_PROVIDER", "bad"), ("LLM_API_KEY_ENV", "TEST_KEY"), ("TEST_KEY", "secret")])
        .unwrap_err()
        .to_string();
    assert!(err.contains("unknown LLM_PROVIDER"));
}

#[test]
fn missing_key_var_names_the_variable() {
    assert_eq!(parse(&[]).unwrap_err(), LlmError::MissingApiKey { var: "LLM_API_KEY_ENV".into() });
    assert_eq!(
        parse(&[("LLM_API_KEY_ENV", "TEST_KEY"), ("TEST_KEY", "  ")]).unwrap_err(),
        LlmError::MissingApiKey { var: "TEST_KEY".into() }
    );
}
