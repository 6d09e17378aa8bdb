use super::*;
use crate::error::ErrorCode;

#[test]
fn rate_limited_only_for_429() {
    assert!(LlmError::ApiResponse { status: 429, body: String::new() }.is_rate_limited());
    assert!(!LlmError::ApiResponse { status: 503, body: String::new() }.is_rate_limited());
    assert!(!LlmError::ApiRequest("reset".into()).is_rate_limited());
}

#[test]
fn error_codes_distinguish_throttling() {
    let throttled = LlmError::ApiResponse { status: 429, body: "slow down".into() };
    assert_eq!(throttled.error_code(), "E_LLM_RATE_LIMITED");
    assert!(throttled.retryable());

    let bad_request = LlmError::ApiResponse { status: 400, body: String::new() };
    assert_eq!(bad_request.error_code(), "E_API_RESPONSE");
    assert!(!bad_request.retryable());

    assert!(LlmError::ApiResponse { status: 502, body: String::new() }.retryable());
    assert!(!LlmError::ApiParse("eof".into()).retryable());
}

#[test]
fn message_serializes_lowercase_role() {
    let json = serde_json::to_value(Message::user("hi")).unwrap();
    assert_eq!(json, serde_json::json!({ "role": "user", "content": "hi" }));
}
