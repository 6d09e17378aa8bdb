use super::*;

fn make_response(content: serde_json::Value) -> String {
    serde_json::json!({
        "id": "msg_123",
        "type": "message",
        "role": "assistant",
        "content": content,
        "model": "claude-sonnet-4-5-20250929",
        "stop_reason": "end_turn",
        "usage": { "input_tokens": 100, "output_tokens": 50 }
    })
    .to_string()
}

#[test]
fn parse_text_response() {
    let json = make_response(serde_json::json!([
        { "type": "text", "text": "Revenue is up 12%" }
    ]));
    let resp = parse_response(&json).unwrap();
    assert_eq!(resp.text, "Revenue is up 12%");
    assert_eq!(resp.model, "claude-sonnet-4-5-20250929");
    assert_eq!(resp.stop_reason, "end_turn");
    assert_eq!(resp.input_tokens, 100);
    assert_eq!(resp.output_tokens, 50);
}

#[test]
fn parse_joins_text_blocks_and_skips_thinking() {
    let json = make_response(serde_json::json!([
        { "type": "thinking", "thinking": "Let me total the sales..." },
        { "type": "text", "text": "{\"summary\":" },
        { "type": "text", "text": "\"ok\"}" }
    ]));
    let resp = parse_response(&json).unwrap();
    assert_eq!(resp.text, "{\"summary\":\n\"ok\"}");
}

#[test]
fn parse_missing_stop_reason_defaults() {
    let json = serde_json::json!({
        "content": [],
        "model": "claude",
        "usage": { "input_tokens": 1, "output_tokens": 0 }
    })
    .to_string();
    let resp = parse_response(&json).unwrap();
    assert!(resp.text.is_empty());
    assert_eq!(resp.stop_reason, "end_turn");
}

#[test]
fn parse_invalid_json() {
    let err = parse_response("not json").unwrap_err();
    assert!(matches!(err, LlmError::ApiParse(_)));
}

#[test]
fn request_body_shape() {
    let messages = [Message::user("hello")];
    let body = ApiRequest { model: "m", max_tokens: 16, system: "sys", messages: &messages };
    let json = serde_json::to_value(&body).unwrap();
    assert_eq!(json["system"], "sys");
    assert_eq!(json["max_tokens"], 16);
    assert_eq!(json["messages"][0]["role"], "user");
}
