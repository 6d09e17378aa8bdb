use super::*;
use std::collections::HashMap;
use std::time::Duration;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn defaults_when_nothing_set() {
    let cfg = AppConfig::from_lookup(lookup_from(&[]));
    assert_eq!(cfg.port, DEFAULT_PORT);
    assert_eq!(cfg.rust_log, "info");
    assert_eq!(cfg.ai_max_tokens, DEFAULT_AI_MAX_TOKENS);
    assert_eq!(cfg.queue, QueueConfig::default());
}

#[test]
fn overrides_are_parsed() {
    let cfg = AppConfig::from_lookup(lookup_from(&[
        ("PORT", "8080"),
        ("RUST_LOG", "debug,hyper=warn"),
        ("AI_MAX_TOKENS", "2048"),
        ("QUEUE_MIN_INTERVAL_MS", "500"),
    ]));
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.rust_log, "debug,hyper=warn");
    assert_eq!(cfg.ai_max_tokens, 2048);
    assert_eq!(cfg.queue.min_interval, Duration::from_millis(500));
}

#[test]
fn malformed_values_fall_back() {
    let cfg = AppConfig::from_lookup(lookup_from(&[("PORT", "not-a-port"), ("AI_MAX_TOKENS", "-1")]));
    assert_eq!(cfg.port, DEFAULT_PORT);
    assert_eq!(cfg.ai_max_tokens, DEFAULT_AI_MAX_TOKENS);
}

#[test]
fn parse_or_trims_whitespace() {
    assert_eq!(parse_or::<u64>(Some(" 42 "), 1), 42);
    assert_eq!(parse_or::<u64>(None, 1), 1);
}
