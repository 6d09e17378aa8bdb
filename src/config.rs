//! Process configuration parsed from environment variables.
//!
//! Every knob has a typed default; unparsable values fall back to the default
//! rather than aborting startup. LLM settings live in `llm::config` because a
//! missing key there disables AI instead of falling back.

use std::str::FromStr;

use crate::queue::QueueConfig;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_AI_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_RUST_LOG: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub rust_log: String,
    pub ai_max_tokens: u32,
    pub queue: QueueConfig,
}

impl AppConfig {
    /// Build config from environment variables.
    ///
    /// - `PORT`: default 3000
    /// - `RUST_LOG`: tracing filter, default `info`
    /// - `AI_MAX_TOKENS`: completion budget per insight request, default 1024
    /// - `QUEUE_*`: see `QueueConfig::from_lookup`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            port: parse_or(lookup("PORT").as_deref(), DEFAULT_PORT),
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| DEFAULT_RUST_LOG.to_string()),
            ai_max_tokens: parse_or(lookup("AI_MAX_TOKENS").as_deref(), DEFAULT_AI_MAX_TOKENS),
            queue: QueueConfig::from_lookup(&lookup),
        }
    }
}

/// Parse `raw`, falling back to `default` when absent or malformed.
pub(crate) fn parse_or<T: FromStr>(raw: Option<&str>, default: T) -> T {
    raw.and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
