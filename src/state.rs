//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! owns the one AI request queue for this process and the optional LLM
//! client. The queue is constructed here and passed around, never global,
//! so tests build isolated instances.

use std::sync::Arc;

use crate::llm::LlmChat;
use crate::queue::{QueueConfig, RequestQueue};

/// Shared application state. Clone is cheap: every field is shared.
#[derive(Clone)]
pub struct AppState {
    /// Optional LLM client. `None` if LLM env vars are not configured.
    pub llm: Option<Arc<dyn LlmChat>>,
    /// Serializes and paces every outbound LLM call.
    pub ai_queue: RequestQueue,
    /// Completion budget per insight request.
    pub ai_max_tokens: u32,
}

impl AppState {
    #[must_use]
    pub fn new(llm: Option<Arc<dyn LlmChat>>, queue_config: QueueConfig, ai_max_tokens: u32) -> Self {
        Self { llm, ai_queue: RequestQueue::new(queue_config), ai_max_tokens }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::llm::types::{ChatResponse, LlmError, Message};

    /// Queue config with short intervals so tests finish quickly.
    #[must_use]
    pub fn fast_queue_config() -> QueueConfig {
        QueueConfig {
            min_interval: Duration::from_millis(5),
            max_pending: 10,
            max_wait: Duration::from_secs(5),
            retry_delay: Duration::from_millis(1),
            exec_timeout: None,
        }
    }

    /// Create a test `AppState` without an LLM.
    #[must_use]
    pub fn test_app_state() -> AppState {
        AppState::new(None, fast_queue_config(), 512)
    }

    /// Create a test `AppState` with a mock LLM.
    #[must_use]
    pub fn test_app_state_with_llm(llm: Arc<dyn LlmChat>) -> AppState {
        AppState::new(Some(llm), fast_queue_config(), 512)
    }

    /// Mock LLM that replays canned results and records each prompt.
    pub struct MockLlm {
        replies: Mutex<Vec<Result<String, LlmError>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl MockLlm {
        #[must_use]
        pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self { replies: Mutex::new(replies), prompts: Mutex::new(Vec::new()) }
        }

        #[must_use]
        pub fn replying(text: &str) -> Self {
            Self::new(vec![Ok(text.to_string())])
        }

        #[must_use]
        pub fn throttled() -> Self {
            Self::new(vec![Err(LlmError::ApiResponse { status: 429, body: "rate_limit_error".into() })])
        }
    }

    #[async_trait::async_trait]
    impl LlmChat for MockLlm {
        async fn chat(&self, _max_tokens: u32, system: &str, messages: &[Message]) -> Result<ChatResponse, LlmError> {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(system.to_string());
            prompts.extend(messages.iter().map(|m| m.content.clone()));
            drop(prompts);

            let mut replies = self.replies.lock().unwrap();
            let next = if replies.is_empty() { Ok("{}".to_string()) } else { replies.remove(0) };
            next.map(|text| ChatResponse {
                text,
                model: "mock".into(),
                stop_reason: "end_turn".into(),
                input_tokens: 10,
                output_tokens: 5,
            })
        }
    }
}
