//! AI insight routes.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::error::{ErrorBody, ErrorCode};
use crate::llm::types::LlmError;
use crate::queue::{QueueError, QueueStats};
use crate::services::insights::{self, InsightError, InsightRequest, InsightResponse};
use crate::state::AppState;

/// `POST /api/ai/insights`: generate insights from POS context.
pub async fn insights(
    State(state): State<AppState>,
    Json(body): Json<InsightRequest>,
) -> Result<Json<InsightResponse>, ApiError> {
    let response = insights::generate(&state, body).await?;
    Ok(Json(response))
}

/// `GET /api/ai/queue`: snapshot of the AI request queue.
pub async fn queue_stats(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.ai_queue.stats())
}

// =============================================================================
// ERRORS
// =============================================================================

/// Insight failure rendered as `{ code, message, retryable }`.
#[derive(Debug)]
pub struct ApiError(InsightError);

impl From<InsightError> for ApiError {
    fn from(e: InsightError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = insight_error_to_status(&self.0);
        warn!(code = self.0.error_code(), %status, error = %self.0, "ai route failed");
        (status, Json(ErrorBody::from_error(&self.0))).into_response()
    }
}

pub(crate) fn insight_error_to_status(err: &InsightError) -> StatusCode {
    match err {
        InsightError::LlmNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        InsightError::Queue(QueueError::Full { .. } | QueueError::Expired { .. }) => StatusCode::TOO_MANY_REQUESTS,
        InsightError::Queue(QueueError::ExecutionTimeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
        InsightError::Queue(QueueError::Dropped) => StatusCode::INTERNAL_SERVER_ERROR,
        InsightError::Llm(e) if e.is_rate_limited() => StatusCode::TOO_MANY_REQUESTS,
        InsightError::Llm(LlmError::ConfigParse(_) | LlmError::MissingApiKey { .. } | LlmError::HttpClientBuild(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        InsightError::Llm(_) => StatusCode::BAD_GATEWAY,
    }
}

#[cfg(test)]
#[path = "ai_test.rs"]
mod tests;
