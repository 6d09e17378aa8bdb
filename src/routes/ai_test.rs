use super::*;
use crate::state::test_helpers::{self, MockLlm};
use std::sync::Arc;

fn request_body() -> InsightRequest {
    serde_json::from_value(serde_json::json!({
        "kind": "restock",
        "sales": [{ "product_id": "p1", "quantity": 3, "unit_price": 4.5 }],
        "products": [{
            "id": "p1",
            "name": "Oat Milk",
            "category": "Dairy",
            "stock": 1,
            "reorder_level": 6,
            "cost_price": 2.0
        }]
    }))
    .unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[test]
fn status_mapping() {
    assert_eq!(insight_error_to_status(&InsightError::LlmNotConfigured), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        insight_error_to_status(&InsightError::Queue(QueueError::Full { capacity: 10 })),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(
        insight_error_to_status(&InsightError::Queue(QueueError::ExecutionTimeout { timeout_ms: 5 })),
        StatusCode::GATEWAY_TIMEOUT
    );
    assert_eq!(
        insight_error_to_status(&InsightError::Llm(LlmError::ApiResponse { status: 429, body: String::new() })),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(
        insight_error_to_status(&InsightError::Llm(LlmError::ApiResponse { status: 500, body: String::new() })),
        StatusCode::BAD_GATEWAY
    );
    assert_eq!(
        insight_error_to_status(&InsightError::Llm(LlmError::ApiRequest("reset".into()))),
        StatusCode::BAD_GATEWAY
    );
}

#[tokio::test]
async fn insights_returns_parsed_reply() {
    let llm = MockLlm::replying(
        r#"{"summary":"Oat milk is running out","insights":[{"title":"Reorder oat milk","priority":"high"}]}"#,
    );
    let state = test_helpers::test_app_state_with_llm(Arc::new(llm));

    let Json(response) = insights(State(state), Json(request_body())).await.unwrap();
    assert_eq!(response.summary, "Oat milk is running out");
    assert_eq!(response.insights.len(), 1);
    assert_eq!(response.stats.low_stock.len(), 1);
    assert!(!response.fallback);
}

#[tokio::test]
async fn insights_without_llm_renders_503_body() {
    let state = test_helpers::test_app_state();
    let err = insights(State(state), Json(request_body())).await.unwrap_err();

    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["code"], "E_LLM_NOT_CONFIGURED");
    assert_eq!(body["retryable"], false);
    assert_eq!(body["message"], "LLM not configured");
}

#[tokio::test]
async fn queue_stats_reports_dispatches() {
    let state = test_helpers::test_app_state_with_llm(Arc::new(MockLlm::replying("fine")));
    let Json(served) = insights(State(state.clone()), Json(request_body())).await.unwrap();
    assert!(!served.fallback);

    let Json(stats) = queue_stats(State(state)).await;
    assert_eq!(stats.dispatched, 1);
    assert_eq!(stats.capacity, 10);
    assert_eq!(stats.rejected, 0);
}

#[tokio::test]
async fn router_builds_with_state() {
    let _router = crate::routes::app(test_helpers::test_app_state());
}
