//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the AI endpoints and a health check under one Axum router. The
//! dashboard client calls these from the browser, hence the open CORS layer.

pub mod ai;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/ai/insights", post(ai::insights))
        .route("/api/ai/queue", get(ai::queue_stats))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
