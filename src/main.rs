mod config;
mod error;
mod llm;
mod queue;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let config = config::AppConfig::from_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Non-fatal: AI routes answer 503 until an LLM is configured.
    let llm: Option<Arc<dyn llm::LlmChat>> = match llm::LlmClient::from_env() {
        Ok(client) => {
            tracing::info!(model = client.model(), "LLM client initialized");
            Some(Arc::new(client))
        }
        Err(e) => {
            tracing::warn!(error = %e, "LLM client not configured; AI features disabled");
            None
        }
    };

    let queue = config.queue;
    tracing::info!(
        min_interval = ?queue.min_interval,
        max_pending = queue.max_pending,
        max_wait = ?queue.max_wait,
        exec_timeout = ?queue.exec_timeout,
        "AI request queue configured"
    );

    let state = state::AppState::new(llm, queue, config.ai_max_tokens);
    let app = routes::app(state);

    let port = config.port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "pos-insights listening");
    axum::serve(listener, app).await.expect("server failed");
}
