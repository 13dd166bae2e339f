//! Personal assistant HTTP server
//!
//! Axum-based REST API in front of the tool-calling orchestrator, backed by a
//! local Ollama model and the built-in capabilities.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use assistant_core::{CapabilityRegistry, LlmProvider, Orchestrator, OrchestratorConfig};
use assistant_runtime::OllamaProvider;

use crate::handlers::{
    chat_handler, clear_session, clear_sessions, get_session, health_check, list_capabilities,
    list_models, list_sessions,
};
use crate::state::AppState;

/// Routes, CORS and request tracing around the shared state
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/health", get(health_check))
        .route("/api/models", get(list_models))
        .route("/api/capabilities", get(list_capabilities))

        // Assistant API
        .route("/api/chat", post(chat_handler))
        .route("/api/sessions", get(list_sessions).delete(clear_sessions))
        .route("/api/sessions/{id}", get(get_session).delete(clear_session))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment before reading RUST_LOG
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Initialize LLM provider
    let provider = Arc::new(OllamaProvider::from_env()?);
    tracing::info!("Ollama endpoint: {}", provider.config().base_url());

    // Verify Ollama connection
    match provider.health_check().await {
        Ok(true) => {
            tracing::info!("✓ Connected to Ollama");
            if let Ok(models) = provider.list_models().await {
                for model in models {
                    tracing::info!("  Model: {}", model.id);
                }
            }
        }
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ Ollama not available - chat requests will fail");
            tracing::warn!("  Make sure Ollama is running: ollama serve");
        }
    }

    // Initialize capabilities
    let registry = Arc::new(CapabilityRegistry::new());
    assistant_capabilities::register_defaults(&registry)?;
    for name in registry.names() {
        tracing::info!("  • {}", name);
    }

    let orchestrator = Orchestrator::builder()
        .provider(provider)
        .registry(registry)
        .config(OrchestratorConfig::from_env())
        .build()?;
    tracing::info!(
        max_iterations = orchestrator.config().max_iterations,
        "Orchestrator ready"
    );

    let app = build_router(AppState::new(orchestrator));

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 assistant server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET    /health             - Health check");
    tracing::info!("  GET    /api/models         - List available models");
    tracing::info!("  GET    /api/capabilities   - List registered capabilities");
    tracing::info!("  POST   /api/chat           - Send message");
    tracing::info!("  GET    /api/sessions       - Active sessions");
    tracing::info!("  DELETE /api/sessions       - Clear all sessions");
    tracing::info!("  GET    /api/sessions/{{id}}  - Session history");
    tracing::info!("  DELETE /api/sessions/{{id}}  - Clear one session");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutting down");
}
