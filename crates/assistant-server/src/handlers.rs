//! HTTP Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use assistant_core::{AssistantError, LlmProvider, Message, ModelInfo, ToolDefinition, TurnOptions};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub provider: String,
    pub provider_connected: bool,
    pub capabilities: usize,
    pub active_sessions: usize,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub max_iterations: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub session_id: String,
    pub message_count: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub active_sessions: usize,
    pub session_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub message_count: usize,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// HTTP status for an assistant error
pub const fn error_status(err: &AssistantError) -> StatusCode {
    match err {
        AssistantError::Validation(_) => StatusCode::BAD_REQUEST,
        AssistantError::DuplicateCapability(_) => StatusCode::CONFLICT,
        AssistantError::CapabilityNotFound(_) => StatusCode::NOT_FOUND,
        AssistantError::MaxIterationsExceeded(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AssistantError::Cancelled => StatusCode::REQUEST_TIMEOUT,
        AssistantError::Provider(_) => StatusCode::BAD_GATEWAY,
        AssistantError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AssistantError::CapabilityExecution(_)
        | AssistantError::Config(_)
        | AssistantError::Json(_)
        | AssistantError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(err: &AssistantError) -> ApiError {
    let status = error_status(err);
    if status.is_server_error() {
        tracing::error!("Assistant error: {}", err);
    } else {
        tracing::warn!("Request rejected: {}", err);
    }

    (
        status,
        Json(ErrorResponse {
            error: err.user_message(),
            code: err.code().into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let orchestrator = &state.orchestrator;
    let provider_connected = orchestrator.provider().health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        provider: orchestrator.provider().name().to_string(),
        provider_connected,
        capabilities: orchestrator.registry().count(),
        active_sessions: orchestrator.active_session_count(),
    })
}

/// List models the provider can serve
pub async fn list_models(State(state): State<AppState>) -> Result<Json<Vec<ModelInfo>>, ApiError> {
    state
        .orchestrator
        .provider()
        .list_models()
        .await
        .map(Json)
        .map_err(|e| api_error(&e))
}

/// Tool catalogue offered to the model
pub async fn list_capabilities(State(state): State<AppState>) -> Json<Vec<ToolDefinition>> {
    let mut definitions = state.orchestrator.registry().to_tool_definitions();
    definitions.sort_by(|a, b| a.name.cmp(&b.name));
    Json(definitions)
}

/// Run one turn of the tool-calling loop
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let session_id = payload
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut options = TurnOptions::new();
    if let Some(prompt) = payload.system_prompt {
        options = options.system_prompt(prompt);
    }
    if let Some(max) = payload.max_iterations {
        let limit = state.orchestrator.config().max_iterations;
        if max > limit {
            return Err(api_error(&AssistantError::Validation(format!(
                "max_iterations must not exceed {limit}"
            ))));
        }
        options = options.max_iterations(max);
    }

    let message = state
        .orchestrator
        .process_input(&session_id, &payload.message, options)
        .await
        .map_err(|e| api_error(&e))?;

    Ok(Json(ChatResponse {
        message,
        message_count: state.orchestrator.message_count(&session_id),
        session_id,
    }))
}

/// Active sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionsResponse> {
    let session_ids = state
        .orchestrator
        .sessions()
        .ids()
        .into_iter()
        .map(|id| id.to_string())
        .collect();

    Json(SessionsResponse {
        active_sessions: state.orchestrator.active_session_count(),
        session_ids,
    })
}

/// Drop every session history
pub async fn clear_sessions(State(state): State<AppState>) -> StatusCode {
    state.orchestrator.clear_all_histories();
    StatusCode::NO_CONTENT
}

/// One session's history; unknown sessions read as empty
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<SessionResponse> {
    let messages = state.orchestrator.history(&session_id);

    Json(SessionResponse {
        message_count: messages.len(),
        messages,
        session_id,
    })
}

/// Drop one session's history
pub async fn clear_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<ClearResponse> {
    Json(ClearResponse {
        cleared: state.orchestrator.clear_history(&session_id),
    })
}
