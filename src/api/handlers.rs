//! HTTP request handlers

use super::types::{
    ChatRequest, ChatResponse, ConversationCreatedResponse, ConversationListResponse,
    ErrorResponse, ExportQuery, HealthResponse, ModelsResponse, SuccessResponse,
};
use super::ws::ws_handler;
use super::AppState;
use crate::llm::ModelSelector;
use crate::orchestrator::TurnError;
use crate::store::{export_session, ExportFormat, Session, SessionStore, StoreError};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use std::path::PathBuf;
use tower_http::services::ServeDir;

/// Create the API router. Unmatched paths are served from `static_dir` when set.
pub fn create_router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let router = Router::new()
        // Real-time chat
        .route("/ws", get(ws_handler))
        .route("/api/health", get(health))
        .route("/api/models", get(list_models))
        // Non-streaming chat
        .route("/api/chat", post(chat))
        // Conversation CRUD
        .route("/api/conversations", get(list_conversations))
        .route("/api/conversations/new", post(create_conversation))
        .route("/api/conversations/clear", post(clear_conversations))
        .route(
            "/api/conversations/:id",
            get(get_conversation).delete(delete_conversation),
        )
        .route("/api/conversations/:id/export", get(export_conversation))
        .route("/version", get(get_version))
        .with_state(state);

    match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    }
}

/// Resolve a requested model id, defaulting when absent
pub(super) fn resolve_model(state: &AppState, requested: Option<&str>) -> Result<ModelSelector, AppError> {
    match requested {
        None | Some("") => Ok(state.registry().default_model()),
        Some(id) => id.parse().map_err(AppError::BadRequest),
    }
}

// ============================================================
// Health & Models
// ============================================================

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
        hosted_available: state.registry().has_hosted(),
        local_available: state.registry().has_local(),
    })
}

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.registry().available_model_info(),
        default: state.registry().default_model().id().to_string(),
    })
}

async fn get_version() -> &'static str {
    concat!("chat-relay ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Chat
// ============================================================

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(req) = payload?;
    let model = resolve_model(&state, req.model.as_deref())?;
    let (session_id, turn) = state
        .orchestrator
        .complete(req.session_id, &req.message, model)
        .await?;

    Ok(Json(ChatResponse {
        session_id,
        model: turn.model.unwrap_or_else(|| model.id().to_string()),
        response: turn.text,
        timestamp: turn.timestamp,
    }))
}

// ============================================================
// Conversations
// ============================================================

async fn list_conversations(
    State(state): State<AppState>,
) -> Result<Json<ConversationListResponse>, AppError> {
    let conversations = state.store().list().await?;
    Ok(Json(ConversationListResponse {
        count: conversations.len(),
        conversations,
    }))
}

async fn create_conversation(
    State(state): State<AppState>,
) -> Result<Json<ConversationCreatedResponse>, AppError> {
    let conversation = state.store().create().await?;
    Ok(Json(ConversationCreatedResponse {
        session_id: conversation.session_id.clone(),
        conversation,
    }))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, AppError> {
    Ok(Json(state.store().get(&id).await?))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.store().delete(&id).await?;
    Ok(Json(SuccessResponse::new("Conversation deleted successfully")))
}

async fn clear_conversations(
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.store().clear().await?;
    Ok(Json(SuccessResponse::new("All conversations cleared")))
}

async fn export_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let format: ExportFormat = match query.format.as_deref() {
        Some(f) => f.parse().map_err(AppError::BadRequest)?,
        None => ExportFormat::default(),
    };

    let session = state.store().get(&id).await?;
    let body = export_session(&session, format).map_err(|e| AppError::Internal(e.to_string()))?;
    let disposition = format!(
        "attachment; filename=\"conversation_{id}.{}\"",
        format.extension()
    );

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
pub(super) enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
    /// Every backend failed or the reply broke off
    BadGateway(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::Internal(msg)
            | AppError::BadGateway(msg) => f.write_str(msg),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => AppError::NotFound(e.to_string()),
            StoreError::InvalidSessionId(_) => AppError::BadRequest(e.to_string()),
            StoreError::Io(_) | StoreError::Serialization(_) => {
                tracing::error!(error = %e, "Storage failure");
                AppError::Internal(e.to_string())
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        AppError::BadRequest(e.body_text())
    }
}

impl From<TurnError> for AppError {
    fn from(e: TurnError) -> Self {
        match e {
            TurnError::EmptyMessage => AppError::BadRequest(e.to_string()),
            TurnError::Store(inner) => inner.into(),
            TurnError::AllProvidersFailed { .. } | TurnError::StreamInterrupted(_) => {
                AppError::BadGateway(e.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
