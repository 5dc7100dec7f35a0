//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `POST /v1/chat`            — Run one chat turn, streamed as `text/event-stream`
//! - `GET  /v1/tools`           — List available tools
//! - `POST /v1/tools/execute`   — Run one tool: `{tool_name, input}` → `{result, duration_ms}`
//! - `GET  /v1/memory`          — Long-term memories of the caller
//! - `POST /v1/memory/extract`  — Extract memories from recent messages (detached)
//! - `GET  /v1/settings`        — Caller's settings
//! - `PUT  /v1/settings`        — Update the caller's settings
//! - `GET  /v1/modes`           — Caller's custom modes
//! - `POST /v1/modes`           — Create a custom mode

use axum::{
    Extension, Router,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use neonchat_agent::TurnRequest;
use neonchat_core::memory::MemoryItem;
use neonchat_core::message::Message;
use neonchat_core::settings::{CustomMode, ResponseStyle, UserSettings};

use crate::{Caller, SharedState};

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router; the
/// handlers expect a [`Caller`] extension.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/tools", get(list_tools_handler))
        .route("/tools/execute", post(execute_tool_handler))
        .route("/memory", get(list_memory_handler))
        .route("/memory/extract", post(extract_memory_handler))
        .route("/settings", get(get_settings_handler).put(update_settings_handler))
        .route("/modes", get(list_modes_handler).post(create_mode_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn bad_body(rejection: JsonRejection) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, rejection.body_text())
}

fn require_user(caller: &Caller) -> Result<&str, ApiError> {
    caller
        .user_id
        .as_deref()
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Authentication required"))
}

#[derive(Serialize, Deserialize)]
struct ToolInfo {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
    count: usize,
}

#[derive(Deserialize)]
struct ExecuteToolRequest {
    #[serde(default)]
    tool_name: Option<String>,
    #[serde(default)]
    input: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct ExecuteToolResponse {
    result: String,
    duration_ms: u64,
}

#[derive(Deserialize)]
struct ExtractRequest {
    messages: Vec<Message>,
}

#[derive(Serialize, Deserialize)]
struct AcceptedResponse {
    status: String,
}

#[derive(Serialize, Deserialize)]
struct MemoryListResponse {
    memories: Vec<MemoryItem>,
    count: usize,
}

#[derive(Deserialize)]
struct SettingsUpdate {
    #[serde(default)]
    personality_prompt: Option<String>,
    #[serde(default)]
    default_mode: Option<String>,
    #[serde(default)]
    temperature_preference: Option<f32>,
    #[serde(default)]
    response_style: Option<ResponseStyle>,
}

#[derive(Deserialize)]
struct CreateModeRequest {
    name: String,
    instructions: String,
}

#[derive(Serialize, Deserialize)]
struct ModeListResponse {
    modes: Vec<CustomMode>,
}

// ── Chat ──────────────────────────────────────────────────────────────────

async fn chat_handler(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<TurnRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(bad_body)?;
    info!(
        user_id = caller.user_id.as_deref().unwrap_or("anonymous"),
        messages = request.messages.len(),
        mode = request.mode.as_deref().unwrap_or("default"),
        "v1/chat request"
    );

    let turn = state
        .orchestrator
        .run(caller.user_id.as_deref(), request)
        .await
        .map_err(|e| {
            let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            api_error(status, e.user_message())
        })?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(turn.stream),
    )
        .into_response())
}

// ── Tools ─────────────────────────────────────────────────────────────────

async fn list_tools_handler(State(state): State<SharedState>) -> Json<ToolListResponse> {
    let tools: Vec<ToolInfo> = state
        .orchestrator
        .executor()
        .definitions()
        .into_iter()
        .map(|d| ToolInfo {
            name: d.name,
            description: d.description,
            parameters: d.parameters,
        })
        .collect();
    let count = tools.len();
    Json(ToolListResponse { tools, count })
}

async fn execute_tool_handler(
    State(state): State<SharedState>,
    payload: Result<Json<ExecuteToolRequest>, JsonRejection>,
) -> Result<Json<ExecuteToolResponse>, ApiError> {
    let Json(request) = payload.map_err(bad_body)?;
    let tool_name = request
        .tool_name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "tool_name is required"))?;

    let input = match request.input {
        serde_json::Value::Null => serde_json::json!({}),
        other => other,
    };
    let outcome = state.orchestrator.executor().execute(&tool_name, input).await;

    Ok(Json(ExecuteToolResponse {
        result: outcome.output,
        duration_ms: outcome.duration_ms,
    }))
}

// ── Memory ────────────────────────────────────────────────────────────────

async fn list_memory_handler(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<MemoryListResponse>, ApiError> {
    let user_id = require_user(&caller)?;
    let memories = state
        .memory
        .list(user_id)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let count = memories.len();
    Ok(Json(MemoryListResponse { memories, count }))
}

async fn extract_memory_handler(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    let user_id = require_user(&caller)?.to_string();
    let Json(request) = payload.map_err(bad_body)?;

    let extractor = state.extractor.clone();
    state.tasks.submit("memory_extraction", async move {
        if let Err(e) = extractor.extract(&user_id, &request.messages).await {
            warn!(user_id = %user_id, error = %e, "Memory extraction failed");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "accepted".into(),
        }),
    ))
}

// ── Settings & modes ──────────────────────────────────────────────────────

async fn get_settings_handler(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<UserSettings>, ApiError> {
    let user_id = require_user(&caller)?;
    let settings = state
        .settings
        .settings(user_id)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .unwrap_or_else(|| UserSettings::new(user_id));
    Ok(Json(settings))
}

async fn update_settings_handler(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<SettingsUpdate>, JsonRejection>,
) -> Result<Json<UserSettings>, ApiError> {
    let user_id = require_user(&caller)?;
    let Json(update) = payload.map_err(bad_body)?;

    let mut settings = state
        .settings
        .settings(user_id)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .unwrap_or_else(|| UserSettings::new(user_id));

    if let Some(prompt) = update.personality_prompt {
        settings.personality_prompt = Some(prompt).filter(|p| !p.trim().is_empty());
    }
    if let Some(mode) = update.default_mode {
        settings.default_mode = mode;
    }
    if let Some(temperature) = update.temperature_preference {
        if !temperature.is_finite() {
            return Err(api_error(StatusCode::BAD_REQUEST, "temperature_preference must be a number"));
        }
        settings.temperature_preference = temperature;
    }
    if let Some(style) = update.response_style {
        settings.response_style = style;
    }

    state
        .settings
        .save_settings(settings.clone())
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(settings))
}

async fn list_modes_handler(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<ModeListResponse>, ApiError> {
    let user_id = require_user(&caller)?;
    let modes = state
        .settings
        .list_custom_modes(user_id)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(ModeListResponse { modes }))
}

async fn create_mode_handler(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<CreateModeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CustomMode>), ApiError> {
    let user_id = require_user(&caller)?;
    let Json(request) = payload.map_err(bad_body)?;
    if request.name.trim().is_empty() || request.instructions.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "name and instructions are required"));
    }

    let mode = CustomMode {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        name: request.name.trim().to_string(),
        instructions: request.instructions.trim().to_string(),
        created_at: Utc::now(),
    };
    state
        .settings
        .save_custom_mode(mode.clone())
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok((StatusCode::CREATED, Json(mode)))
}

// ── Tests ─────────────────────────────────────────────────────────────────
