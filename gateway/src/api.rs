use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use dash_core::agents::Agent;
use dash_core::messages::{MessagesPayload, Role};

// Shared by every request; agents are stateless between calls.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<dyn Agent>,
}

// Error body: mirrors what chat clients already parse
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: Value,
}

pub struct ApiError {
    status: StatusCode,
    detail: Value,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<Value>) -> Self {
        Self { status, detail: detail.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/sendMessage", post(send_message))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// --- HANDLERS ---

async fn health_check() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// The Chat Handler
async fn send_message(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<dash_core::messages::AgentMessage>, ApiError> {
    // STEP 1: VALIDATE (JSON, presence, then shape)
    let Json(raw_body) = body
        .map_err(|rejection| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text()))?;
    let Some(messages) = raw_body.get("messages") else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "'messages' field missing from request body",
        ));
    };
    let payload: MessagesPayload =
        serde_json::from_value(serde_json::json!({ "messages": messages }))
            .map_err(|e| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    info!(turns = payload.messages.len(), "Chat request received");

    // STEP 2: DELEGATE (the agent)
    let reply = state.agent.invoke(payload).await.map_err(|e| {
        error!("Agent failure: {:#}", e);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
    })?;

    // STEP 3: GUARD (only assistant replies leave the service)
    if reply.role != Role::Assistant {
        error!("Agent returned a non-assistant message");
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Agent must return a Message with role='assistant'",
        ));
    }

    Ok(Json(reply))
}
