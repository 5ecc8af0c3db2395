use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Extension, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{assistant_error, ApiError, ApiResult, LimitParams};
use crate::constants::DEFAULT_AI_LOG_LIMIT;
use crate::models::{Actor, AiCountLog, ChatMessage, ConversationTurn, CountEstimate, NewAiCountLog};
use crate::AppState;

/// Photo counting and inventory chat
pub fn create_assistant_routes() -> Router<AppState> {
    Router::new()
        .route("/assistant/count", post(estimate_count))
        .route("/assistant/chat", post(chat))
        .route("/assistant/messages", get(chat_history).delete(clear_history))
        .route("/assistant/count-logs", get(count_logs).post(record_count_log))
}

#[derive(Debug, Deserialize)]
struct CountImageRequest {
    image: String,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    question: String,
    #[serde(default)]
    history: Vec<ConversationTurn>,
}

/// POST /api/assistant/count { image: data URL }
async fn estimate_count(
    State(state): State<AppState>,
    Json(request): Json<CountImageRequest>,
) -> ApiResult<CountEstimate> {
    state
        .assistant
        .estimate_count(&request.image)
        .await
        .map(Json)
        .map_err(assistant_error)
}

async fn chat(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Value> {
    let answer = state
        .assistant
        .chat(&request.question, &request.history, &actor)
        .await
        .map_err(assistant_error)?;
    Ok(Json(json!({ "answer": answer })))
}

/// The caller's own conversation, oldest first
async fn chat_history(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Vec<ChatMessage>> {
    state
        .assistant
        .chat_history(Some(&actor.user_id))
        .await
        .map(Json)
        .map_err(assistant_error)
}

async fn clear_history(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Value> {
    let deleted = state
        .assistant
        .clear_history(&actor.user_id)
        .await
        .map_err(assistant_error)?;
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}

async fn count_logs(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Vec<AiCountLog>> {
    state
        .assistant
        .count_logs(params.limit.unwrap_or(DEFAULT_AI_LOG_LIMIT))
        .await
        .map(Json)
        .map_err(assistant_error)
}

async fn record_count_log(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<NewAiCountLog>,
) -> Result<(StatusCode, Json<AiCountLog>), ApiError> {
    let log = state
        .assistant
        .record_count_log(request, &actor)
        .await
        .map_err(assistant_error)?;
    Ok((StatusCode::CREATED, Json(log)))
}
