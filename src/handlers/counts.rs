use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Extension, Router,
};

use super::{inventory_error, not_found, ApiError, ApiResult, LimitParams};
use crate::constants::DEFAULT_COMPLETED_SESSIONS_LIMIT;
use crate::models::{
    Actor, CountSession, CountSessionUpdate, DateRange, InventoryCount, NewCountSession,
    SessionSummary,
};
use crate::AppState;

/// Count history and count session routes
pub fn create_count_routes() -> Router<AppState> {
    Router::new()
        .route("/counts", get(counts_between))
        .route("/count-sessions", post(create_session))
        .route("/count-sessions/active", get(active_sessions))
        .route("/count-sessions/completed", get(completed_sessions))
        .route("/count-sessions/{id}", put(update_session))
        .route("/count-sessions/{id}/summary", get(session_summary))
        .route("/count-sessions/{id}/complete", post(complete_session))
}

/// GET /api/counts?start={rfc3339}&end={rfc3339}
async fn counts_between(
    State(state): State<AppState>,
    Query(range): Query<DateRange>,
) -> ApiResult<Vec<InventoryCount>> {
    state
        .counts
        .counts_between(range.start, range.end)
        .await
        .map(Json)
        .map_err(inventory_error)
}

async fn create_session(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<NewCountSession>,
) -> Result<(StatusCode, Json<CountSession>), ApiError> {
    let session = state
        .counts
        .create_session(request, &actor)
        .await
        .map_err(inventory_error)?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn active_sessions(State(state): State<AppState>) -> ApiResult<Vec<CountSession>> {
    state
        .counts
        .active_sessions()
        .await
        .map(Json)
        .map_err(inventory_error)
}

/// GET /api/count-sessions/completed?limit={n}
async fn completed_sessions(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Vec<CountSession>> {
    state
        .counts
        .completed_sessions(params.limit.unwrap_or(DEFAULT_COMPLETED_SESSIONS_LIMIT))
        .await
        .map(Json)
        .map_err(inventory_error)
}

async fn update_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<CountSessionUpdate>,
) -> ApiResult<CountSession> {
    state
        .counts
        .update_session(&id, update)
        .await
        .map(Json)
        .map_err(inventory_error)
}

async fn session_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SessionSummary> {
    match state.counts.session_summary(&id).await.map_err(inventory_error)? {
        Some(summary) => Ok(Json(summary)),
        None => Err(not_found("Count session", &id)),
    }
}

/// POST /api/count-sessions/{id}/complete
async fn complete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<CountSession> {
    state
        .counts
        .complete_session(&id)
        .await
        .map(Json)
        .map_err(inventory_error)
}
