use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Extension, Router,
};
use serde_json::{json, Value};
use tracing::info;

use super::{inventory_error, not_found, require_admin, ApiError, ApiResult};
use crate::models::{Actor, NewUser, UserProfile, UserUpdate};
use crate::AppState;

/// User management; every route is admin-only
pub fn create_user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", put(update_user))
        .route("/users/{id}/deactivate", post(deactivate_user))
}

async fn list_users(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Vec<UserProfile>> {
    require_admin(&actor)?;
    let users = state.users.list_users().await.map_err(inventory_error)?;
    Ok(Json(users.iter().map(UserProfile::from).collect()))
}

async fn create_user(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<NewUser>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    require_admin(&actor)?;
    let user = state
        .users
        .create_user(request)
        .await
        .map_err(inventory_error)?;
    info!("👤 {} created user {}", actor.user_id, user.id);
    Ok((StatusCode::CREATED, Json(UserProfile::from(&user))))
}

async fn update_user(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(update): Json<UserUpdate>,
) -> ApiResult<UserProfile> {
    require_admin(&actor)?;
    let user = state
        .users
        .update_user(&id, update)
        .await
        .map_err(inventory_error)?;
    Ok(Json(UserProfile::from(&user)))
}

async fn deactivate_user(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    require_admin(&actor)?;
    if state
        .users
        .deactivate_user(&id)
        .await
        .map_err(inventory_error)?
    {
        info!("👤 {} deactivated user {}", actor.user_id, id);
        Ok(Json(json!({ "success": true, "id": id })))
    } else {
        Err(not_found("User", &id))
    }
}
