use axum::{extract::State, response::Json, routing::post, Extension, Router};
use serde_json::{json, Value};
use tracing::warn;

use super::{inventory_error, require_admin, ApiResult};
use crate::models::Actor;
use crate::AppState;

pub fn create_admin_routes() -> Router<AppState> {
    Router::new().route("/admin/reset", post(reset_all_data))
}

/// POST /api/admin/reset
///
/// Wipes all inventory, history and users; only the default administrator
/// remains afterwards.
async fn reset_all_data(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Value> {
    require_admin(&actor)?;
    warn!("🧨 {} requested a full data reset", actor.user_id);
    state.users.reset_all_data().await.map_err(inventory_error)?;
    Ok(Json(json!({
        "success": true,
        "message": "All data has been reset"
    })))
}
