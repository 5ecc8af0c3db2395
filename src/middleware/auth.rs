use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::{debug, warn};

use crate::constants::MSG_UNAUTHORIZED;
use crate::models::Actor;
use crate::utils::AuthError;
use crate::AppState;

/// Verify the bearer token and attach the acting user to the request
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    let Some(token) = token else {
        debug!("🔒 Request without bearer token: {}", request.uri().path());
        return unauthorized("Missing authentication token");
    };

    match state.auth_service.verify_token(token) {
        Ok(claims) => {
            request.extensions_mut().insert(Actor::from(&claims));
            next.run(request).await
        }
        Err(AuthError::TokenExpired) => unauthorized("Authentication token expired"),
        Err(e) => {
            warn!("🚫 Rejected token for {}: {}", request.uri().path(), e);
            unauthorized("Invalid authentication token")
        }
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": MSG_UNAUTHORIZED,
            "message": message
        })),
    )
        .into_response()
}
