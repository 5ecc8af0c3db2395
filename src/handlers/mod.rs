use axum::{http::StatusCode, response::Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::constants::MSG_FORBIDDEN;
use crate::models::Actor;
use crate::services::{AssistantError, InventoryError};
use crate::store::StoreError;

pub mod admin;
pub mod assistant;
pub mod counts;
pub mod data_files;
pub mod items;
pub mod users;

/// Error half of every handler result: a status plus `{ "error", "message" }`
pub type ApiError = (StatusCode, Json<Value>);
pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

pub fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(json!({
            "error": error,
            "message": message.into()
        })),
    )
}

pub fn require_admin(actor: &Actor) -> Result<(), ApiError> {
    if actor.is_admin() {
        Ok(())
    } else {
        tracing::warn!("🚫 {} attempted an admin-only action", actor.user_id);
        Err(error_response(StatusCode::FORBIDDEN, "Forbidden", MSG_FORBIDDEN))
    }
}

pub fn not_found(what: &str, id: &str) -> ApiError {
    error_response(
        StatusCode::NOT_FOUND,
        &format!("{what} not found"),
        format!("{what} '{id}' not found"),
    )
}

pub fn store_error(error: StoreError) -> ApiError {
    match error {
        StoreError::NotConfigured => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Storage not configured",
            "No storage backend is configured for this server",
        ),
        StoreError::Duplicate(msg) => {
            error_response(StatusCode::CONFLICT, "Duplicate record", msg)
        }
        e => {
            tracing::error!("Storage error: {e}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error",
                "Internal server error occurred",
            )
        }
    }
}

pub fn inventory_error(error: InventoryError) -> ApiError {
    match error {
        e @ InventoryError::ItemNotFound { .. } => {
            error_response(StatusCode::NOT_FOUND, "Item not found", e.to_string())
        }
        e @ InventoryError::SessionNotFound { .. } => {
            error_response(StatusCode::NOT_FOUND, "Count session not found", e.to_string())
        }
        e @ InventoryError::UserNotFound { .. } => {
            error_response(StatusCode::NOT_FOUND, "User not found", e.to_string())
        }
        e @ InventoryError::SessionClosed { .. } => {
            error_response(StatusCode::CONFLICT, "Count session closed", e.to_string())
        }
        InventoryError::InsufficientQuantity { requested, available } => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": "Insufficient quantity",
                "message": format!("Requested {} but only {} available", requested, available),
                "requested": requested,
                "available": available
            })),
        ),
        InventoryError::Validation(msg) => {
            error_response(StatusCode::BAD_REQUEST, "Validation error", msg)
        }
        InventoryError::Store(e) => store_error(e),
    }
}

pub fn assistant_error(error: AssistantError) -> ApiError {
    match error {
        e @ AssistantError::NotConfigured => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Assistant not configured",
            e.to_string(),
        ),
        AssistantError::InvalidRequest(msg) => {
            error_response(StatusCode::BAD_REQUEST, "Validation error", msg)
        }
        AssistantError::Upstream(msg) => {
            tracing::error!("AI service error: {msg}");
            error_response(StatusCode::BAD_GATEWAY, "AI service error", msg)
        }
        e @ AssistantError::UnparseableReply => {
            error_response(StatusCode::BAD_GATEWAY, "AI service error", e.to_string())
        }
        AssistantError::Store(e) => store_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn test_status_mapping() {
        let (status, _) = inventory_error(InventoryError::ItemNotFound {
            item_id: "x".to_string(),
        });
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, Json(body)) = inventory_error(InventoryError::InsufficientQuantity {
            requested: 80,
            available: 50,
        });
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["available"], 50);

        let (status, _) = inventory_error(InventoryError::Store(StoreError::NotConfigured));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, Json(body)) = inventory_error(InventoryError::Store(StoreError::Database(
            "login failed for sa".to_string(),
        )));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body["message"].as_str().unwrap().contains("sa"));

        let (status, _) = assistant_error(AssistantError::Upstream("timeout".to_string()));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_require_admin() {
        let mut actor = Actor {
            user_id: "u1".to_string(),
            user_name: "Sam".to_string(),
            role: Role::Counter,
        };
        let (status, _) = require_admin(&actor).unwrap_err();
        assert_eq!(status, StatusCode::FORBIDDEN);
        actor.role = Role::Admin;
        assert!(require_admin(&actor).is_ok());
    }
}
