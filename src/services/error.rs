use thiserror::Error;

use crate::store::{StockRejection, StoreError};

/// Domain errors raised by the inventory services
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Item '{item_id}' not found")]
    ItemNotFound { item_id: String },

    #[error("Count session '{session_id}' not found")]
    SessionNotFound { session_id: String },

    #[error("Count session '{session_id}' is already completed")]
    SessionClosed { session_id: String },

    #[error("User '{user_id}' not found")]
    UserNotFound { user_id: String },

    #[error("Insufficient quantity: requested {requested}, available {available}")]
    InsufficientQuantity { requested: i32, available: i32 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<StockRejection> for InventoryError {
    fn from(rejection: StockRejection) -> Self {
        match rejection {
            StockRejection::Insufficient { requested, available } => {
                InventoryError::InsufficientQuantity { requested, available }
            }
            StockRejection::Overflow { current, added } => InventoryError::Validation(format!(
                "Adding {added} to {current} on hand exceeds the largest storable quantity"
            )),
        }
    }
}

impl InventoryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        InventoryError::Validation(msg.into())
    }
}

pub type InventoryResult<T> = Result<T, InventoryError>;
