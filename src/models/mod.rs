pub mod assistant;
pub mod count;
pub mod item;
pub mod transaction;
pub mod user;

pub use assistant::{AiCountLog, ChatMessage, ChatRole, ConversationTurn, CountEstimate, NewAiCountLog};
pub use count::{
    CountRequest, CountSession, CountSessionUpdate, CountType, InventoryCount, NewCountSession,
    SessionStats, SessionStatus, SessionSummary,
};
pub use item::{Category, Item, ItemFilter, ItemUpdate, NewItem};
pub use transaction::{
    AdjustmentRequest, DateRange, StockMovementRequest, Transaction, TransactionType,
    TransferRequest,
};
pub use user::{Actor, NewUser, Role, User, UserProfile, UserUpdate};

/// Generate a new record identifier
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
