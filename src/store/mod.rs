//! Storage port shared by the SQL Server adapter and the offline local store.
//!
//! Exactly one implementation is chosen at startup and injected into the
//! services as `Arc<dyn InventoryStore>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::{
    AiCountLog, ChatMessage, CountSession, InventoryCount, Item, SessionStatus, Transaction, User,
};

pub mod local;
pub mod unconfigured;

pub use local::LocalStore;
pub use unconfigured::UnconfiguredStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend not configured")]
    NotConfigured,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Local store I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Record already exists: {0}")]
    Duplicate(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    SqlServer,
    Local,
    Unconfigured,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::SqlServer => "sql_server",
            StoreBackend::Local => "local",
            StoreBackend::Unconfigured => "unconfigured",
        }
    }
}

/// Audit stamp written when a physical count lands
#[derive(Debug, Clone, PartialEq)]
pub struct CountStamp {
    pub at: DateTime<Utc>,
    pub by: String,
}

/// Every write produced by one stock operation, applied as a unit
#[derive(Debug, Clone, PartialEq)]
pub struct StockChange {
    pub new_quantity: i32,
    pub transaction: Option<Transaction>,
    pub count: Option<InventoryCount>,
    pub count_stamp: Option<CountStamp>,
    pub updated_at: DateTime<Utc>,
}

impl StockChange {
    /// Fold the change into the item row it was planned against
    pub fn apply_to(&self, item: &mut Item) {
        item.quantity = self.new_quantity;
        if let Some(stamp) = &self.count_stamp {
            item.last_count_date = Some(stamp.at);
            item.last_count_by = Some(stamp.by.clone());
        }
        item.updated_at = self.updated_at;
    }
}

/// Why a planner refused to touch the row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockRejection {
    Insufficient { requested: i32, available: i32 },
    /// The new on-hand figure would not fit in an `i32`
    Overflow { current: i32, added: i32 },
}

/// Computes a stock change from the current item row, or refuses it
pub type StockPlanner = Box<dyn FnOnce(&Item) -> Result<StockChange, StockRejection> + Send>;

pub fn planner<F>(plan: F) -> StockPlanner
where
    F: FnOnce(&Item) -> Result<StockChange, StockRejection> + Send + 'static,
{
    Box::new(plan)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedChange {
    pub item: Item,
    pub transaction: Option<Transaction>,
    pub count: Option<InventoryCount>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StockOutcome {
    Applied(AppliedChange),
    ItemNotFound,
    Rejected(StockRejection),
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    fn backend(&self) -> StoreBackend;

    // Items
    /// All items ordered by name
    async fn list_items(&self) -> Result<Vec<Item>, StoreError>;
    async fn get_item(&self, id: &str) -> Result<Option<Item>, StoreError>;
    async fn count_items(&self) -> Result<usize, StoreError>;
    async fn insert_item(&self, item: &Item) -> Result<(), StoreError>;
    async fn insert_items(&self, items: &[Item]) -> Result<usize, StoreError>;
    /// Replaces the descriptive fields of an existing row; returns false when absent
    async fn update_item(&self, item: &Item) -> Result<bool, StoreError>;
    /// Cascades to the item's transactions and counts
    async fn delete_item(&self, id: &str) -> Result<bool, StoreError>;

    /// Atomic read-plan-write of one item's stock. The planner sees the row as
    /// it is locked for the write.
    async fn apply_stock_change(
        &self,
        item_id: &str,
        planner: StockPlanner,
    ) -> Result<StockOutcome, StoreError>;

    // Ledger, newest first
    async fn item_transactions(&self, item_id: &str) -> Result<Vec<Transaction>, StoreError>;
    async fn transactions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError>;
    async fn recent_transactions(&self, limit: usize) -> Result<Vec<Transaction>, StoreError>;

    // Counts, newest first
    async fn session_counts(&self, session_id: &str) -> Result<Vec<InventoryCount>, StoreError>;
    async fn counts_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<InventoryCount>, StoreError>;

    // Count sessions
    async fn insert_session(&self, session: &CountSession) -> Result<(), StoreError>;
    async fn get_session(&self, id: &str) -> Result<Option<CountSession>, StoreError>;
    /// In-progress sessions by start time, completed ones by completion time, newest first
    async fn list_sessions(
        &self,
        status: SessionStatus,
        limit: Option<usize>,
    ) -> Result<Vec<CountSession>, StoreError>;
    async fn update_session(&self, session: &CountSession) -> Result<bool, StoreError>;

    // Users
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError>;
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    async fn update_user(&self, user: &User) -> Result<bool, StoreError>;

    // Assistant history
    async fn insert_ai_log(&self, log: &AiCountLog) -> Result<(), StoreError>;
    async fn list_ai_logs(&self, limit: usize) -> Result<Vec<AiCountLog>, StoreError>;
    /// Oldest first, optionally restricted to one user
    async fn chat_messages(&self, user_id: Option<&str>) -> Result<Vec<ChatMessage>, StoreError>;
    async fn insert_chat_message(&self, message: &ChatMessage) -> Result<(), StoreError>;
    async fn clear_chat_messages(&self, user_id: &str) -> Result<usize, StoreError>;

    /// Wipes every table and leaves only `admin` behind
    async fn reset_all(&self, admin: &User) -> Result<(), StoreError>;
}
