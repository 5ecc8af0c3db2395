use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{InventoryStore, StockOutcome, StockPlanner, StoreBackend, StoreError};
use crate::models::{
    AiCountLog, ChatMessage, CountSession, InventoryCount, Item, SessionStatus, Transaction, User,
};

/// Backend used when no persistence is configured: reads come back empty,
/// writes fail with `StoreError::NotConfigured`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredStore;

#[async_trait]
impl InventoryStore for UnconfiguredStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Unconfigured
    }

    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        Ok(Vec::new())
    }

    async fn get_item(&self, _id: &str) -> Result<Option<Item>, StoreError> {
        Ok(None)
    }

    async fn count_items(&self) -> Result<usize, StoreError> {
        Ok(0)
    }

    async fn insert_item(&self, _item: &Item) -> Result<(), StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn insert_items(&self, _items: &[Item]) -> Result<usize, StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn update_item(&self, _item: &Item) -> Result<bool, StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn delete_item(&self, _id: &str) -> Result<bool, StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn apply_stock_change(
        &self,
        _item_id: &str,
        _planner: StockPlanner,
    ) -> Result<StockOutcome, StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn item_transactions(&self, _item_id: &str) -> Result<Vec<Transaction>, StoreError> {
        Ok(Vec::new())
    }

    async fn transactions_between(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError> {
        Ok(Vec::new())
    }

    async fn recent_transactions(&self, _limit: usize) -> Result<Vec<Transaction>, StoreError> {
        Ok(Vec::new())
    }

    async fn session_counts(&self, _session_id: &str) -> Result<Vec<InventoryCount>, StoreError> {
        Ok(Vec::new())
    }

    async fn counts_between(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<InventoryCount>, StoreError> {
        Ok(Vec::new())
    }

    async fn insert_session(&self, _session: &CountSession) -> Result<(), StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn get_session(&self, _id: &str) -> Result<Option<CountSession>, StoreError> {
        Ok(None)
    }

    async fn list_sessions(
        &self,
        _status: SessionStatus,
        _limit: Option<usize>,
    ) -> Result<Vec<CountSession>, StoreError> {
        Ok(Vec::new())
    }

    async fn update_session(&self, _session: &CountSession) -> Result<bool, StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(Vec::new())
    }

    async fn get_user(&self, _id: &str) -> Result<Option<User>, StoreError> {
        Ok(None)
    }

    async fn insert_user(&self, _user: &User) -> Result<(), StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn update_user(&self, _user: &User) -> Result<bool, StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn insert_ai_log(&self, _log: &AiCountLog) -> Result<(), StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn list_ai_logs(&self, _limit: usize) -> Result<Vec<AiCountLog>, StoreError> {
        Ok(Vec::new())
    }

    async fn chat_messages(&self, _user_id: Option<&str>) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(Vec::new())
    }

    async fn insert_chat_message(&self, _message: &ChatMessage) -> Result<(), StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn clear_chat_messages(&self, _user_id: &str) -> Result<usize, StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn reset_all(&self, _admin: &User) -> Result<(), StoreError> {
        Err(StoreError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewItem;
    use crate::store::planner;

    #[tokio::test]
    async fn test_reads_empty_writes_refused() {
        let store = UnconfiguredStore;
        assert!(store.list_items().await.unwrap().is_empty());
        assert!(store.get_session("s1").await.unwrap().is_none());

        let item = NewItem {
            name: "Rivets".to_string(),
            ..Default::default()
        }
        .into_item(Utc::now());
        assert!(matches!(store.insert_item(&item).await, Err(StoreError::NotConfigured)));

        let outcome = store
            .apply_stock_change("i1", planner(|_: &Item| unreachable!()))
            .await;
        assert!(matches!(outcome, Err(StoreError::NotConfigured)));
    }
}
