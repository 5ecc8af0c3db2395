use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{
    AppliedChange, InventoryStore, StockOutcome, StockPlanner, StoreBackend, StoreError,
};
use crate::models::{
    AiCountLog, ChatMessage, CountSession, InventoryCount, Item, SessionStatus, Transaction, User,
};

/// Everything the offline store holds, persisted as one JSON document.
/// Collections are kept in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct LocalData {
    items: Vec<Item>,
    transactions: Vec<Transaction>,
    counts: Vec<InventoryCount>,
    count_sessions: Vec<CountSession>,
    users: Vec<User>,
    ai_logs: Vec<AiCountLog>,
    chat_messages: Vec<ChatMessage>,
}

/// What an edit did to its working copy of the document
enum Edit<T> {
    /// Persist the copy, then publish it
    Changed(T),
    Unchanged(T),
}

/// Offline backend: in-memory collections, optionally mirrored to a JSON file
pub struct LocalStore {
    path: Option<PathBuf>,
    data: RwLock<LocalData>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore").field("path", &self.path).finish()
    }
}

impl LocalStore {
    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(LocalData::default()),
        }
    }

    /// Load the JSON document at `path`, starting empty when it does not exist yet
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => LocalData::default(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("📁 Local store {} not found, starting empty", path.display());
                LocalData::default()
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            items = data.items.len(),
            users = data.users.len(),
            "📁 Local store loaded from {}",
            path.display()
        );

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `edit` against a copy of the document under the write lock. A
    /// changed copy replaces the live data only once it is on disk, so a
    /// failed persist leaves memory and file in agreement.
    async fn commit<T, F>(&self, edit: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut LocalData) -> Result<Edit<T>, StoreError> + Send,
        T: Send,
    {
        let mut data = self.data.write().await;
        let mut next = data.clone();
        match edit(&mut next)? {
            Edit::Unchanged(value) => Ok(value),
            Edit::Changed(value) => {
                self.persist(&next).await?;
                *data = next;
                Ok(value)
            }
        }
    }

    /// Write the document next to its target and swap it in
    async fn persist(&self, data: &LocalData) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(data)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!("💾 Local store persisted to {}", path.display());
        Ok(())
    }
}

fn within(at: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    at >= start && at <= end
}

#[async_trait]
impl InventoryStore for LocalStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Local
    }

    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        let data = self.data.read().await;
        let mut items = data.items.clone();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn get_item(&self, id: &str) -> Result<Option<Item>, StoreError> {
        let data = self.data.read().await;
        Ok(data.items.iter().find(|i| i.id == id).cloned())
    }

    async fn count_items(&self) -> Result<usize, StoreError> {
        Ok(self.data.read().await.items.len())
    }

    async fn insert_item(&self, item: &Item) -> Result<(), StoreError> {
        self.commit(|data| {
            if data.items.iter().any(|i| i.id == item.id) {
                return Err(StoreError::Duplicate(format!("item {}", item.id)));
            }
            data.items.push(item.clone());
            Ok(Edit::Changed(()))
        })
        .await
    }

    async fn insert_items(&self, items: &[Item]) -> Result<usize, StoreError> {
        self.commit(|data| {
            if let Some(dup) = items.iter().find(|n| data.items.iter().any(|i| i.id == n.id)) {
                return Err(StoreError::Duplicate(format!("item {}", dup.id)));
            }
            data.items.extend(items.iter().cloned());
            Ok(Edit::Changed(items.len()))
        })
        .await
    }

    async fn update_item(&self, item: &Item) -> Result<bool, StoreError> {
        self.commit(|data| {
            let Some(existing) = data.items.iter_mut().find(|i| i.id == item.id) else {
                return Ok(Edit::Unchanged(false));
            };
            // stock fields belong to apply_stock_change
            let quantity = existing.quantity;
            let last_count_date = existing.last_count_date;
            let last_count_by = existing.last_count_by.take();
            *existing = item.clone();
            existing.quantity = quantity;
            existing.last_count_date = last_count_date;
            existing.last_count_by = last_count_by;
            Ok(Edit::Changed(true))
        })
        .await
    }

    async fn delete_item(&self, id: &str) -> Result<bool, StoreError> {
        self.commit(|data| {
            let before = data.items.len();
            data.items.retain(|i| i.id != id);
            if data.items.len() == before {
                return Ok(Edit::Unchanged(false));
            }
            data.transactions.retain(|t| t.item_id != id);
            data.counts.retain(|c| c.item_id != id);
            for log in data.ai_logs.iter_mut() {
                if log.item_id.as_deref() == Some(id) {
                    log.item_id = None;
                }
            }
            Ok(Edit::Changed(true))
        })
        .await
    }

    async fn apply_stock_change(
        &self,
        item_id: &str,
        planner: StockPlanner,
    ) -> Result<StockOutcome, StoreError> {
        // The write lock is held from the read through the persist
        self.commit(|data| {
            let Some(position) = data.items.iter().position(|i| i.id == item_id) else {
                return Ok(Edit::Unchanged(StockOutcome::ItemNotFound));
            };

            let change = match planner(&data.items[position]) {
                Ok(change) => change,
                Err(rejection) => return Ok(Edit::Unchanged(StockOutcome::Rejected(rejection))),
            };

            if let Some(count) = &change.count {
                data.counts.push(count.clone());
            }
            if let Some(transaction) = &change.transaction {
                data.transactions.push(transaction.clone());
            }
            change.apply_to(&mut data.items[position]);

            Ok(Edit::Changed(StockOutcome::Applied(AppliedChange {
                item: data.items[position].clone(),
                transaction: change.transaction,
                count: change.count,
            })))
        })
        .await
    }

    async fn item_transactions(&self, item_id: &str) -> Result<Vec<Transaction>, StoreError> {
        let data = self.data.read().await;
        Ok(data
            .transactions
            .iter()
            .rev()
            .filter(|t| t.item_id == item_id)
            .cloned()
            .collect())
    }

    async fn transactions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let data = self.data.read().await;
        Ok(data
            .transactions
            .iter()
            .rev()
            .filter(|t| within(t.created_at, start, end))
            .cloned()
            .collect())
    }

    async fn recent_transactions(&self, limit: usize) -> Result<Vec<Transaction>, StoreError> {
        let data = self.data.read().await;
        Ok(data.transactions.iter().rev().take(limit).cloned().collect())
    }

    async fn session_counts(&self, session_id: &str) -> Result<Vec<InventoryCount>, StoreError> {
        let data = self.data.read().await;
        Ok(data
            .counts
            .iter()
            .rev()
            .filter(|c| c.count_session_id.as_deref() == Some(session_id))
            .cloned()
            .collect())
    }

    async fn counts_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<InventoryCount>, StoreError> {
        let data = self.data.read().await;
        Ok(data
            .counts
            .iter()
            .rev()
            .filter(|c| within(c.created_at, start, end))
            .cloned()
            .collect())
    }

    async fn insert_session(&self, session: &CountSession) -> Result<(), StoreError> {
        self.commit(|data| {
            if data.count_sessions.iter().any(|s| s.id == session.id) {
                return Err(StoreError::Duplicate(format!("count session {}", session.id)));
            }
            data.count_sessions.push(session.clone());
            Ok(Edit::Changed(()))
        })
        .await
    }

    async fn get_session(&self, id: &str) -> Result<Option<CountSession>, StoreError> {
        let data = self.data.read().await;
        Ok(data.count_sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn list_sessions(
        &self,
        status: SessionStatus,
        limit: Option<usize>,
    ) -> Result<Vec<CountSession>, StoreError> {
        let data = self.data.read().await;
        let mut sessions: Vec<CountSession> = data
            .count_sessions
            .iter()
            .rev()
            .filter(|s| s.status == status)
            .cloned()
            .collect();
        match status {
            SessionStatus::InProgress => sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at)),
            SessionStatus::Completed => sessions.sort_by(|a, b| b.completed_at.cmp(&a.completed_at)),
        }
        if let Some(limit) = limit {
            sessions.truncate(limit);
        }
        Ok(sessions)
    }

    async fn update_session(&self, session: &CountSession) -> Result<bool, StoreError> {
        self.commit(|data| {
            let Some(existing) = data.count_sessions.iter_mut().find(|s| s.id == session.id) else {
                return Ok(Edit::Unchanged(false));
            };
            *existing = session.clone();
            Ok(Edit::Changed(true))
        })
        .await
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let data = self.data.read().await;
        let mut users = data.users.clone();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        let data = self.data.read().await;
        Ok(data.users.iter().find(|u| u.id == id).cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.commit(|data| {
            if data.users.iter().any(|u| u.id == user.id) {
                return Err(StoreError::Duplicate(format!("user {}", user.id)));
            }
            data.users.push(user.clone());
            Ok(Edit::Changed(()))
        })
        .await
    }

    async fn update_user(&self, user: &User) -> Result<bool, StoreError> {
        self.commit(|data| {
            let Some(existing) = data.users.iter_mut().find(|u| u.id == user.id) else {
                return Ok(Edit::Unchanged(false));
            };
            *existing = user.clone();
            Ok(Edit::Changed(true))
        })
        .await
    }

    async fn insert_ai_log(&self, log: &AiCountLog) -> Result<(), StoreError> {
        self.commit(|data| {
            data.ai_logs.push(log.clone());
            Ok(Edit::Changed(()))
        })
        .await
    }

    async fn list_ai_logs(&self, limit: usize) -> Result<Vec<AiCountLog>, StoreError> {
        let data = self.data.read().await;
        Ok(data.ai_logs.iter().rev().take(limit).cloned().collect())
    }

    async fn chat_messages(&self, user_id: Option<&str>) -> Result<Vec<ChatMessage>, StoreError> {
        let data = self.data.read().await;
        Ok(data
            .chat_messages
            .iter()
            .filter(|m| user_id.map(|id| m.user_id == id).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn insert_chat_message(&self, message: &ChatMessage) -> Result<(), StoreError> {
        self.commit(|data| {
            data.chat_messages.push(message.clone());
            Ok(Edit::Changed(()))
        })
        .await
    }

    async fn clear_chat_messages(&self, user_id: &str) -> Result<usize, StoreError> {
        self.commit(|data| {
            let before = data.chat_messages.len();
            data.chat_messages.retain(|m| m.user_id != user_id);
            let removed = before - data.chat_messages.len();
            Ok(if removed == 0 {
                Edit::Unchanged(0)
            } else {
                Edit::Changed(removed)
            })
        })
        .await
    }

    async fn reset_all(&self, admin: &User) -> Result<(), StoreError> {
        self.commit(|data| {
            *data = LocalData {
                users: vec![admin.clone()],
                ..LocalData::default()
            };
            Ok(Edit::Changed(()))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, NewItem, TransactionType};
    use crate::store::{planner, CountStamp, StockChange, StockRejection};

    fn item(name: &str, quantity: i32) -> Item {
        NewItem {
            name: name.to_string(),
            category: Category::Acm,
            quantity,
            ..Default::default()
        }
        .into_item(Utc::now())
    }

    fn ledger_entry(item: &Item, new_quantity: i32) -> Transaction {
        Transaction {
            id: crate::models::new_id(),
            item_id: item.id.clone(),
            transaction_type: TransactionType::Adjustment,
            quantity: (new_quantity - item.quantity).abs(),
            previous_quantity: item.quantity,
            new_quantity,
            user_id: "admin".to_string(),
            user_name: "Admin".to_string(),
            job_reference: None,
            notes: None,
            from_location: None,
            to_location: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_items_listed_by_name() {
        let store = LocalStore::in_memory();
        store.insert_item(&item("Trespa Meteon", 1)).await.unwrap();
        store.insert_item(&item("ACM Panel", 2)).await.unwrap();

        let names: Vec<String> = store.list_items().await.unwrap().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["ACM Panel", "Trespa Meteon"]);
        assert_eq!(store.count_items().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_item_rejected() {
        let store = LocalStore::in_memory();
        let it = item("ACM Panel", 2);
        store.insert_item(&it).await.unwrap();
        assert!(matches!(
            store.insert_item(&it).await,
            Err(StoreError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_stock_change_applied_with_ledger() {
        let store = LocalStore::in_memory();
        let it = item("ACM Panel", 10);
        store.insert_item(&it).await.unwrap();

        let outcome = store
            .apply_stock_change(
                &it.id,
                planner(|current: &Item| {
                    Ok(StockChange {
                        new_quantity: 12,
                        transaction: Some(ledger_entry(current, 12)),
                        count: None,
                        count_stamp: Some(CountStamp {
                            at: Utc::now(),
                            by: "Admin".to_string(),
                        }),
                        updated_at: Utc::now(),
                    })
                }),
            )
            .await
            .unwrap();

        let StockOutcome::Applied(applied) = outcome else {
            panic!("expected change to apply");
        };
        assert_eq!(applied.item.quantity, 12);
        assert_eq!(applied.item.last_count_by.as_deref(), Some("Admin"));
        assert_eq!(store.item_transactions(&it.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_change_writes_nothing() {
        let store = LocalStore::in_memory();
        let it = item("ACM Panel", 3);
        store.insert_item(&it).await.unwrap();

        let outcome = store
            .apply_stock_change(
                &it.id,
                planner(|current: &Item| {
                    Err(StockRejection::Insufficient {
                        requested: 5,
                        available: current.quantity,
                    })
                }),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            StockOutcome::Rejected(StockRejection::Insufficient {
                requested: 5,
                available: 3
            })
        );
        assert_eq!(store.get_item(&it.id).await.unwrap().unwrap().quantity, 3);
        assert!(store.item_transactions(&it.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_item_outcome() {
        let store = LocalStore::in_memory();
        let outcome = store
            .apply_stock_change("nope", planner(|_: &Item| unreachable!()))
            .await
            .unwrap();
        assert_eq!(outcome, StockOutcome::ItemNotFound);
    }

    #[tokio::test]
    async fn test_delete_cascades_ledger() {
        let store = LocalStore::in_memory();
        let it = item("ACM Panel", 10);
        store.insert_item(&it).await.unwrap();
        store
            .apply_stock_change(
                &it.id,
                planner(|current: &Item| {
                    Ok(StockChange {
                        new_quantity: 4,
                        transaction: Some(ledger_entry(current, 4)),
                        count: None,
                        count_stamp: None,
                        updated_at: Utc::now(),
                    })
                }),
            )
            .await
            .unwrap();

        assert!(store.delete_item(&it.id).await.unwrap());
        assert!(store.item_transactions(&it.id).await.unwrap().is_empty());
        assert!(!store.delete_item(&it.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_keeps_stock_fields() {
        let store = LocalStore::in_memory();
        let it = item("ACM Panel", 10);
        store.insert_item(&it).await.unwrap();

        let mut edited = it.clone();
        edited.quantity = 999;
        edited.location = "Row 4".to_string();
        assert!(store.update_item(&edited).await.unwrap());

        let stored = store.get_item(&it.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 10);
        assert_eq!(stored.location, "Row 4");
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("inventory.json");

        let store = LocalStore::open(&path).await.unwrap();
        let it = item("Swiss Pearl Carat", 6);
        store.insert_item(&it).await.unwrap();
        drop(store);

        let reopened = LocalStore::open(&path).await.unwrap();
        let loaded = reopened.get_item(&it.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Swiss Pearl Carat");
        assert_eq!(loaded.quantity, 6);
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        let store = LocalStore::open(&path).await.unwrap();
        let panel = item("ACM Panel", 10);
        store.insert_item(&panel).await.unwrap();

        // a directory where the temp file goes makes every write fail
        let blocker = path.with_extension("json.tmp");
        std::fs::create_dir(&blocker).unwrap();

        let rivets = item("Rivets", 500);
        assert!(matches!(store.insert_item(&rivets).await, Err(StoreError::Io(_))));
        assert!(store.get_item(&rivets.id).await.unwrap().is_none());

        let result = store
            .apply_stock_change(
                &panel.id,
                planner(|current: &Item| {
                    Ok(StockChange {
                        new_quantity: 2,
                        transaction: Some(ledger_entry(current, 2)),
                        count: None,
                        count_stamp: None,
                        updated_at: Utc::now(),
                    })
                }),
            )
            .await;
        assert!(matches!(result, Err(StoreError::Io(_))));
        assert_eq!(store.get_item(&panel.id).await.unwrap().unwrap().quantity, 10);
        assert!(store.item_transactions(&panel.id).await.unwrap().is_empty());

        std::fs::remove_dir(&blocker).unwrap();
        store.insert_item(&rivets).await.unwrap();
        drop(store);

        let reopened = LocalStore::open(&path).await.unwrap();
        assert_eq!(reopened.get_item(&panel.id).await.unwrap().unwrap().quantity, 10);
        assert!(reopened.get_item(&rivets.id).await.unwrap().is_some());
        assert_eq!(reopened.count_items().await.unwrap(), 2);
    }
}
