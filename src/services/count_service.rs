use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::error::{InventoryError, InventoryResult};
use super::reconciliation::{plan_count, session_aggregates, session_stats, CountInput};
use crate::models::{
    new_id, Actor, CountRequest, CountSession, CountSessionUpdate, InventoryCount, Item,
    NewCountSession, SessionStatus, SessionSummary,
};
use crate::store::{planner, AppliedChange, InventoryStore, StockOutcome, StoreBackend};

/// Physical counts and the sessions that group them
#[derive(Clone)]
pub struct CountService {
    store: Arc<dyn InventoryStore>,
}

impl CountService {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    /// Record a physical count and reconcile the item's quantity to it
    #[instrument(skip(self, request, actor), fields(user = %actor.user_name, counted = request.counted_quantity))]
    pub async fn record_count(
        &self,
        item_id: &str,
        request: CountRequest,
        actor: &Actor,
    ) -> InventoryResult<AppliedChange> {
        if request.counted_quantity < 0 {
            return Err(InventoryError::validation("Counted quantity cannot be negative"));
        }

        if let Some(session_id) = &request.count_session_id {
            match self.store.get_session(session_id).await? {
                None => {
                    return Err(InventoryError::SessionNotFound {
                        session_id: session_id.clone(),
                    })
                }
                Some(session) if !session.is_open() => {
                    return Err(InventoryError::SessionClosed {
                        session_id: session_id.clone(),
                    })
                }
                Some(_) => {}
            }
        }

        let input = CountInput {
            counted_quantity: request.counted_quantity,
            count_type: request.count_type,
            notes: request.notes.filter(|n| !n.trim().is_empty()),
            count_session_id: request.count_session_id,
        };
        let actor_owned = actor.clone();

        let outcome = self
            .store
            .apply_stock_change(
                item_id,
                planner(move |item: &Item| Ok(plan_count(item, &input, &actor_owned, Utc::now()))),
            )
            .await?;

        match outcome {
            StockOutcome::Applied(applied) => {
                if let Some(count) = &applied.count {
                    if count.discrepancy != 0 {
                        warn!(
                            item_id = %count.item_id,
                            system = count.system_quantity,
                            counted = count.counted_quantity,
                            discrepancy = count.discrepancy,
                            "⚠️ Count discrepancy reconciled"
                        );
                    } else {
                        info!(item_id = %count.item_id, "✅ Count matches system quantity");
                    }
                }
                Ok(applied)
            }
            StockOutcome::ItemNotFound => Err(InventoryError::ItemNotFound {
                item_id: item_id.to_string(),
            }),
            // Counts never refuse a plan
            StockOutcome::Rejected(rejection) => Err(rejection.into()),
        }
    }

    #[instrument(skip(self, request, actor), fields(name = %request.name))]
    pub async fn create_session(
        &self,
        request: NewCountSession,
        actor: &Actor,
    ) -> InventoryResult<CountSession> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(InventoryError::validation("Session name is required"));
        }
        let total_items = self.store.count_items().await? as i32;

        let session = CountSession {
            id: new_id(),
            name,
            count_type: request.count_type,
            status: SessionStatus::InProgress,
            started_by: actor.user_id.clone(),
            started_by_name: actor.user_name.clone(),
            total_items,
            counted_items: 0,
            discrepancy_count: 0,
            notes: request.notes.filter(|n| !n.trim().is_empty()),
            started_at: Utc::now(),
            completed_at: None,
        };
        self.store.insert_session(&session).await?;
        info!(session_id = %session.id, total_items, "📋 Count session started");
        Ok(session)
    }

    /// Close a session, recomputing its aggregates from the recorded counts.
    /// Completing twice yields the same figures.
    #[instrument(skip(self))]
    pub async fn complete_session(&self, session_id: &str) -> InventoryResult<CountSession> {
        let mut session = self.require_session(session_id).await?;
        let counts = self.store.session_counts(session_id).await?;
        let (counted, discrepancies) = session_aggregates(&counts);

        session.counted_items = counted;
        session.discrepancy_count = discrepancies;
        session.status = SessionStatus::Completed;
        session.completed_at = Some(Utc::now());

        if !self.store.update_session(&session).await? {
            return Err(InventoryError::SessionNotFound {
                session_id: session_id.to_string(),
            });
        }
        info!(
            session_id,
            counted,
            discrepancies,
            "🏁 Count session completed"
        );
        Ok(session)
    }

    pub async fn update_session(
        &self,
        session_id: &str,
        update: CountSessionUpdate,
    ) -> InventoryResult<CountSession> {
        let mut session = self.require_session(session_id).await?;
        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(InventoryError::validation("Session name cannot be empty"));
            }
            session.name = name;
        }
        if let Some(notes) = update.notes {
            session.notes = Some(notes).filter(|n| !n.trim().is_empty());
        }
        self.store.update_session(&session).await?;
        Ok(session)
    }

    /// Full picture of a session for review.
    ///
    /// `None` when the session does not exist. Without a storage backend the
    /// empty shape is returned instead so the dashboard can still render.
    pub async fn session_summary(&self, session_id: &str) -> InventoryResult<Option<SessionSummary>> {
        if self.store.backend() == StoreBackend::Unconfigured {
            return Ok(Some(SessionSummary::default()));
        }
        let Some(session) = self.store.get_session(session_id).await? else {
            return Ok(None);
        };

        let counts = self.store.session_counts(session_id).await?;
        let uncounted_items = self.uncounted_from(&counts).await?;
        let stats = session_stats(session.total_items, &counts);

        Ok(Some(SessionSummary {
            session: Some(session),
            counts,
            uncounted_items,
            stats,
        }))
    }

    pub async fn active_sessions(&self) -> InventoryResult<Vec<CountSession>> {
        Ok(self
            .store
            .list_sessions(SessionStatus::InProgress, None)
            .await?)
    }

    pub async fn completed_sessions(&self, limit: usize) -> InventoryResult<Vec<CountSession>> {
        Ok(self
            .store
            .list_sessions(SessionStatus::Completed, Some(limit))
            .await?)
    }

    /// Items with no count recorded in the session yet
    pub async fn uncounted_items(&self, session_id: &str) -> InventoryResult<Vec<Item>> {
        self.require_session(session_id).await?;
        let counts = self.store.session_counts(session_id).await?;
        self.uncounted_from(&counts).await
    }

    pub async fn counts_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> InventoryResult<Vec<InventoryCount>> {
        if end < start {
            return Err(InventoryError::validation("End date must not precede start date"));
        }
        Ok(self.store.counts_between(start, end).await?)
    }

    async fn require_session(&self, session_id: &str) -> InventoryResult<CountSession> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or_else(|| InventoryError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    async fn uncounted_from(&self, counts: &[InventoryCount]) -> InventoryResult<Vec<Item>> {
        let counted: HashSet<&str> = counts.iter().map(|c| c.item_id.as_str()).collect();
        let items = self.store.list_items().await?;
        Ok(items
            .into_iter()
            .filter(|item| !counted.contains(item.id.as_str()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, CountType, NewItem, Role, StockMovementRequest, TransactionType};
    use crate::services::InventoryService;
    use crate::store::{LocalStore, UnconfiguredStore};

    fn actor() -> Actor {
        Actor {
            user_id: "u-2".to_string(),
            user_name: "Rosa".to_string(),
            role: Role::Counter,
        }
    }

    fn setup() -> (InventoryService, CountService) {
        let store: Arc<dyn InventoryStore> = Arc::new(LocalStore::in_memory());
        (
            InventoryService::new(store.clone(), false),
            CountService::new(store),
        )
    }

    fn count(counted: i32, session: Option<&str>) -> CountRequest {
        CountRequest {
            counted_quantity: counted,
            count_type: CountType::Quarterly,
            notes: None,
            count_session_id: session.map(str::to_string),
        }
    }

    async fn add_item(inventory: &InventoryService, name: &str, quantity: i32) -> Item {
        inventory
            .create_item(NewItem {
                name: name.to_string(),
                category: Category::Trespa,
                quantity,
                ..Default::default()
            })
            .await
            .unwrap()
    }

    fn movement(quantity: i32) -> StockMovementRequest {
        StockMovementRequest {
            quantity,
            job_reference: Some("JOB-77".to_string()),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_pull_return_count_ledger() {
        let (inventory, counts) = setup();
        let item = add_item(&inventory, "Trespa 10mm", 50).await;

        inventory.pull(&item.id, movement(20), &actor()).await.unwrap();
        inventory.return_stock(&item.id, movement(5), &actor()).await.unwrap();
        let applied = counts.record_count(&item.id, count(32, None), &actor()).await.unwrap();

        assert_eq!(applied.item.quantity, 32);
        assert_eq!(applied.item.last_count_by.as_deref(), Some("Rosa"));
        assert!(applied.item.last_count_date.is_some());
        let recorded = applied.count.unwrap();
        assert_eq!(recorded.system_quantity, 35);
        assert_eq!(recorded.discrepancy, -3);

        let history = inventory.item_history(&item.id).await.unwrap();
        assert_eq!(history.len(), 3);
        let newest = &history[0];
        assert_eq!(newest.transaction_type, TransactionType::Count);
        assert_eq!(
            (newest.quantity, newest.previous_quantity, newest.new_quantity),
            (3, 35, 32)
        );
        assert_eq!(history[1].transaction_type, TransactionType::Return);
        assert_eq!(history[2].transaction_type, TransactionType::Pull);
        assert!(history.iter().all(|t| t.is_consistent()));
    }

    #[tokio::test]
    async fn test_matching_count_writes_no_transaction() {
        let (inventory, counts) = setup();
        let item = add_item(&inventory, "Trespa 8mm", 12).await;
        let applied = counts.record_count(&item.id, count(12, None), &actor()).await.unwrap();
        assert!(applied.transaction.is_none());
        assert!(inventory.item_history(&item.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_negative_count_rejected() {
        let (inventory, counts) = setup();
        let item = add_item(&inventory, "Trespa 6mm", 1).await;
        assert!(matches!(
            counts.record_count(&item.id, count(-1, None), &actor()).await,
            Err(InventoryError::Validation(_))
        ));
        assert!(matches!(
            counts.record_count("ghost", count(1, None), &actor()).await,
            Err(InventoryError::ItemNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_session_completion_is_idempotent() {
        let (inventory, counts) = setup();
        let mut items = Vec::new();
        for n in 0..50 {
            items.push(add_item(&inventory, &format!("Panel {n:02}"), 10).await);
        }

        let session = counts
            .create_session(
                NewCountSession {
                    name: "Q3 Count".to_string(),
                    count_type: CountType::Quarterly,
                    notes: None,
                },
                &actor(),
            )
            .await
            .unwrap();
        assert_eq!(session.total_items, 50);

        for (i, item) in items.iter().take(40).enumerate() {
            let counted = if i < 7 { 8 } else { 10 };
            counts
                .record_count(&item.id, count(counted, Some(&session.id)), &actor())
                .await
                .unwrap();
        }

        let first = counts.complete_session(&session.id).await.unwrap();
        assert_eq!(first.status, SessionStatus::Completed);
        assert_eq!(first.counted_items, 40);
        assert_eq!(first.discrepancy_count, 7);
        assert!(first.completed_at.is_some());

        let second = counts.complete_session(&session.id).await.unwrap();
        assert_eq!(second.counted_items, 40);
        assert_eq!(second.discrepancy_count, 7);

        let summary = counts.session_summary(&session.id).await.unwrap().unwrap();
        assert_eq!(summary.counts.len(), 40);
        assert_eq!(summary.uncounted_items.len(), 10);
        assert_eq!(summary.stats.total, 50);
        assert_eq!(summary.stats.discrepancies, 7);
        assert_eq!(summary.stats.shortage, 14);
        assert_eq!(summary.stats.surplus, 0);
        let net: i64 = summary.counts.iter().map(|c| i64::from(c.discrepancy)).sum();
        assert_eq!(summary.stats.surplus - summary.stats.shortage, net);

        assert!(counts.active_sessions().await.unwrap().is_empty());
        assert_eq!(counts.completed_sessions(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_closed_session_rejects_counts() {
        let (inventory, counts) = setup();
        let item = add_item(&inventory, "Trespa 13mm", 4).await;
        let session = counts
            .create_session(
                NewCountSession {
                    name: "Spot".to_string(),
                    count_type: CountType::Spot,
                    notes: None,
                },
                &actor(),
            )
            .await
            .unwrap();
        counts.complete_session(&session.id).await.unwrap();

        assert!(matches!(
            counts.record_count(&item.id, count(3, Some(&session.id)), &actor()).await,
            Err(InventoryError::SessionClosed { .. })
        ));
        assert!(matches!(
            counts.record_count(&item.id, count(3, Some("missing")), &actor()).await,
            Err(InventoryError::SessionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_summary_of_missing_session() {
        let (_, counts) = setup();
        assert!(counts.session_summary("nope").await.unwrap().is_none());
        assert!(matches!(
            counts.complete_session("nope").await,
            Err(InventoryError::SessionNotFound { .. })
        ));

        let offline = CountService::new(Arc::new(UnconfiguredStore));
        let summary = offline.session_summary("nope").await.unwrap().unwrap();
        assert!(summary.session.is_none());
        assert!(summary.counts.is_empty());
        assert_eq!(summary.stats.total, 0);
    }
}
