use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::error::{InventoryError, InventoryResult};
use super::reconciliation::{
    plan_adjustment, plan_pull, plan_return, plan_transfer, MovementInput, TransferInput,
};
use crate::models::{
    Actor, AdjustmentRequest, Item, ItemFilter, ItemUpdate, NewItem, StockMovementRequest,
    Transaction, TransferRequest,
};
use crate::store::{planner, AppliedChange, InventoryStore, StockOutcome, StockPlanner};

/// Catalog-wide figures for the dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InventoryStats {
    pub total_items: usize,
    pub total_value: BigDecimal,
    pub low_stock_count: usize,
    pub category_counts: BTreeMap<String, usize>,
}

/// Item catalog and stock movements (pull, return, transfer, adjust)
#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn InventoryStore>,
    strict_pulls: bool,
}

impl InventoryService {
    pub fn new(store: Arc<dyn InventoryStore>, strict_pulls: bool) -> Self {
        Self { store, strict_pulls }
    }

    pub async fn list_items(&self, filter: &ItemFilter) -> InventoryResult<Vec<Item>> {
        let items = self.store.list_items().await?;
        Ok(items.into_iter().filter(|i| filter.matches(i)).collect())
    }

    pub async fn get_item(&self, id: &str) -> InventoryResult<Option<Item>> {
        Ok(self.store.get_item(id).await?)
    }

    #[instrument(skip(self, new_item), fields(name = %new_item.name))]
    pub async fn create_item(&self, new_item: NewItem) -> InventoryResult<Item> {
        validate_new_item(&new_item)?;
        let item = new_item.into_item(Utc::now());
        self.store.insert_item(&item).await?;
        info!(item_id = %item.id, "📦 Item created");
        Ok(item)
    }

    #[instrument(skip(self, new_items), fields(count = new_items.len()))]
    pub async fn bulk_create(&self, new_items: Vec<NewItem>) -> InventoryResult<usize> {
        if new_items.is_empty() {
            return Ok(0);
        }
        for new_item in &new_items {
            validate_new_item(new_item)?;
        }
        let now = Utc::now();
        let items: Vec<Item> = new_items.into_iter().map(|n| n.into_item(now)).collect();
        let inserted = self.store.insert_items(&items).await?;
        info!(inserted, "📦 Items imported");
        Ok(inserted)
    }

    /// Insert items already built by the importer
    pub async fn insert_imported(&self, items: &[Item]) -> InventoryResult<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        Ok(self.store.insert_items(items).await?)
    }

    #[instrument(skip(self, update))]
    pub async fn update_item(&self, id: &str, update: ItemUpdate) -> InventoryResult<Option<Item>> {
        let Some(mut item) = self.store.get_item(id).await? else {
            return Ok(None);
        };
        update.apply(&mut item, Utc::now());
        if item.name.is_empty() {
            return Err(InventoryError::validation("Item name cannot be empty"));
        }
        if item.reorder_level < 0 {
            return Err(InventoryError::validation("Reorder level cannot be negative"));
        }
        if !self.store.update_item(&item).await? {
            return Ok(None);
        }
        Ok(self.store.get_item(id).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_item(&self, id: &str) -> InventoryResult<bool> {
        let deleted = self.store.delete_item(id).await?;
        if deleted {
            warn!(item_id = %id, "🗑️ Item deleted with its transactions and counts");
        }
        Ok(deleted)
    }

    pub async fn low_stock_items(&self) -> InventoryResult<Vec<Item>> {
        let items = self.store.list_items().await?;
        Ok(items.into_iter().filter(Item::is_low_stock).collect())
    }

    pub async fn inventory_stats(&self) -> InventoryResult<InventoryStats> {
        let items = self.store.list_items().await?;
        let mut stats = InventoryStats {
            total_items: items.len(),
            ..Default::default()
        };
        for item in &items {
            stats.total_value = &stats.total_value + &item.stock_value();
            if item.is_low_stock() {
                stats.low_stock_count += 1;
            }
            *stats
                .category_counts
                .entry(item.category.to_string())
                .or_insert(0) += 1;
        }
        Ok(stats)
    }

    pub async fn item_history(&self, item_id: &str) -> InventoryResult<Vec<Transaction>> {
        Ok(self.store.item_transactions(item_id).await?)
    }

    pub async fn recent_activity(&self, limit: usize) -> InventoryResult<Vec<Transaction>> {
        Ok(self.store.recent_transactions(limit).await?)
    }

    pub async fn transactions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> InventoryResult<Vec<Transaction>> {
        if end < start {
            return Err(InventoryError::validation("End date must not precede start date"));
        }
        Ok(self.store.transactions_between(start, end).await?)
    }

    /// Remove stock for a job
    #[instrument(skip(self, request, actor), fields(user = %actor.user_name, quantity = request.quantity))]
    pub async fn pull(
        &self,
        item_id: &str,
        request: StockMovementRequest,
        actor: &Actor,
    ) -> InventoryResult<AppliedChange> {
        let input = movement_input(request)?;
        let strict = self.strict_pulls;
        let actor_owned = actor.clone();
        let applied = self
            .apply(
                item_id,
                planner(move |item: &Item| plan_pull(item, &input, &actor_owned, Utc::now(), strict)),
            )
            .await?;
        log_movement("pull", &applied);
        Ok(applied)
    }

    /// Put unused stock back
    #[instrument(skip(self, request, actor), fields(user = %actor.user_name, quantity = request.quantity))]
    pub async fn return_stock(
        &self,
        item_id: &str,
        request: StockMovementRequest,
        actor: &Actor,
    ) -> InventoryResult<AppliedChange> {
        let input = movement_input(request)?;
        let actor_owned = actor.clone();
        let applied = self
            .apply(
                item_id,
                planner(move |item: &Item| plan_return(item, &input, &actor_owned, Utc::now())),
            )
            .await?;
        log_movement("return", &applied);
        Ok(applied)
    }

    /// Log a location change; on-hand quantity is not touched.
    /// A missing `from_location` defaults to the item's current location.
    #[instrument(skip(self, request, actor), fields(user = %actor.user_name, to = %request.to_location))]
    pub async fn transfer(
        &self,
        item_id: &str,
        request: TransferRequest,
        actor: &Actor,
    ) -> InventoryResult<AppliedChange> {
        if request.quantity <= 0 {
            return Err(InventoryError::validation("Transfer quantity must be greater than zero"));
        }
        let to_location = request.to_location.trim().to_string();
        if to_location.is_empty() {
            return Err(InventoryError::validation("Destination location is required"));
        }
        let from_location = request.from_location.map(|f| f.trim().to_string());
        let quantity = request.quantity;
        let notes = request.notes;
        let actor_owned = actor.clone();

        let applied = self
            .apply(
                item_id,
                planner(move |item: &Item| {
                    let from_location = from_location
                        .filter(|f| !f.is_empty())
                        .unwrap_or_else(|| {
                            if item.location.is_empty() {
                                "Stock".to_string()
                            } else {
                                item.location.clone()
                            }
                        });
                    let input = TransferInput {
                        quantity,
                        from_location,
                        to_location,
                        notes,
                    };
                    Ok(plan_transfer(item, &input, &actor_owned, Utc::now()))
                }),
            )
            .await?;
        log_movement("transfer", &applied);
        Ok(applied)
    }

    /// Manual correction to an absolute quantity
    #[instrument(skip(self, request, actor), fields(user = %actor.user_name, new_quantity = request.new_quantity))]
    pub async fn adjust(
        &self,
        item_id: &str,
        request: AdjustmentRequest,
        actor: &Actor,
    ) -> InventoryResult<AppliedChange> {
        if request.new_quantity < 0 {
            return Err(InventoryError::validation("Quantity cannot be negative"));
        }
        let new_quantity = request.new_quantity;
        let notes = request.notes;
        let actor_owned = actor.clone();
        let applied = self
            .apply(
                item_id,
                planner(move |item: &Item| {
                    Ok(plan_adjustment(item, new_quantity, notes, &actor_owned, Utc::now()))
                }),
            )
            .await?;
        log_movement("adjustment", &applied);
        Ok(applied)
    }

    async fn apply(&self, item_id: &str, plan: StockPlanner) -> InventoryResult<AppliedChange> {
        match self.store.apply_stock_change(item_id, plan).await? {
            StockOutcome::Applied(applied) => Ok(applied),
            StockOutcome::ItemNotFound => Err(InventoryError::ItemNotFound {
                item_id: item_id.to_string(),
            }),
            StockOutcome::Rejected(rejection) => Err(rejection.into()),
        }
    }
}

fn validate_new_item(item: &NewItem) -> InventoryResult<()> {
    if item.name.trim().is_empty() {
        return Err(InventoryError::validation("Item name is required"));
    }
    if item.quantity < 0 {
        return Err(InventoryError::validation("Quantity cannot be negative"));
    }
    if item.reorder_level < 0 {
        return Err(InventoryError::validation("Reorder level cannot be negative"));
    }
    Ok(())
}

fn movement_input(request: StockMovementRequest) -> InventoryResult<MovementInput> {
    if request.quantity <= 0 {
        return Err(InventoryError::validation("Quantity must be greater than zero"));
    }
    Ok(MovementInput {
        quantity: request.quantity,
        job_reference: request.job_reference.filter(|j| !j.trim().is_empty()),
        notes: request.notes.filter(|n| !n.trim().is_empty()),
    })
}

fn log_movement(kind: &str, applied: &AppliedChange) {
    if let Some(tx) = &applied.transaction {
        info!(
            item_id = %applied.item.id,
            kind,
            previous = tx.previous_quantity,
            new = tx.new_quantity,
            "📝 Stock {} recorded",
            kind
        );
    }
}
