//! Ledger arithmetic for counts and stock movements, kept free of storage so
//! the store can run it inside its write lock or database transaction.

use chrono::{DateTime, Utc};

use crate::models::{
    new_id, Actor, CountType, InventoryCount, Item, SessionStats, Transaction, TransactionType,
};
use crate::store::{CountStamp, StockChange, StockRejection};

/// Inputs of one physical count
#[derive(Debug, Clone)]
pub struct CountInput {
    pub counted_quantity: i32,
    pub count_type: CountType,
    pub notes: Option<String>,
    pub count_session_id: Option<String>,
}

/// Inputs of a pull or return
#[derive(Debug, Clone)]
pub struct MovementInput {
    pub quantity: i32,
    pub job_reference: Option<String>,
    pub notes: Option<String>,
}

/// Inputs of a location transfer
#[derive(Debug, Clone)]
pub struct TransferInput {
    pub quantity: i32,
    pub from_location: String,
    pub to_location: String,
    pub notes: Option<String>,
}

fn ledger_entry(
    item: &Item,
    kind: TransactionType,
    quantity: i32,
    new_quantity: i32,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Transaction {
    Transaction {
        id: new_id(),
        item_id: item.id.clone(),
        transaction_type: kind,
        quantity,
        previous_quantity: item.quantity,
        new_quantity,
        user_id: actor.user_id.clone(),
        user_name: actor.user_name.clone(),
        job_reference: None,
        notes: None,
        from_location: None,
        to_location: None,
        created_at: now,
    }
}

/// Note attached to a count adjustment, e.g. `quarterly count adjustment: -3`
pub fn count_adjustment_note(count_type: CountType, discrepancy: i32) -> String {
    let sign = if discrepancy > 0 { "+" } else { "" };
    format!("{count_type} count adjustment: {sign}{discrepancy}")
}

/// Reconcile a physical count against the item's system quantity.
///
/// The count row is always written. A `count` ledger entry is only added when
/// the figures disagree; an exact match leaves the ledger untouched.
pub fn plan_count(item: &Item, input: &CountInput, actor: &Actor, now: DateTime<Utc>) -> StockChange {
    let discrepancy = input.counted_quantity - item.quantity;

    let count = InventoryCount {
        id: new_id(),
        item_id: item.id.clone(),
        counted_quantity: input.counted_quantity,
        system_quantity: item.quantity,
        discrepancy,
        user_id: actor.user_id.clone(),
        user_name: actor.user_name.clone(),
        count_type: input.count_type,
        count_session_id: input.count_session_id.clone(),
        notes: input.notes.clone(),
        created_at: now,
    };

    let transaction = (discrepancy != 0).then(|| Transaction {
        notes: Some(count_adjustment_note(input.count_type, discrepancy)),
        ..ledger_entry(
            item,
            TransactionType::Count,
            discrepancy.abs(),
            input.counted_quantity,
            actor,
            now,
        )
    });

    StockChange {
        new_quantity: input.counted_quantity,
        transaction,
        count: Some(count),
        count_stamp: Some(CountStamp {
            at: now,
            by: actor.user_name.clone(),
        }),
        updated_at: now,
    }
}

/// Remove stock for a job. Without `strict`, over-pulls clamp at zero.
pub fn plan_pull(
    item: &Item,
    input: &MovementInput,
    actor: &Actor,
    now: DateTime<Utc>,
    strict: bool,
) -> Result<StockChange, StockRejection> {
    if strict && input.quantity > item.quantity {
        return Err(StockRejection::Insufficient {
            requested: input.quantity,
            available: item.quantity,
        });
    }

    let new_quantity = (item.quantity - input.quantity).max(0);
    let transaction = Transaction {
        job_reference: input.job_reference.clone(),
        notes: input.notes.clone(),
        ..ledger_entry(item, TransactionType::Pull, input.quantity, new_quantity, actor, now)
    };

    Ok(StockChange {
        new_quantity,
        transaction: Some(transaction),
        count: None,
        count_stamp: None,
        updated_at: now,
    })
}

/// Put stock back; refused when the new total would overflow
pub fn plan_return(
    item: &Item,
    input: &MovementInput,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<StockChange, StockRejection> {
    let new_quantity = item
        .quantity
        .checked_add(input.quantity)
        .ok_or(StockRejection::Overflow {
            current: item.quantity,
            added: input.quantity,
        })?;
    let transaction = Transaction {
        job_reference: input.job_reference.clone(),
        notes: input.notes.clone(),
        ..ledger_entry(item, TransactionType::Return, input.quantity, new_quantity, actor, now)
    };

    Ok(StockChange {
        new_quantity,
        transaction: Some(transaction),
        count: None,
        count_stamp: None,
        updated_at: now,
    })
}

/// Record a location move. Quantity is unchanged; callers pair it with a pull
/// or return when stock actually leaves.
pub fn plan_transfer(item: &Item, input: &TransferInput, actor: &Actor, now: DateTime<Utc>) -> StockChange {
    let transaction = Transaction {
        notes: input.notes.clone(),
        from_location: Some(input.from_location.clone()),
        to_location: Some(input.to_location.clone()),
        ..ledger_entry(item, TransactionType::Transfer, input.quantity, item.quantity, actor, now)
    };

    StockChange {
        new_quantity: item.quantity,
        transaction: Some(transaction),
        count: None,
        count_stamp: None,
        updated_at: now,
    }
}

/// Manual correction to an absolute quantity; no ledger entry when nothing moves
pub fn plan_adjustment(
    item: &Item,
    new_quantity: i32,
    notes: Option<String>,
    actor: &Actor,
    now: DateTime<Utc>,
) -> StockChange {
    let delta = new_quantity - item.quantity;
    let transaction = (delta != 0).then(|| Transaction {
        notes,
        ..ledger_entry(item, TransactionType::Adjustment, delta.abs(), new_quantity, actor, now)
    });

    StockChange {
        new_quantity,
        transaction,
        count: None,
        count_stamp: None,
        updated_at: now,
    }
}

/// `(counted_items, discrepancy_count)` for a session's count rows
pub fn session_aggregates(counts: &[InventoryCount]) -> (i32, i32) {
    let counted = counts.len() as i32;
    let discrepancies = counts.iter().filter(|c| c.discrepancy != 0).count() as i32;
    (counted, discrepancies)
}

pub fn session_stats(total_items: i32, counts: &[InventoryCount]) -> SessionStats {
    let (counted, discrepancies) = session_aggregates(counts);
    let surplus = counts
        .iter()
        .filter(|c| c.discrepancy > 0)
        .map(|c| i64::from(c.discrepancy))
        .sum();
    let shortage = counts
        .iter()
        .filter(|c| c.discrepancy < 0)
        .map(|c| i64::from(c.discrepancy).abs())
        .sum();

    SessionStats {
        total: total_items,
        counted,
        discrepancies,
        surplus,
        shortage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, NewItem, Role};

    fn actor() -> Actor {
        Actor {
            user_id: "u-7".to_string(),
            user_name: "Dana".to_string(),
            role: Role::Counter,
        }
    }

    fn item(quantity: i32) -> Item {
        NewItem {
            name: "Trespa Meteon 8mm".to_string(),
            category: Category::Trespa,
            quantity,
            reorder_level: 10,
            ..Default::default()
        }
        .into_item(Utc::now())
    }

    fn count_input(counted: i32) -> CountInput {
        CountInput {
            counted_quantity: counted,
            count_type: CountType::Quarterly,
            notes: None,
            count_session_id: Some("s-1".to_string()),
        }
    }

    #[test]
    fn test_count_shortage_logs_adjustment() {
        let it = item(35);
        let change = plan_count(&it, &count_input(32), &actor(), Utc::now());

        assert_eq!(change.new_quantity, 32);
        let count = change.count.unwrap();
        assert_eq!(count.system_quantity, 35);
        assert_eq!(count.discrepancy, -3);
        assert_eq!(count.count_session_id.as_deref(), Some("s-1"));

        let tx = change.transaction.unwrap();
        assert_eq!(tx.transaction_type, TransactionType::Count);
        assert_eq!(tx.quantity, 3);
        assert_eq!(tx.previous_quantity, 35);
        assert_eq!(tx.new_quantity, 32);
        assert!(tx.notes.unwrap().contains("-3"));
        assert_eq!(change.count_stamp.unwrap().by, "Dana");
    }

    #[test]
    fn test_count_surplus_note_is_signed() {
        let change = plan_count(&item(10), &count_input(14), &actor(), Utc::now());
        let tx = change.transaction.unwrap();
        assert_eq!(tx.quantity, 4);
        assert_eq!(tx.notes.as_deref(), Some("quarterly count adjustment: +4"));
        assert!(tx.is_consistent());
    }

    #[test]
    fn test_matching_count_is_silent() {
        let change = plan_count(&item(12), &count_input(12), &actor(), Utc::now());
        assert!(change.transaction.is_none());
        assert_eq!(change.count.unwrap().discrepancy, 0);
        assert!(change.count_stamp.is_some());
    }

    #[test]
    fn test_pull_clamps_at_zero() {
        let input = MovementInput {
            quantity: 80,
            job_reference: Some("JOB-1142".to_string()),
            notes: None,
        };
        let change = plan_pull(&item(50), &input, &actor(), Utc::now(), false).unwrap();
        assert_eq!(change.new_quantity, 0);
        let tx = change.transaction.unwrap();
        assert_eq!(tx.quantity, 80);
        assert_eq!(tx.job_reference.as_deref(), Some("JOB-1142"));
        assert!(tx.is_consistent());
    }

    #[test]
    fn test_strict_pull_rejects_over_pull() {
        let input = MovementInput {
            quantity: 51,
            job_reference: None,
            notes: None,
        };
        let err = plan_pull(&item(50), &input, &actor(), Utc::now(), true).unwrap_err();
        assert_eq!(err, StockRejection::Insufficient { requested: 51, available: 50 });
    }

    #[test]
    fn test_return_has_no_ceiling() {
        let input = MovementInput {
            quantity: 1_000,
            job_reference: None,
            notes: Some("unused".to_string()),
        };
        let change = plan_return(&item(50), &input, &actor(), Utc::now()).unwrap();
        assert_eq!(change.new_quantity, 1_050);
    }

    #[test]
    fn test_return_past_i32_max_is_refused() {
        let input = MovementInput {
            quantity: i32::MAX,
            job_reference: None,
            notes: None,
        };
        let err = plan_return(&item(10), &input, &actor(), Utc::now()).unwrap_err();
        assert_eq!(err, StockRejection::Overflow { current: 10, added: i32::MAX });

        let exact = MovementInput {
            quantity: i32::MAX - 10,
            ..input
        };
        let change = plan_return(&item(10), &exact, &actor(), Utc::now()).unwrap();
        assert_eq!(change.new_quantity, i32::MAX);
        assert!(change.transaction.unwrap().is_consistent());
    }

    #[test]
    fn test_transfer_keeps_quantity() {
        let input = TransferInput {
            quantity: 6,
            from_location: "Tent 1".to_string(),
            to_location: "Job Site".to_string(),
            notes: None,
        };
        let change = plan_transfer(&item(20), &input, &actor(), Utc::now());
        assert_eq!(change.new_quantity, 20);
        let tx = change.transaction.unwrap();
        assert_eq!(tx.previous_quantity, tx.new_quantity);
        assert_eq!(tx.to_location.as_deref(), Some("Job Site"));
    }

    #[test]
    fn test_adjustment_without_movement_is_silent() {
        let change = plan_adjustment(&item(20), 20, None, &actor(), Utc::now());
        assert!(change.transaction.is_none());
        let change = plan_adjustment(&item(20), 5, None, &actor(), Utc::now());
        assert_eq!(change.transaction.unwrap().quantity, 15);
    }

    #[test]
    fn test_session_stats_balance() {
        let base = item(10);
        let counts: Vec<InventoryCount> = [12, 7, 10, 4, 15]
            .iter()
            .map(|&counted| plan_count(&base, &count_input(counted), &actor(), Utc::now()).count.unwrap())
            .collect();

        let stats = session_stats(100, &counts);
        assert_eq!(stats.total, 100);
        assert_eq!(stats.counted, 5);
        assert_eq!(stats.discrepancies, 4);
        assert_eq!(stats.surplus, 7);
        assert_eq!(stats.shortage, 9);
        let net: i64 = counts.iter().map(|c| i64::from(c.discrepancy)).sum();
        assert_eq!(stats.surplus - stats.shortage, net);
    }
}
