use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kinds of quantity-changing ledger entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Pull,
    Return,
    Adjustment,
    Count,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Pull => "pull",
            TransactionType::Return => "return",
            TransactionType::Adjustment => "adjustment",
            TransactionType::Count => "count",
            TransactionType::Transfer => "transfer",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pull" => Ok(TransactionType::Pull),
            "return" => Ok(TransactionType::Return),
            "adjustment" => Ok(TransactionType::Adjustment),
            "count" => Ok(TransactionType::Count),
            "transfer" => Ok(TransactionType::Transfer),
            other => Err(format!("Unknown transaction type '{other}'")),
        }
    }
}

/// Immutable ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub item_id: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// Magnitude of the movement, always non-negative
    pub quantity: i32,
    pub previous_quantity: i32,
    pub new_quantity: i32,
    pub user_id: String,
    pub user_name: String,
    pub job_reference: Option<String>,
    pub notes: Option<String>,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// `new_quantity` must follow from `previous_quantity` and `quantity` in the
    /// direction implied by the type
    pub fn is_consistent(&self) -> bool {
        match self.transaction_type {
            TransactionType::Pull => {
                self.new_quantity == (self.previous_quantity - self.quantity).max(0)
            }
            TransactionType::Return => {
                self.previous_quantity.checked_add(self.quantity) == Some(self.new_quantity)
            }
            TransactionType::Count | TransactionType::Adjustment => self
                .new_quantity
                .checked_sub(self.previous_quantity)
                .and_then(i32::checked_abs)
                == Some(self.quantity),
            TransactionType::Transfer => self.new_quantity == self.previous_quantity,
        }
    }
}

/// Body of a pull or return request
#[derive(Debug, Clone, Deserialize)]
pub struct StockMovementRequest {
    pub quantity: i32,
    pub job_reference: Option<String>,
    pub notes: Option<String>,
}

/// Body of a transfer request
#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequest {
    pub quantity: i32,
    pub from_location: Option<String>,
    pub to_location: String,
    pub notes: Option<String>,
}

/// Body of a manual quantity correction
#[derive(Debug, Clone, Deserialize)]
pub struct AdjustmentRequest {
    pub new_quantity: i32,
    pub notes: Option<String>,
}

/// Inclusive date window for ledger queries
#[derive(Debug, Clone, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: TransactionType, quantity: i32, previous: i32, new: i32) -> Transaction {
        Transaction {
            id: "t1".to_string(),
            item_id: "i1".to_string(),
            transaction_type: kind,
            quantity,
            previous_quantity: previous,
            new_quantity: new,
            user_id: "admin".to_string(),
            user_name: "Admin".to_string(),
            job_reference: None,
            notes: None,
            from_location: None,
            to_location: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_ledger_direction() {
        assert!(entry(TransactionType::Pull, 20, 50, 30).is_consistent());
        assert!(entry(TransactionType::Pull, 80, 50, 0).is_consistent());
        assert!(!entry(TransactionType::Pull, 20, 50, 70).is_consistent());
        assert!(entry(TransactionType::Return, 5, 30, 35).is_consistent());
        assert!(entry(TransactionType::Count, 3, 35, 32).is_consistent());
        assert!(entry(TransactionType::Transfer, 10, 35, 35).is_consistent());
        assert!(!entry(TransactionType::Return, i32::MAX, 10, i32::MIN + 9).is_consistent());
    }

    #[test]
    fn test_type_wire_name() {
        let json = serde_json::to_value(entry(TransactionType::Return, 1, 0, 1)).unwrap();
        assert_eq!(json["type"], "return");
        assert_eq!("count".parse::<TransactionType>().unwrap(), TransactionType::Count);
    }
}
