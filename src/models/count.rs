use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::item::Item;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountType {
    Quarterly,
    Daily,
    Spot,
}

impl CountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountType::Quarterly => "quarterly",
            CountType::Daily => "daily",
            CountType::Spot => "spot",
        }
    }
}

impl fmt::Display for CountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quarterly" => Ok(CountType::Quarterly),
            "daily" => Ok(CountType::Daily),
            "spot" => Ok(CountType::Spot),
            other => Err(format!("Unknown count type '{other}'")),
        }
    }
}

/// One physical count observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryCount {
    pub id: String,
    pub item_id: String,
    pub counted_quantity: i32,
    /// System quantity captured at count time
    pub system_quantity: i32,
    /// `counted_quantity - system_quantity`
    pub discrepancy: i32,
    pub user_id: String,
    pub user_name: String,
    pub count_type: CountType,
    pub count_session_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            other => Err(format!("Unknown session status '{other}'")),
        }
    }
}

/// Named batch of counts, e.g. a quarterly count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountSession {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub count_type: CountType,
    pub status: SessionStatus,
    pub started_by: String,
    pub started_by_name: String,
    /// Catalog size when the session started
    pub total_items: i32,
    pub counted_items: i32,
    pub discrepancy_count: i32,
    pub notes: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CountSession {
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::InProgress
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total: i32,
    pub counted: i32,
    pub discrepancies: i32,
    /// Sum of positive discrepancies
    pub surplus: i64,
    /// Sum of the magnitudes of negative discrepancies
    pub shortage: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSummary {
    pub session: Option<CountSession>,
    pub counts: Vec<InventoryCount>,
    pub uncounted_items: Vec<Item>,
    pub stats: SessionStats,
}

/// Body of a physical count submission
#[derive(Debug, Clone, Deserialize)]
pub struct CountRequest {
    pub counted_quantity: i32,
    pub count_type: CountType,
    pub notes: Option<String>,
    pub count_session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCountSession {
    pub name: String,
    #[serde(rename = "type")]
    pub count_type: CountType,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CountSessionUpdate {
    pub name: Option<String>,
    pub notes: Option<String>,
}
