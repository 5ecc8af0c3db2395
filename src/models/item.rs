use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::new_id;

/// Material categories carried by the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "ACM")]
    Acm,
    SwissPearl,
    Trespa,
    Extrusions,
    Tools,
    Hardware,
    #[default]
    Other,
}

/// Keywords recognised when normalising free-text category cells
const CATEGORY_KEYWORDS: &[(&str, Category)] = &[
    ("acm", Category::Acm),
    ("swiss pearl", Category::SwissPearl),
    ("swisspearl", Category::SwissPearl),
    ("swiss", Category::SwissPearl),
    ("trespa", Category::Trespa),
    ("extrusion", Category::Extrusions),
    ("extrusions", Category::Extrusions),
    ("profile", Category::Extrusions),
    ("profiles", Category::Extrusions),
    ("tool", Category::Tools),
    ("tools", Category::Tools),
    ("hardware", Category::Hardware),
    ("fastener", Category::Hardware),
    ("fasteners", Category::Hardware),
];

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Acm,
        Category::SwissPearl,
        Category::Trespa,
        Category::Extrusions,
        Category::Tools,
        Category::Hardware,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Acm => "ACM",
            Category::SwissPearl => "SwissPearl",
            Category::Trespa => "Trespa",
            Category::Extrusions => "Extrusions",
            Category::Tools => "Tools",
            Category::Hardware => "Hardware",
            Category::Other => "Other",
        }
    }

    /// Map a spreadsheet cell onto a category; unknown values become `Other`
    pub fn normalize(value: &str) -> Self {
        let lower = value.trim().to_lowercase();
        CATEGORY_KEYWORDS
            .iter()
            .find(|(keyword, _)| *keyword == lower)
            .map(|(_, category)| *category)
            .unwrap_or_default()
    }

    /// Warehouse wording for where this kind of material is kept
    pub fn location_term(&self) -> &'static str {
        match self {
            Category::Extrusions => "rack",
            Category::Acm => "row",
            Category::SwissPearl | Category::Trespa => "tent",
            Category::Hardware => "rivet room",
            _ => "location",
        }
    }

    pub fn location_term_capitalized(&self) -> String {
        let term = self.location_term();
        let mut chars = term.chars();
        match chars.next() {
            None => String::new(),
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        }
    }

    pub fn location_placeholder(&self) -> &'static str {
        match self {
            Category::Extrusions => "e.g., Rack 3, Rack A",
            Category::Acm => "e.g., Row 1, Row B",
            Category::SwissPearl | Category::Trespa => "e.g., Tent 1, Tent A",
            Category::Hardware => "e.g., Rivet Room Shelf 1",
            _ => "e.g., Warehouse A, Shelf 3",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown category '{s}'"))
    }
}

/// Catalog entry; `quantity` is the authoritative on-hand figure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub quantity: i32,
    pub location: String,
    pub supplier: String,
    pub reorder_level: i32,
    pub notes: String,
    pub sku: Option<String>,
    pub unit_cost: Option<BigDecimal>,
    pub last_count_date: Option<DateTime<Utc>>,
    pub last_count_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// A reorder level of 0 disables the alert
    pub fn is_low_stock(&self) -> bool {
        self.reorder_level > 0 && self.quantity <= self.reorder_level
    }

    pub fn stock_value(&self) -> BigDecimal {
        match &self.unit_cost {
            Some(cost) => cost * &BigDecimal::from(i64::from(self.quantity)),
            None => BigDecimal::default(),
        }
    }

    pub fn matches_query(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.name.to_lowercase().contains(&needle)
            || self.location.to_lowercase().contains(&needle)
            || self.supplier.to_lowercase().contains(&needle)
            || self
                .sku
                .as_deref()
                .map(|sku| sku.to_lowercase().contains(&needle))
                .unwrap_or(false)
    }
}

/// Payload for creating an item
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewItem {
    pub id: Option<String>,
    pub name: String,
    pub category: Category,
    pub quantity: i32,
    pub location: String,
    pub supplier: String,
    pub reorder_level: i32,
    pub notes: String,
    pub sku: Option<String>,
    pub unit_cost: Option<BigDecimal>,
}

impl NewItem {
    pub fn into_item(self, now: DateTime<Utc>) -> Item {
        Item {
            id: self.id.unwrap_or_else(new_id),
            name: self.name.trim().to_string(),
            category: self.category,
            quantity: self.quantity,
            location: self.location.trim().to_string(),
            supplier: self.supplier.trim().to_string(),
            reorder_level: self.reorder_level,
            notes: self.notes,
            sku: self.sku.filter(|s| !s.trim().is_empty()),
            unit_cost: self.unit_cost,
            last_count_date: None,
            last_count_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; absent fields are left untouched.
/// Quantity is deliberately missing: stock only moves through the ledger.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ItemUpdate {
    pub name: Option<String>,
    pub category: Option<Category>,
    pub location: Option<String>,
    pub supplier: Option<String>,
    pub reorder_level: Option<i32>,
    pub notes: Option<String>,
    pub sku: Option<String>,
    pub unit_cost: Option<BigDecimal>,
}

impl ItemUpdate {
    pub fn apply(self, item: &mut Item, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            item.name = name.trim().to_string();
        }
        if let Some(category) = self.category {
            item.category = category;
        }
        if let Some(location) = self.location {
            item.location = location.trim().to_string();
        }
        if let Some(supplier) = self.supplier {
            item.supplier = supplier.trim().to_string();
        }
        if let Some(reorder_level) = self.reorder_level {
            item.reorder_level = reorder_level;
        }
        if let Some(notes) = self.notes {
            item.notes = notes;
        }
        if let Some(sku) = self.sku {
            item.sku = Some(sku).filter(|s| !s.trim().is_empty());
        }
        if let Some(unit_cost) = self.unit_cost {
            item.unit_cost = Some(unit_cost);
        }
        item.updated_at = now;
    }
}

/// Catalog search filter
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ItemFilter {
    pub query: Option<String>,
    pub category: Option<Category>,
}

impl ItemFilter {
    pub fn matches(&self, item: &Item) -> bool {
        let category_ok = self.category.map(|c| c == item.category).unwrap_or(true);
        let query_ok = self
            .query
            .as_deref()
            .map(|q| item.matches_query(q))
            .unwrap_or(true);
        category_ok && query_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: i32, reorder_level: i32) -> Item {
        NewItem {
            name: "4\" Aluminum Angle".to_string(),
            category: Category::Extrusions,
            quantity,
            reorder_level,
            location: "Rack 3".to_string(),
            ..Default::default()
        }
        .into_item(Utc::now())
    }

    #[test]
    fn test_category_normalization() {
        assert_eq!(Category::normalize(" Swiss Pearl "), Category::SwissPearl);
        assert_eq!(Category::normalize("FASTENERS"), Category::Hardware);
        assert_eq!(Category::normalize("profile"), Category::Extrusions);
        assert_eq!(Category::normalize("plywood"), Category::Other);
        assert_eq!(Category::normalize(""), Category::Other);
    }

    #[test]
    fn test_category_serde_names() {
        assert_eq!(serde_json::to_string(&Category::Acm).unwrap(), "\"ACM\"");
        assert_eq!(
            serde_json::from_str::<Category>("\"SwissPearl\"").unwrap(),
            Category::SwissPearl
        );
        assert_eq!("Trespa".parse::<Category>().unwrap(), Category::Trespa);
        assert!("Lumber".parse::<Category>().is_err());
    }

    #[test]
    fn test_location_terms() {
        assert_eq!(Category::Extrusions.location_term(), "rack");
        assert_eq!(Category::Trespa.location_term(), "tent");
        assert_eq!(Category::Hardware.location_term_capitalized(), "Rivet room");
        assert_eq!(Category::Tools.location_term(), "location");
    }

    #[test]
    fn test_low_stock_threshold() {
        assert!(item(10, 10).is_low_stock());
        assert!(!item(11, 10).is_low_stock());
        // zero reorder level never alerts
        assert!(!item(0, 0).is_low_stock());
    }

    #[test]
    fn test_stock_value() {
        let mut it = item(4, 0);
        assert_eq!(it.stock_value(), BigDecimal::default());
        it.unit_cost = Some("12.50".parse().unwrap());
        assert_eq!(it.stock_value(), "50.00".parse::<BigDecimal>().unwrap());
    }

    #[test]
    fn test_update_leaves_quantity_alone() {
        let mut it = item(7, 2);
        ItemUpdate {
            location: Some(" Rack 9 ".to_string()),
            sku: Some("".to_string()),
            ..Default::default()
        }
        .apply(&mut it, Utc::now());
        assert_eq!(it.location, "Rack 9");
        assert_eq!(it.quantity, 7);
        assert_eq!(it.sku, None);
    }

    #[test]
    fn test_filter_matches_sku_and_category() {
        let mut it = item(1, 0);
        it.sku = Some("EX-100".to_string());
        let filter = ItemFilter {
            query: Some("ex-1".to_string()),
            category: Some(Category::Extrusions),
        };
        assert!(filter.matches(&it));
        let wrong = ItemFilter {
            category: Some(Category::Tools),
            ..Default::default()
        };
        assert!(!wrong.matches(&it));
    }
}
