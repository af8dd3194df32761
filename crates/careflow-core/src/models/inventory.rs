//! Inventory item models.

use serde::{Deserialize, Serialize};

/// Broad category of an inventory item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ItemCategory {
    /// Dispensable medication
    Medicine,
    /// Consumable supply (gloves, syringes)
    Supply,
    /// Lab reagent or kit
    Lab,
    /// Durable equipment
    Equipment,
}

/// A stocked item in the clinic inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryItem {
    /// Unique item ID
    pub id: String,
    /// Item name
    pub name: String,
    /// Units on hand, never negative
    pub stock: i64,
    /// Reorder threshold
    pub min_stock_level: i64,
    /// Stocking unit (e.g. "tablet", "bottle")
    pub unit: String,
    /// Item category
    pub category: ItemCategory,
    /// Selling price per unit
    pub price: f64,
    /// Supplier batch number
    pub batch_number: Option<String>,
    /// Expiry date (ISO date)
    pub expiry_date: Option<String>,
    /// Supplier reference
    pub supplier_id: Option<String>,
    /// Optimistic concurrency counter
    pub version: i64,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl InventoryItem {
    /// Create a new item with required fields, starting at zero stock.
    pub fn new(name: String, category: ItemCategory, unit: String, price: f64) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            stock: 0,
            min_stock_level: 10,
            unit,
            category,
            price,
            batch_number: None,
            expiry_date: None,
            supplier_id: None,
            version: 1,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Stock after applying a signed delta, clamped at zero.
    pub fn clamped_stock(&self, delta: i64) -> i64 {
        (self.stock + delta).max(0)
    }

    /// Whether stock has fallen to the reorder threshold.
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.min_stock_level
    }

    /// Whether the item has expired as of the given ISO date.
    /// ISO dates compare lexically.
    pub fn is_expired(&self, today: &str) -> bool {
        match &self.expiry_date {
            Some(date) => date.as_str() <= today,
            None => false,
        }
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}
