//! Inventory audit log models.

use serde::{Deserialize, Serialize};

/// What kind of inventory mutation a log entry records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InventoryAction {
    /// Item added to the catalog
    Created,
    /// Item fields edited
    Updated,
    /// Stock replenished
    Restocked,
    /// Stock deducted by dispensing
    Dispensed,
    /// Item retired from the catalog
    Deleted,
}

/// One append-only audit entry. Every stock-affecting mutation produces
/// exactly one of these; `quantity_change` is the delta actually applied
/// after clamping, not the delta requested.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryLog {
    /// Unique log ID
    pub id: String,
    /// Item the entry refers to
    pub item_id: String,
    /// Item name (denormalized, survives item deletion)
    pub item_name: String,
    /// Mutation kind
    pub action: InventoryAction,
    /// Signed applied delta, None for non-stock edits
    pub quantity_change: Option<i64>,
    /// Free-text reason (e.g. "Dispensed to Amina Yusuf (Visit ...)")
    pub notes: String,
    /// Staff member who performed the mutation
    pub user: String,
    /// Entry timestamp
    pub timestamp: String,
    /// Hash of the previous entry in the chain
    pub prev_hash: String,
    /// Hash sealing this entry, filled by the ledger
    pub entry_hash: String,
}

impl InventoryLog {
    /// Create an unsealed entry; the ledger chains and seals it on insert.
    pub fn new(
        item_id: String,
        item_name: String,
        action: InventoryAction,
        quantity_change: Option<i64>,
        notes: String,
        user: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            item_id,
            item_name,
            action,
            quantity_change,
            notes,
            user,
            timestamp: chrono::Utc::now().to_rfc3339(),
            prev_hash: String::new(),
            entry_hash: String::new(),
        }
    }

    /// Whether this entry moved stock.
    pub fn affects_stock(&self) -> bool {
        matches!(self.quantity_change, Some(delta) if delta != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_log_is_unsealed() {
        let log = InventoryLog::new(
            "item-1".into(),
            "Paracetamol 500mg".into(),
            InventoryAction::Dispensed,
            Some(-2),
            "Dispensed to Amina Yusuf".into(),
            "pharmacist".into(),
        );
        assert!(log.entry_hash.is_empty());
        assert!(log.prev_hash.is_empty());
        assert!(log.affects_stock());
    }

    #[test]
    fn test_affects_stock() {
        let mut log = InventoryLog::new(
            "item-1".into(),
            "Gloves".into(),
            InventoryAction::Updated,
            None,
            "Price change".into(),
            "admin".into(),
        );
        assert!(!log.affects_stock());
        log.quantity_change = Some(0);
        assert!(!log.affects_stock());
        log.quantity_change = Some(5);
        assert!(log.affects_stock());
    }
}
