//! Inventory ledger service.
//!
//! Single entry point for catalog and stock mutations. Every write lands
//! together with exactly one audit entry, sealed onto a hash chain in
//! the same transaction, so stock on the shelf and the paper trail
//! cannot disagree.

mod chain;

pub use chain::{entry_hash, seal, verify_chain, BreakReason, ChainStatus};

use strsim::{jaro_winkler, normalized_levenshtein};
use thiserror::Error;

use crate::db::{Database, DbError};
use crate::models::{InventoryAction, InventoryItem, InventoryLog};

/// Number of candidates to retrieve from FTS5 before re-ranking.
const FTS_CANDIDATE_LIMIT: usize = 20;

/// Ledger errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Result of a stock adjustment.
#[derive(Debug, Clone)]
pub struct StockAdjustment {
    /// Item state after the write
    pub item: InventoryItem,
    /// Delta the caller asked for
    pub requested: i64,
    /// Delta actually applied after clamping at zero
    pub applied: i64,
    /// The sealed audit entry
    pub log: InventoryLog,
}

impl StockAdjustment {
    /// Whether clamping reduced the requested deduction.
    pub fn was_clamped(&self) -> bool {
        self.applied != self.requested
    }
}

/// Inventory ledger manager.
pub struct InventoryLedger<'a> {
    db: &'a Database,
}

impl<'a> InventoryLedger<'a> {
    /// Create a new ledger manager.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Add an item to the catalog with a 'created' entry. Initial stock
    /// is recorded as the entry's delta when non-zero.
    pub fn create_item(&self, item: &InventoryItem, user: &str) -> LedgerResult<InventoryLog> {
        let change = (item.stock != 0).then_some(item.stock);
        let mut log = InventoryLog::new(
            item.id.clone(),
            item.name.clone(),
            InventoryAction::Created,
            change,
            format!("Added to catalog with stock {}", item.stock),
            user.to_string(),
        );
        self.db.insert_item_logged(item, &mut log)?;

        tracing::info!("Created inventory item {} ({})", item.name, item.id);
        Ok(log)
    }

    /// Apply a signed stock delta. Deductions clamp at zero; the audit
    /// entry records the delta actually applied, not the one requested.
    pub fn adjust_stock(
        &self,
        item_id: &str,
        delta: i64,
        action: InventoryAction,
        notes: &str,
        user: &str,
    ) -> LedgerResult<StockAdjustment> {
        let mut item = self
            .db
            .get_item(item_id)?
            .ok_or_else(|| LedgerError::ItemNotFound(item_id.into()))?;

        let new_stock = item.clamped_stock(delta);
        let applied = new_stock - item.stock;
        if applied != delta {
            tracing::warn!(
                "Stock for {} clamped at zero: requested {:+}, applied {:+}",
                item.name,
                delta,
                applied
            );
        }
        item.stock = new_stock;

        let mut log = InventoryLog::new(
            item.id.clone(),
            item.name.clone(),
            action,
            Some(applied),
            notes.to_string(),
            user.to_string(),
        );
        item.version = self.db.update_item_logged(&item, &mut log)?;

        Ok(StockAdjustment {
            item,
            requested: delta,
            applied,
            log,
        })
    }

    /// Replenish stock. Positive quantities only; deductions go through
    /// `adjust_stock` with a negative delta.
    pub fn restock(
        &self,
        item_id: &str,
        quantity: i64,
        notes: &str,
        user: &str,
    ) -> LedgerResult<StockAdjustment> {
        if quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }
        self.adjust_stock(item_id, quantity, InventoryAction::Restocked, notes, user)
    }

    /// Edit catalog fields. A stock difference against the stored row is
    /// captured as the entry's delta so manual corrections stay on the
    /// ledger too.
    pub fn update_item(
        &self,
        updated: &InventoryItem,
        notes: &str,
        user: &str,
    ) -> LedgerResult<InventoryItem> {
        let current = self
            .db
            .get_item(&updated.id)?
            .ok_or_else(|| LedgerError::ItemNotFound(updated.id.clone()))?;

        let delta = updated.stock - current.stock;
        let mut log = InventoryLog::new(
            updated.id.clone(),
            updated.name.clone(),
            InventoryAction::Updated,
            (delta != 0).then_some(delta),
            notes.to_string(),
            user.to_string(),
        );
        let mut item = updated.clone();
        item.version = self.db.update_item_logged(updated, &mut log)?;
        Ok(item)
    }

    /// Retire an item. The row goes away; its audit entries stay.
    pub fn delete_item(&self, item_id: &str, user: &str) -> LedgerResult<InventoryLog> {
        let item = self
            .db
            .get_item(item_id)?
            .ok_or_else(|| LedgerError::ItemNotFound(item_id.into()))?;

        let mut log = InventoryLog::new(
            item.id.clone(),
            item.name.clone(),
            InventoryAction::Deleted,
            None,
            format!("Removed from catalog ({} in stock)", item.stock),
            user.to_string(),
        );
        self.db.delete_item_logged(&item, &mut log)?;

        tracing::info!("Deleted inventory item {} ({})", item.name, item.id);
        Ok(log)
    }

    /// Re-check the whole chain against the stored entries.
    pub fn verify(&self) -> LedgerResult<ChainStatus> {
        let logs = self.db.logs_in_chain_order()?;
        Ok(chain::verify_chain(&logs)?)
    }

    /// Items at or below their reorder threshold.
    pub fn low_stock_items(&self) -> LedgerResult<Vec<InventoryItem>> {
        Ok(self.db.low_stock_items()?)
    }

    /// Items expiring within the next `days` days.
    pub fn expiring_items(&self, days: i64) -> LedgerResult<Vec<InventoryItem>> {
        let cutoff = (chrono::Utc::now() + chrono::Duration::days(days))
            .format("%Y-%m-%d")
            .to_string();
        Ok(self.db.expiring_items(&cutoff)?)
    }

    /// Search the catalog. FTS5 supplies candidates; fuzzy name
    /// similarity re-ranks them so near-miss spellings still surface.
    pub fn search_items(&self, query: &str, limit: usize) -> LedgerResult<Vec<InventoryItem>> {
        let pool = limit.max(FTS_CANDIDATE_LIMIT);
        let mut candidates = self.db.search_items(query, pool)?;

        let needle = query.to_lowercase();
        candidates.sort_by(|a, b| {
            let score_a = fuzzy_match(&needle, &a.name.to_lowercase());
            let score_b = fuzzy_match(&needle, &b.name.to_lowercase());
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(limit);
        Ok(candidates)
    }
}

/// Compute fuzzy string similarity using combined metrics.
fn fuzzy_match(a: &str, b: &str) -> f64 {
    let jw = jaro_winkler(a, b);
    let lev = normalized_levenshtein(a, b);

    // Jaro-Winkler carries more weight for prefix-heavy drug names
    jw * 0.6 + lev * 0.4
}
