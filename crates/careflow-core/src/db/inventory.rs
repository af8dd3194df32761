//! Inventory item database operations.
//!
//! Every stock-affecting mutation goes through one of the `*_logged`
//! methods, which write the item row and its audit entry in a single
//! transaction; the entry is sealed onto the chain tip inside that same
//! transaction. Updates are compare-and-swap on the version column.

use rusqlite::{params, OptionalExtension};

use super::logs::append_log;
use super::{Database, DbError, DbResult};
use crate::models::{InventoryItem, InventoryLog, ItemCategory};

impl Database {
    /// Insert a new item together with its 'created' audit entry.
    pub fn insert_item_logged(&self, item: &InventoryItem, log: &mut InventoryLog) -> DbResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            INSERT INTO inventory_items (
                id, name, stock, min_stock_level, unit, category, price,
                batch_number, expiry_date, supplier_id, version, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                item.id,
                item.name,
                item.stock,
                item.min_stock_level,
                item.unit,
                category_to_string(&item.category),
                item.price,
                item.batch_number,
                item.expiry_date,
                item.supplier_id,
                item.version,
                item.created_at,
                item.updated_at,
            ],
        )?;
        append_log(&tx, log)?;
        tx.commit()?;
        Ok(())
    }

    /// Compare-and-swap update of an item together with its audit entry.
    /// Returns the new version; the caller's struct is stale until it
    /// adopts it. A version mismatch rejects the whole write.
    pub fn update_item_logged(&self, item: &InventoryItem, log: &mut InventoryLog) -> DbResult<i64> {
        let tx = self.conn.unchecked_transaction()?;
        let rows_affected = tx.execute(
            r#"
            UPDATE inventory_items SET
                name = ?3,
                stock = ?4,
                min_stock_level = ?5,
                unit = ?6,
                category = ?7,
                price = ?8,
                batch_number = ?9,
                expiry_date = ?10,
                supplier_id = ?11,
                version = ?2 + 1,
                updated_at = datetime('now')
            WHERE id = ?1 AND version = ?2
            "#,
            params![
                item.id,
                item.version,
                item.name,
                item.stock,
                item.min_stock_level,
                item.unit,
                category_to_string(&item.category),
                item.price,
                item.batch_number,
                item.expiry_date,
                item.supplier_id,
            ],
        )?;
        if rows_affected == 0 {
            return Err(self.stale_item_error(&tx, &item.id));
        }
        append_log(&tx, log)?;
        tx.commit()?;
        Ok(item.version + 1)
    }

    /// Delete an item together with its 'deleted' audit entry. The
    /// version guard applies as for updates.
    pub fn delete_item_logged(&self, item: &InventoryItem, log: &mut InventoryLog) -> DbResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let rows_affected = tx.execute(
            "DELETE FROM inventory_items WHERE id = ?1 AND version = ?2",
            params![item.id, item.version],
        )?;
        if rows_affected == 0 {
            return Err(self.stale_item_error(&tx, &item.id));
        }
        append_log(&tx, log)?;
        tx.commit()?;
        Ok(())
    }

    /// Get an item by ID.
    pub fn get_item(&self, id: &str) -> DbResult<Option<InventoryItem>> {
        self.conn
            .query_row(
                r#"
                SELECT id, name, stock, min_stock_level, unit, category, price,
                       batch_number, expiry_date, supplier_id, version, created_at, updated_at
                FROM inventory_items
                WHERE id = ?
                "#,
                [id],
                |row| {
                    Ok(ItemRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        stock: row.get(2)?,
                        min_stock_level: row.get(3)?,
                        unit: row.get(4)?,
                        category: row.get(5)?,
                        price: row.get(6)?,
                        batch_number: row.get(7)?,
                        expiry_date: row.get(8)?,
                        supplier_id: row.get(9)?,
                        version: row.get(10)?,
                        created_at: row.get(11)?,
                        updated_at: row.get(12)?,
                    })
                },
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List all items.
    pub fn list_items(&self) -> DbResult<Vec<InventoryItem>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name, stock, min_stock_level, unit, category, price,
                   batch_number, expiry_date, supplier_id, version, created_at, updated_at
            FROM inventory_items
            ORDER BY name
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(ItemRow {
                id: row.get(0)?,
                name: row.get(1)?,
                stock: row.get(2)?,
                min_stock_level: row.get(3)?,
                unit: row.get(4)?,
                category: row.get(5)?,
                price: row.get(6)?,
                batch_number: row.get(7)?,
                expiry_date: row.get(8)?,
                supplier_id: row.get(9)?,
                version: row.get(10)?,
                created_at: row.get(11)?,
                updated_at: row.get(12)?,
            })
        })?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?.try_into()?);
        }
        Ok(items)
    }

    /// List items at or below their reorder threshold.
    pub fn low_stock_items(&self) -> DbResult<Vec<InventoryItem>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name, stock, min_stock_level, unit, category, price,
                   batch_number, expiry_date, supplier_id, version, created_at, updated_at
            FROM inventory_items
            WHERE stock <= min_stock_level
            ORDER BY stock ASC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(ItemRow {
                id: row.get(0)?,
                name: row.get(1)?,
                stock: row.get(2)?,
                min_stock_level: row.get(3)?,
                unit: row.get(4)?,
                category: row.get(5)?,
                price: row.get(6)?,
                batch_number: row.get(7)?,
                expiry_date: row.get(8)?,
                supplier_id: row.get(9)?,
                version: row.get(10)?,
                created_at: row.get(11)?,
                updated_at: row.get(12)?,
            })
        })?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?.try_into()?);
        }
        Ok(items)
    }

    /// List items expiring on or before a date (ISO dates compare lexically).
    pub fn expiring_items(&self, on_or_before: &str) -> DbResult<Vec<InventoryItem>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name, stock, min_stock_level, unit, category, price,
                   batch_number, expiry_date, supplier_id, version, created_at, updated_at
            FROM inventory_items
            WHERE expiry_date IS NOT NULL AND expiry_date <= ?
            ORDER BY expiry_date ASC
            "#,
        )?;

        let rows = stmt.query_map([on_or_before], |row| {
            Ok(ItemRow {
                id: row.get(0)?,
                name: row.get(1)?,
                stock: row.get(2)?,
                min_stock_level: row.get(3)?,
                unit: row.get(4)?,
                category: row.get(5)?,
                price: row.get(6)?,
                batch_number: row.get(7)?,
                expiry_date: row.get(8)?,
                supplier_id: row.get(9)?,
                version: row.get(10)?,
                created_at: row.get(11)?,
                updated_at: row.get(12)?,
            })
        })?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?.try_into()?);
        }
        Ok(items)
    }

    /// Search items using FTS5 (BM25 ranking).
    pub fn search_items(&self, query: &str, limit: usize) -> DbResult<Vec<InventoryItem>> {
        // Escape special FTS5 characters and add prefix matching
        let escaped_query = escape_fts_query(query);
        if escaped_query.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            r#"
            SELECT i.id, i.name, i.stock, i.min_stock_level, i.unit, i.category, i.price,
                   i.batch_number, i.expiry_date, i.supplier_id, i.version, i.created_at, i.updated_at,
                   bm25(inventory_items_fts) as rank
            FROM inventory_items i
            JOIN inventory_items_fts fts ON i.rowid = fts.rowid
            WHERE inventory_items_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )?;

        let rows = stmt.query_map(params![escaped_query, limit as i64], |row| {
            Ok(ItemRow {
                id: row.get(0)?,
                name: row.get(1)?,
                stock: row.get(2)?,
                min_stock_level: row.get(3)?,
                unit: row.get(4)?,
                category: row.get(5)?,
                price: row.get(6)?,
                batch_number: row.get(7)?,
                expiry_date: row.get(8)?,
                supplier_id: row.get(9)?,
                version: row.get(10)?,
                created_at: row.get(11)?,
                updated_at: row.get(12)?,
            })
        })?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?.try_into()?);
        }
        Ok(items)
    }

    /// Distinguish a missing row from a stale version on CAS failure.
    fn stale_item_error(&self, conn: &rusqlite::Connection, id: &str) -> DbError {
        let exists = conn
            .query_row(
                "SELECT COUNT(*) FROM inventory_items WHERE id = ?",
                [id],
                |row| row.get::<_, i64>(0),
            )
            .unwrap_or(0)
            > 0;
        if exists {
            DbError::Conflict(format!("Inventory item {} was modified concurrently", id))
        } else {
            DbError::NotFound(format!("Inventory item {}", id))
        }
    }
}

/// Intermediate row struct for database mapping.
struct ItemRow {
    id: String,
    name: String,
    stock: i64,
    min_stock_level: i64,
    unit: String,
    category: String,
    price: f64,
    batch_number: Option<String>,
    expiry_date: Option<String>,
    supplier_id: Option<String>,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ItemRow> for InventoryItem {
    type Error = DbError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let category = string_to_category(&row.category)?;

        Ok(InventoryItem {
            id: row.id,
            name: row.name,
            stock: row.stock,
            min_stock_level: row.min_stock_level,
            unit: row.unit,
            category,
            price: row.price,
            batch_number: row.batch_number,
            expiry_date: row.expiry_date,
            supplier_id: row.supplier_id,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn category_to_string(category: &ItemCategory) -> &'static str {
    match category {
        ItemCategory::Medicine => "medicine",
        ItemCategory::Supply => "supply",
        ItemCategory::Lab => "lab",
        ItemCategory::Equipment => "equipment",
    }
}

fn string_to_category(s: &str) -> Result<ItemCategory, DbError> {
    match s {
        "medicine" => Ok(ItemCategory::Medicine),
        "supply" => Ok(ItemCategory::Supply),
        "lab" => Ok(ItemCategory::Lab),
        "equipment" => Ok(ItemCategory::Equipment),
        _ => Err(DbError::Constraint(format!("Unknown item category: {}", s))),
    }
}

/// Escape special FTS5 characters and prepare query for prefix matching.
fn escape_fts_query(query: &str) -> String {
    // Remove special FTS5 operators and add wildcard for prefix matching
    let cleaned: String = query
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    // Add prefix matching operator
    cleaned
        .split_whitespace()
        .map(|word| format!("{}*", word))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InventoryAction;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn make_item(name: &str, stock: i64) -> InventoryItem {
        let mut item = InventoryItem::new(
            name.into(),
            ItemCategory::Medicine,
            "tablet".into(),
            10.0,
        );
        item.stock = stock;
        item
    }

    fn make_log(item: &InventoryItem, action: InventoryAction, change: Option<i64>) -> InventoryLog {
        InventoryLog::new(
            item.id.clone(),
            item.name.clone(),
            action,
            change,
            "test".into(),
            "tester".into(),
        )
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup_db();
        let item = make_item("Paracetamol 500mg", 50);
        db.insert_item_logged(&item, &mut make_log(&item, InventoryAction::Created, Some(50)))
            .unwrap();

        let retrieved = db.get_item(&item.id).unwrap().unwrap();
        assert_eq!(retrieved.name, "Paracetamol 500mg");
        assert_eq!(retrieved.stock, 50);
        assert_eq!(retrieved.category, ItemCategory::Medicine);
        assert_eq!(retrieved.version, 1);
    }

    #[test]
    fn test_update_bumps_version() {
        let db = setup_db();
        let mut item = make_item("Paracetamol 500mg", 50);
        db.insert_item_logged(&item, &mut make_log(&item, InventoryAction::Created, Some(50)))
            .unwrap();

        item.stock = 45;
        let new_version = db
            .update_item_logged(&item, &mut make_log(&item, InventoryAction::Dispensed, Some(-5)))
            .unwrap();
        assert_eq!(new_version, 2);

        let retrieved = db.get_item(&item.id).unwrap().unwrap();
        assert_eq!(retrieved.stock, 45);
        assert_eq!(retrieved.version, 2);
    }

    #[test]
    fn test_stale_update_conflicts() {
        let db = setup_db();
        let mut item = make_item("Paracetamol 500mg", 50);
        db.insert_item_logged(&item, &mut make_log(&item, InventoryAction::Created, Some(50)))
            .unwrap();

        // First writer wins
        item.stock = 45;
        db.update_item_logged(&item, &mut make_log(&item, InventoryAction::Dispensed, Some(-5)))
            .unwrap();

        // Second writer still holds version 1
        item.stock = 40;
        let result = db.update_item_logged(
            &item,
            &mut make_log(&item, InventoryAction::Dispensed, Some(-10)),
        );
        assert!(matches!(result, Err(DbError::Conflict(_))));

        // The stale write left no trace
        let retrieved = db.get_item(&item.id).unwrap().unwrap();
        assert_eq!(retrieved.stock, 45);
        let logs = db.logs_for_item(&item.id).unwrap();
        assert_eq!(logs.len(), 2);
    }

    #[test]
    fn test_update_missing_item_not_found() {
        let db = setup_db();
        let item = make_item("Ghost", 1);
        let result =
            db.update_item_logged(&item, &mut make_log(&item, InventoryAction::Updated, None));
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_delete_keeps_logs() {
        let db = setup_db();
        let item = make_item("Paracetamol 500mg", 50);
        db.insert_item_logged(&item, &mut make_log(&item, InventoryAction::Created, Some(50)))
            .unwrap();
        db.delete_item_logged(&item, &mut make_log(&item, InventoryAction::Deleted, None))
            .unwrap();

        assert!(db.get_item(&item.id).unwrap().is_none());
        let logs = db.logs_for_item(&item.id).unwrap();
        assert_eq!(logs.len(), 2);
    }

    #[test]
    fn test_low_stock_items() {
        let db = setup_db();
        let mut low = make_item("Amoxicillin 250mg", 5);
        low.min_stock_level = 10;
        let mut ok = make_item("Paracetamol 500mg", 50);
        ok.min_stock_level = 10;

        db.insert_item_logged(&low, &mut make_log(&low, InventoryAction::Created, Some(5)))
            .unwrap();
        db.insert_item_logged(&ok, &mut make_log(&ok, InventoryAction::Created, Some(50)))
            .unwrap();

        let results = db.low_stock_items().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Amoxicillin 250mg");
    }

    #[test]
    fn test_expiring_items() {
        let db = setup_db();
        let mut soon = make_item("Insulin", 3);
        soon.expiry_date = Some("2024-03-01".into());
        let mut later = make_item("Paracetamol 500mg", 50);
        later.expiry_date = Some("2026-01-01".into());

        db.insert_item_logged(&soon, &mut make_log(&soon, InventoryAction::Created, Some(3)))
            .unwrap();
        db.insert_item_logged(&later, &mut make_log(&later, InventoryAction::Created, Some(50)))
            .unwrap();

        let results = db.expiring_items("2024-06-30").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Insulin");
    }

    #[test]
    fn test_search_items() {
        let db = setup_db();
        let item1 = make_item("Paracetamol 500mg", 50);
        let item2 = make_item("Amoxicillin 250mg", 30);

        db.insert_item_logged(&item1, &mut make_log(&item1, InventoryAction::Created, Some(50)))
            .unwrap();
        db.insert_item_logged(&item2, &mut make_log(&item2, InventoryAction::Created, Some(30)))
            .unwrap();

        let results = db.search_items("paracet", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Paracetamol 500mg");

        let results = db.search_items("", 10).unwrap();
        assert!(results.is_empty());
    }
}
