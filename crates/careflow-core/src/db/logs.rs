//! Inventory audit log database operations.
//!
//! Entries are insert-only; schema triggers abort any UPDATE or DELETE.
//! Chain order is rowid order, which is insertion order.

use rusqlite::{params, Connection, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::ledger::seal;
use crate::models::{InventoryAction, InventoryLog};

/// Seal a log onto the stored tip and insert it. Runs entirely on the
/// caller's connection; the inventory operations call it inside the
/// transaction that writes the item row, so the tip cannot move between
/// the read and the insert.
pub(crate) fn append_log(conn: &Connection, log: &mut InventoryLog) -> DbResult<()> {
    let tip = latest_entry_hash(conn)?.unwrap_or_default();
    seal(log, &tip)?;
    insert_log(conn, log)
}

/// Insert an already-sealed log entry.
pub(crate) fn insert_log(conn: &Connection, log: &InventoryLog) -> DbResult<()> {
    conn.execute(
        r#"
        INSERT INTO inventory_logs (
            id, item_id, item_name, action, quantity_change,
            notes, user, timestamp, prev_hash, entry_hash
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        params![
            log.id,
            log.item_id,
            log.item_name,
            action_to_string(&log.action),
            log.quantity_change,
            log.notes,
            log.user,
            log.timestamp,
            log.prev_hash,
            log.entry_hash,
        ],
    )?;
    Ok(())
}

/// Chain tip as seen by the caller's connection, None for an empty log.
pub(crate) fn latest_entry_hash(conn: &Connection) -> DbResult<Option<String>> {
    conn.query_row(
        "SELECT entry_hash FROM inventory_logs ORDER BY rowid DESC LIMIT 1",
        [],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

impl Database {
    /// Hash of the most recent entry, None for an empty log.
    pub fn latest_entry_hash(&self) -> DbResult<Option<String>> {
        latest_entry_hash(&self.conn)
    }

    /// All entries for one item, newest first.
    pub fn logs_for_item(&self, item_id: &str) -> DbResult<Vec<InventoryLog>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, item_id, item_name, action, quantity_change,
                   notes, user, timestamp, prev_hash, entry_hash
            FROM inventory_logs
            WHERE item_id = ?
            ORDER BY rowid DESC
            "#,
        )?;

        let rows = stmt.query_map([item_id], |row| {
            Ok(LogRow {
                id: row.get(0)?,
                item_id: row.get(1)?,
                item_name: row.get(2)?,
                action: row.get(3)?,
                quantity_change: row.get(4)?,
                notes: row.get(5)?,
                user: row.get(6)?,
                timestamp: row.get(7)?,
                prev_hash: row.get(8)?,
                entry_hash: row.get(9)?,
            })
        })?;

        let mut logs = Vec::new();
        for row in rows {
            logs.push(row?.try_into()?);
        }
        Ok(logs)
    }

    /// Most recent entries across all items.
    pub fn recent_logs(&self, limit: usize) -> DbResult<Vec<InventoryLog>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, item_id, item_name, action, quantity_change,
                   notes, user, timestamp, prev_hash, entry_hash
            FROM inventory_logs
            ORDER BY rowid DESC
            LIMIT ?
            "#,
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            Ok(LogRow {
                id: row.get(0)?,
                item_id: row.get(1)?,
                item_name: row.get(2)?,
                action: row.get(3)?,
                quantity_change: row.get(4)?,
                notes: row.get(5)?,
                user: row.get(6)?,
                timestamp: row.get(7)?,
                prev_hash: row.get(8)?,
                entry_hash: row.get(9)?,
            })
        })?;

        let mut logs = Vec::new();
        for row in rows {
            logs.push(row?.try_into()?);
        }
        Ok(logs)
    }

    /// All entries in chain order, oldest first.
    pub fn logs_in_chain_order(&self) -> DbResult<Vec<InventoryLog>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, item_id, item_name, action, quantity_change,
                   notes, user, timestamp, prev_hash, entry_hash
            FROM inventory_logs
            ORDER BY rowid ASC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(LogRow {
                id: row.get(0)?,
                item_id: row.get(1)?,
                item_name: row.get(2)?,
                action: row.get(3)?,
                quantity_change: row.get(4)?,
                notes: row.get(5)?,
                user: row.get(6)?,
                timestamp: row.get(7)?,
                prev_hash: row.get(8)?,
                entry_hash: row.get(9)?,
            })
        })?;

        let mut logs = Vec::new();
        for row in rows {
            logs.push(row?.try_into()?);
        }
        Ok(logs)
    }
}

/// Intermediate row struct for database mapping.
struct LogRow {
    id: String,
    item_id: String,
    item_name: String,
    action: String,
    quantity_change: Option<i64>,
    notes: String,
    user: String,
    timestamp: String,
    prev_hash: String,
    entry_hash: String,
}

impl TryFrom<LogRow> for InventoryLog {
    type Error = DbError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        let action = string_to_action(&row.action)?;

        Ok(InventoryLog {
            id: row.id,
            item_id: row.item_id,
            item_name: row.item_name,
            action,
            quantity_change: row.quantity_change,
            notes: row.notes,
            user: row.user,
            timestamp: row.timestamp,
            prev_hash: row.prev_hash,
            entry_hash: row.entry_hash,
        })
    }
}

fn action_to_string(action: &InventoryAction) -> &'static str {
    match action {
        InventoryAction::Created => "created",
        InventoryAction::Updated => "updated",
        InventoryAction::Restocked => "restocked",
        InventoryAction::Dispensed => "dispensed",
        InventoryAction::Deleted => "deleted",
    }
}

fn string_to_action(s: &str) -> Result<InventoryAction, DbError> {
    match s {
        "created" => Ok(InventoryAction::Created),
        "updated" => Ok(InventoryAction::Updated),
        "restocked" => Ok(InventoryAction::Restocked),
        "dispensed" => Ok(InventoryAction::Dispensed),
        "deleted" => Ok(InventoryAction::Deleted),
        _ => Err(DbError::Constraint(format!("Unknown log action: {}", s))),
    }
}
