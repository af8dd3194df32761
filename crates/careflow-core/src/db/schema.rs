//! SQLite schema definition.

/// Complete database schema for careflow.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Patients
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    phone TEXT,
    gender TEXT,
    date_of_birth TEXT,
    address TEXT,
    allergies TEXT,
    notes TEXT,
    history TEXT NOT NULL DEFAULT '[]',          -- JSON array, most recent first
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(name);
CREATE INDEX IF NOT EXISTS idx_patients_phone ON patients(phone);

-- ============================================================================
-- Visits
-- ============================================================================

CREATE TABLE IF NOT EXISTS visits (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(id),
    patient_name TEXT NOT NULL,
    stage TEXT NOT NULL DEFAULT 'check_in',      -- check_in, vitals, consultation, lab, billing, pharmacy, clearance, completed
    stage_start_time TEXT NOT NULL,
    start_time TEXT NOT NULL,
    queue_number INTEGER NOT NULL,
    priority TEXT NOT NULL DEFAULT 'normal',     -- normal, urgent, emergency
    complaint TEXT,
    diagnosis TEXT,
    vitals TEXT,                                 -- JSON object, NULL until recorded
    lab_orders TEXT NOT NULL DEFAULT '[]',       -- JSON array of LabOrder
    prescription TEXT NOT NULL DEFAULT '[]',     -- JSON array of PrescriptionLine
    medications_dispensed INTEGER NOT NULL DEFAULT 0,
    consultation_fee REAL NOT NULL DEFAULT 0,
    total_bill REAL NOT NULL DEFAULT 0,
    payment_status TEXT NOT NULL DEFAULT 'pending',  -- pending, paid
    version INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_visits_patient ON visits(patient_id);
CREATE INDEX IF NOT EXISTS idx_visits_stage ON visits(stage);
CREATE INDEX IF NOT EXISTS idx_visits_start_time ON visits(start_time);

-- ============================================================================
-- Inventory Items
-- ============================================================================

CREATE TABLE IF NOT EXISTS inventory_items (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    stock INTEGER NOT NULL DEFAULT 0 CHECK (stock >= 0),
    min_stock_level INTEGER NOT NULL DEFAULT 10,
    unit TEXT NOT NULL,
    category TEXT NOT NULL,                      -- medicine, supply, lab, equipment
    price REAL NOT NULL DEFAULT 0,
    batch_number TEXT,
    expiry_date TEXT,
    supplier_id TEXT,
    version INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- FTS5 virtual table for full-text search
CREATE VIRTUAL TABLE IF NOT EXISTS inventory_items_fts USING fts5(
    id,
    name,
    category,
    content='inventory_items',
    content_rowid='rowid'
);

-- Triggers to keep FTS5 in sync with main table
CREATE TRIGGER IF NOT EXISTS inventory_items_ai AFTER INSERT ON inventory_items BEGIN
    INSERT INTO inventory_items_fts(rowid, id, name, category)
    VALUES (new.rowid, new.id, new.name, new.category);
END;

CREATE TRIGGER IF NOT EXISTS inventory_items_ad AFTER DELETE ON inventory_items BEGIN
    INSERT INTO inventory_items_fts(inventory_items_fts, rowid, id, name, category)
    VALUES ('delete', old.rowid, old.id, old.name, old.category);
END;

CREATE TRIGGER IF NOT EXISTS inventory_items_au AFTER UPDATE ON inventory_items BEGIN
    INSERT INTO inventory_items_fts(inventory_items_fts, rowid, id, name, category)
    VALUES ('delete', old.rowid, old.id, old.name, old.category);
    INSERT INTO inventory_items_fts(rowid, id, name, category)
    VALUES (new.rowid, new.id, new.name, new.category);
END;

CREATE INDEX IF NOT EXISTS idx_items_category ON inventory_items(category);
CREATE INDEX IF NOT EXISTS idx_items_expiry ON inventory_items(expiry_date);

-- ============================================================================
-- Inventory Logs (Append-Only - Immutable after creation)
-- ============================================================================

-- No foreign key on item_id: entries outlive deleted items
CREATE TABLE IF NOT EXISTS inventory_logs (
    id TEXT PRIMARY KEY,
    item_id TEXT NOT NULL,
    item_name TEXT NOT NULL,
    action TEXT NOT NULL CHECK (action IN ('created', 'updated', 'restocked', 'dispensed', 'deleted')),
    quantity_change INTEGER,
    notes TEXT NOT NULL DEFAULT '',
    user TEXT NOT NULL,
    timestamp TEXT NOT NULL DEFAULT (datetime('now')),
    prev_hash TEXT NOT NULL,
    entry_hash TEXT NOT NULL UNIQUE
);

CREATE TRIGGER IF NOT EXISTS inventory_logs_no_update BEFORE UPDATE ON inventory_logs
BEGIN
    SELECT RAISE(ABORT, 'Audit log entries are immutable');
END;

CREATE TRIGGER IF NOT EXISTS inventory_logs_no_delete BEFORE DELETE ON inventory_logs
BEGIN
    SELECT RAISE(ABORT, 'Audit log entries cannot be deleted');
END;

CREATE INDEX IF NOT EXISTS idx_logs_item ON inventory_logs(item_id);
CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON inventory_logs(timestamp);

-- ============================================================================
-- Queue Counters
-- ============================================================================

-- One row per day, bumped atomically at check-in
CREATE TABLE IF NOT EXISTS queue_counters (
    day TEXT PRIMARY KEY,
    next INTEGER NOT NULL DEFAULT 0
);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_fts_trigger() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        // Insert into inventory
        conn.execute(
            "INSERT INTO inventory_items (id, name, unit, category) VALUES (?, ?, ?, ?)",
            ["item-1", "Paracetamol 500mg", "tablet", "medicine"],
        )
        .unwrap();

        // Search via FTS
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM inventory_items_fts WHERE inventory_items_fts MATCH 'paracetamol'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_stock_cannot_go_negative() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let result = conn.execute(
            "INSERT INTO inventory_items (id, name, stock, unit, category) VALUES ('item-1', 'Gloves', -5, 'box', 'supply')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_log_append_only() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute(
            "INSERT INTO inventory_logs (id, item_id, item_name, action, quantity_change, user, prev_hash, entry_hash)
             VALUES ('log-1', 'item-1', 'Gloves', 'restocked', 10, 'admin', '', 'hash-1')",
            [],
        )
        .unwrap();

        // Updates must be rejected
        let result = conn.execute(
            "UPDATE inventory_logs SET quantity_change = 99 WHERE id = 'log-1'",
            [],
        );
        assert!(result.is_err());

        // Deletes must be rejected
        let result = conn.execute("DELETE FROM inventory_logs WHERE id = 'log-1'", []);
        assert!(result.is_err());

        // The original row survives untouched
        let change: i64 = conn
            .query_row(
                "SELECT quantity_change FROM inventory_logs WHERE id = 'log-1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(change, 10);
    }

    #[test]
    fn test_bad_log_action_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let result = conn.execute(
            "INSERT INTO inventory_logs (id, item_id, item_name, action, user, prev_hash, entry_hash)
             VALUES ('log-1', 'item-1', 'Gloves', 'borrowed', 'admin', '', 'hash-1')",
            [],
        );
        assert!(result.is_err());
    }
}
