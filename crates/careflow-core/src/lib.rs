//! Careflow Core Library
//!
//! Local-first clinic operations engine: patient visit workflow, billing,
//! and a hash-chained inventory audit ledger.
//!
//! # Architecture
//!
//! ```text
//! Check-In → Vitals → Consultation ──┬─→ Lab ──all results──┐
//! (vitals skippable                  │                      ▼
//!  at creation only)                 └──── no lab orders ─→ Billing
//!                                                              │ payment
//!                                                              ▼
//!                                    ┌──────────────────── Pharmacy
//!                                    │  dispense gate:         │
//!                                    │  paid + capability      │ deduct stock,
//!                                    │                         │ one audit entry
//!                                    │                         │ per line
//!                                    ▼                         ▼
//!                               Completed ◄── history fold ── Clearance
//! ```
//!
//! # Core Principles
//!
//! **Visits only move forward, one stage at a time.** The workflow module
//! is the single authority on stage legality.
//!
//! **Every stock mutation carries exactly one audit entry**, written in
//! the same transaction and sealed onto a hash chain.
//!
//! # Modules
//!
//! - [`db`]: SQLite database layer with FTS5 search
//! - [`models`]: Domain types (Patient, Visit, InventoryItem, etc.)
//! - [`workflow`]: Visit state machine and stage operations
//! - [`billing`]: Bill recomputation and statements
//! - [`ledger`]: Inventory mutations with chained audit entries
//! - [`dispense`]: Payment-gated medication dispensing

pub mod billing;
pub mod db;
pub mod dispense;
pub mod ledger;
pub mod models;
pub mod workflow;

// Re-export commonly used types
pub use billing::{BillLine, BillStatement, ChargeKind};
pub use db::Database;
pub use dispense::{
    Authorizer, BufferedNotifier, DispenseOutcome, Dispenser, Notifier, Severity,
    StaticAuthorizer, PHARMACY_DISPENSE,
};
pub use ledger::{ChainStatus, InventoryLedger, StockAdjustment};
pub use models::{
    InventoryAction, InventoryItem, InventoryLog, ItemCategory, LabOrder, LabOrderStatus,
    PaymentStatus, Patient, PrescriptionLine, Visit, VisitPriority, VisitStage, Vitals,
};
pub use workflow::VisitWorkflow;

use std::sync::{Arc, Mutex};

// =========================================================================
// Facade Error Type
// =========================================================================

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Stale write rejected: {0}")]
    Conflict(String),

    #[error("Not allowed: {0}")]
    NotAllowed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<db::DbError> for CoreError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(what) => CoreError::NotFound(what),
            db::DbError::Conflict(what) => CoreError::Conflict(what),
            other => CoreError::DatabaseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::SerializationError(e.to_string())
    }
}

impl From<workflow::WorkflowError> for CoreError {
    fn from(e: workflow::WorkflowError) -> Self {
        match e {
            workflow::WorkflowError::Database(db) => db.into(),
            workflow::WorkflowError::VisitNotFound(id) => {
                CoreError::NotFound(format!("Visit {}", id))
            }
            workflow::WorkflowError::PatientNotFound(id) => {
                CoreError::NotFound(format!("Patient {}", id))
            }
            workflow::WorkflowError::LabOrderNotFound(id) => {
                CoreError::NotFound(format!("Lab order {}", id))
            }
            other => CoreError::NotAllowed(other.to_string()),
        }
    }
}

impl From<ledger::LedgerError> for CoreError {
    fn from(e: ledger::LedgerError) -> Self {
        match e {
            ledger::LedgerError::Database(db) => db.into(),
            ledger::LedgerError::Json(json) => CoreError::SerializationError(json.to_string()),
            ledger::LedgerError::ItemNotFound(id) => {
                CoreError::NotFound(format!("Inventory item {}", id))
            }
            ledger::LedgerError::InvalidQuantity(q) => {
                CoreError::InvalidInput(format!("Quantity {}", q))
            }
        }
    }
}

impl From<dispense::DispenseError> for CoreError {
    fn from(e: dispense::DispenseError) -> Self {
        match e {
            dispense::DispenseError::Database(db) => db.into(),
            dispense::DispenseError::Ledger(ledger) => ledger.into(),
            dispense::DispenseError::VisitNotFound(id) => {
                CoreError::NotFound(format!("Visit {}", id))
            }
            other => CoreError::NotAllowed(other.to_string()),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for CoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        CoreError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions
// =========================================================================

/// Open or create a clinic database at the given path.
pub fn open_clinic(path: &str) -> Result<Clinic, CoreError> {
    let db = Database::open(path)?;
    Ok(Clinic {
        db: Arc::new(Mutex::new(db)),
    })
}

/// Create an in-memory clinic (for testing).
pub fn open_clinic_in_memory() -> Result<Clinic, CoreError> {
    let db = Database::open_in_memory()?;
    Ok(Clinic {
        db: Arc::new(Mutex::new(db)),
    })
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe clinic handle. Every operation takes the database lock,
/// so writes are serialized within the process; the version columns
/// catch writers outside it.
#[derive(Clone)]
pub struct Clinic {
    db: Arc<Mutex<Database>>,
}

impl Clinic {
    // =========================================================================
    // Patient Operations
    // =========================================================================

    /// Register a new patient.
    pub fn create_patient(&self, name: String) -> Result<Patient, CoreError> {
        let db = self.db.lock()?;
        let patient = Patient::new(name);
        db.insert_patient(&patient)?;
        Ok(patient)
    }

    /// Save edits to a patient record.
    pub fn update_patient(&self, patient: &Patient) -> Result<(), CoreError> {
        let db = self.db.lock()?;
        if !db.update_patient(patient)? {
            return Err(CoreError::NotFound(format!("Patient {}", patient.id)));
        }
        Ok(())
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, patient_id: &str) -> Result<Option<Patient>, CoreError> {
        let db = self.db.lock()?;
        Ok(db.get_patient(patient_id)?)
    }

    /// Search patients by name or phone.
    pub fn search_patients(&self, query: &str, limit: usize) -> Result<Vec<Patient>, CoreError> {
        let db = self.db.lock()?;
        Ok(db.search_patients(query, limit)?)
    }

    /// List all patients.
    pub fn list_patients(&self) -> Result<Vec<Patient>, CoreError> {
        let db = self.db.lock()?;
        Ok(db.list_patients()?)
    }

    // =========================================================================
    // Visit Operations
    // =========================================================================

    /// Check a patient in and claim the next queue number for the day.
    pub fn check_in(
        &self,
        patient_id: &str,
        priority: VisitPriority,
        complaint: Option<String>,
        skip_vitals: bool,
    ) -> Result<Visit, CoreError> {
        let db = self.db.lock()?;
        let workflow = VisitWorkflow::new(&db);
        Ok(workflow.check_in(patient_id, priority, complaint, skip_vitals)?)
    }

    /// Record vitals and move the visit to Consultation.
    pub fn record_vitals(&self, visit_id: &str, vitals: Vitals) -> Result<Visit, CoreError> {
        let db = self.db.lock()?;
        let workflow = VisitWorkflow::new(&db);
        Ok(workflow.record_vitals(visit_id, vitals)?)
    }

    /// Record the consultation outcome and route the visit onward.
    pub fn complete_consultation(
        &self,
        visit_id: &str,
        diagnosis: Option<String>,
        consultation_fee: f64,
        lab_orders: Vec<LabOrder>,
        prescription: Vec<PrescriptionLine>,
    ) -> Result<Visit, CoreError> {
        let db = self.db.lock()?;
        let workflow = VisitWorkflow::new(&db);
        Ok(workflow.complete_consultation(
            visit_id,
            diagnosis,
            consultation_fee,
            lab_orders,
            prescription,
        )?)
    }

    /// Enter a lab result; the visit moves on once every order has one.
    pub fn complete_lab_order(
        &self,
        visit_id: &str,
        order_id: &str,
        result: String,
    ) -> Result<Visit, CoreError> {
        let db = self.db.lock()?;
        let workflow = VisitWorkflow::new(&db);
        Ok(workflow.complete_lab_order(visit_id, order_id, result)?)
    }

    /// Settle the bill and send the visit to the pharmacy.
    pub fn record_payment(&self, visit_id: &str) -> Result<Visit, CoreError> {
        let db = self.db.lock()?;
        let workflow = VisitWorkflow::new(&db);
        Ok(workflow.record_payment(visit_id)?)
    }

    /// Dispense a visit's prescription and move it to Clearance.
    pub fn dispense_medications(
        &self,
        visit_id: &str,
        user: &str,
        authorizer: &dyn Authorizer,
        notifier: &dyn Notifier,
    ) -> Result<DispenseOutcome, CoreError> {
        let db = self.db.lock()?;
        let dispenser = Dispenser::new(&db);
        Ok(dispenser.dispense(visit_id, user, authorizer, notifier)?)
    }

    /// Move a visit to its single legal next stage.
    pub fn advance_visit(&self, visit_id: &str) -> Result<Visit, CoreError> {
        let db = self.db.lock()?;
        let workflow = VisitWorkflow::new(&db);
        Ok(workflow.advance_stage(visit_id)?)
    }

    /// Discharge a visit from Clearance and fold it into patient history.
    pub fn complete_visit(&self, visit_id: &str) -> Result<Visit, CoreError> {
        let db = self.db.lock()?;
        let workflow = VisitWorkflow::new(&db);
        Ok(workflow.complete_visit(visit_id)?)
    }

    /// Get a visit by ID.
    pub fn get_visit(&self, visit_id: &str) -> Result<Option<Visit>, CoreError> {
        let db = self.db.lock()?;
        Ok(db.get_visit(visit_id)?)
    }

    /// Visits still in flight, emergencies first, then by queue number.
    pub fn active_visits(&self) -> Result<Vec<Visit>, CoreError> {
        let db = self.db.lock()?;
        Ok(db.active_visits()?)
    }

    /// Visits waiting at one stage, in queue order.
    pub fn visits_at_stage(&self, stage: VisitStage) -> Result<Vec<Visit>, CoreError> {
        let db = self.db.lock()?;
        Ok(db.visits_at_stage(&stage)?)
    }

    /// A patient's visits, newest first.
    pub fn visits_for_patient(&self, patient_id: &str) -> Result<Vec<Visit>, CoreError> {
        let db = self.db.lock()?;
        Ok(db.visits_for_patient(patient_id)?)
    }

    // =========================================================================
    // Billing Operations
    // =========================================================================

    /// Itemized statement for a visit, recomputed from its line items.
    pub fn bill_statement(&self, visit_id: &str) -> Result<BillStatement, CoreError> {
        let db = self.db.lock()?;
        let visit = db
            .get_visit(visit_id)?
            .ok_or_else(|| CoreError::NotFound(format!("Visit {}", visit_id)))?;
        Ok(BillStatement::from_visit(&visit))
    }

    /// Statement as JSON, for receipts and export.
    pub fn bill_statement_json(&self, visit_id: &str) -> Result<String, CoreError> {
        Ok(self.bill_statement(visit_id)?.to_json()?)
    }

    // =========================================================================
    // Inventory Operations
    // =========================================================================

    /// Add an item to the catalog.
    pub fn add_inventory_item(&self, item: &InventoryItem, user: &str) -> Result<(), CoreError> {
        let db = self.db.lock()?;
        let ledger = InventoryLedger::new(&db);
        ledger.create_item(item, user)?;
        Ok(())
    }

    /// Save edits to an item.
    pub fn update_inventory_item(
        &self,
        item: &InventoryItem,
        notes: &str,
        user: &str,
    ) -> Result<InventoryItem, CoreError> {
        let db = self.db.lock()?;
        let ledger = InventoryLedger::new(&db);
        Ok(ledger.update_item(item, notes, user)?)
    }

    /// Apply a signed stock delta; deductions clamp at zero.
    pub fn adjust_stock(
        &self,
        item_id: &str,
        delta: i64,
        action: InventoryAction,
        notes: &str,
        user: &str,
    ) -> Result<StockAdjustment, CoreError> {
        let db = self.db.lock()?;
        let ledger = InventoryLedger::new(&db);
        Ok(ledger.adjust_stock(item_id, delta, action, notes, user)?)
    }

    /// Replenish stock.
    pub fn restock_item(
        &self,
        item_id: &str,
        quantity: i64,
        notes: &str,
        user: &str,
    ) -> Result<StockAdjustment, CoreError> {
        let db = self.db.lock()?;
        let ledger = InventoryLedger::new(&db);
        Ok(ledger.restock(item_id, quantity, notes, user)?)
    }

    /// Retire an item; its audit entries stay.
    pub fn delete_inventory_item(&self, item_id: &str, user: &str) -> Result<(), CoreError> {
        let db = self.db.lock()?;
        let ledger = InventoryLedger::new(&db);
        ledger.delete_item(item_id, user)?;
        Ok(())
    }

    /// Get an item by ID.
    pub fn get_inventory_item(&self, item_id: &str) -> Result<Option<InventoryItem>, CoreError> {
        let db = self.db.lock()?;
        Ok(db.get_item(item_id)?)
    }

    /// List the whole catalog.
    pub fn list_inventory_items(&self) -> Result<Vec<InventoryItem>, CoreError> {
        let db = self.db.lock()?;
        Ok(db.list_items()?)
    }

    /// Search the catalog by name.
    pub fn search_inventory(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<InventoryItem>, CoreError> {
        let db = self.db.lock()?;
        let ledger = InventoryLedger::new(&db);
        Ok(ledger.search_items(query, limit)?)
    }

    /// Items at or below their reorder threshold.
    pub fn low_stock_items(&self) -> Result<Vec<InventoryItem>, CoreError> {
        let db = self.db.lock()?;
        let ledger = InventoryLedger::new(&db);
        Ok(ledger.low_stock_items()?)
    }

    /// Items expiring within the next `days` days.
    pub fn expiring_items(&self, days: i64) -> Result<Vec<InventoryItem>, CoreError> {
        let db = self.db.lock()?;
        let ledger = InventoryLedger::new(&db);
        Ok(ledger.expiring_items(days)?)
    }

    // =========================================================================
    // Audit Operations
    // =========================================================================

    /// Audit entries for one item, newest first.
    pub fn item_history(&self, item_id: &str) -> Result<Vec<InventoryLog>, CoreError> {
        let db = self.db.lock()?;
        Ok(db.logs_for_item(item_id)?)
    }

    /// Most recent audit entries across all items.
    pub fn recent_activity(&self, limit: usize) -> Result<Vec<InventoryLog>, CoreError> {
        let db = self.db.lock()?;
        Ok(db.recent_logs(limit)?)
    }

    /// Re-check the audit chain end to end.
    pub fn verify_audit_chain(&self) -> Result<ChainStatus, CoreError> {
        let db = self.db.lock()?;
        let ledger = InventoryLedger::new(&db);
        Ok(ledger.verify()?)
    }
}
