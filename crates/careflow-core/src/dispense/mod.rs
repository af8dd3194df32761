//! Medication dispensing.
//!
//! Pipeline: authorize → verify payment → deduct each prescription line
//! through the ledger → flag the visit → advance Pharmacy to Clearance.
//!
//! The gate runs before anything is written; a denial leaves no trace.
//! Past the gate, lines are deducted one at a time and a line that
//! cannot be deducted is reported and skipped, never blocking the rest.

mod auth;
mod notify;

pub use auth::{Authorizer, StaticAuthorizer, PHARMACY_DISPENSE};
pub use notify::{BufferedNotifier, Notifier, Severity};

use thiserror::Error;

use crate::billing;
use crate::db::{Database, DbError};
use crate::ledger::{InventoryLedger, LedgerError};
use crate::models::{InventoryAction, PaymentStatus, Visit, VisitStage};
use crate::workflow::{validate_transition, TransitionError};

/// Dispensing errors.
#[derive(Error, Debug)]
pub enum DispenseError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Illegal stage transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("Visit not found: {0}")]
    VisitNotFound(String),

    #[error("User {user} lacks the {capability} capability")]
    NotAuthorized { user: String, capability: String },

    #[error("Visit {visit_id} is at {actual}, dispensing requires Pharmacy")]
    WrongStage { visit_id: String, actual: VisitStage },

    #[error("Visit {0} is unpaid; collect payment before dispensing")]
    PaymentPending(String),
}

pub type DispenseResult<T> = Result<T, DispenseError>;

/// A prescription line whose deduction landed.
#[derive(Debug, Clone)]
pub struct DispensedLine {
    /// Inventory item deducted
    pub inventory_id: String,
    /// Item name at dispense time
    pub name: String,
    /// Units the prescription asked for
    pub requested: i64,
    /// Units actually handed out (less than requested when stock ran short)
    pub deducted: i64,
    /// Stock remaining after the deduction
    pub stock_after: i64,
}

/// A prescription line that could not be deducted at all.
#[derive(Debug, Clone)]
pub struct FailedLine {
    /// Inventory item the line referred to
    pub inventory_id: String,
    /// Item name from the prescription
    pub name: String,
    /// Units the prescription asked for
    pub requested: i64,
    /// Why the deduction failed
    pub reason: String,
}

/// Result of dispensing one visit's prescription.
#[derive(Debug, Clone)]
pub struct DispenseOutcome {
    /// Visit state after the run, at Clearance
    pub visit: Visit,
    /// Lines whose deduction landed
    pub dispensed: Vec<DispensedLine>,
    /// Lines skipped because the deduction failed
    pub failed: Vec<FailedLine>,
}

impl DispenseOutcome {
    /// Whether any line was shorted or skipped.
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty() || self.dispensed.iter().any(|l| l.deducted < l.requested)
    }
}

/// Dispensing manager.
pub struct Dispenser<'a> {
    db: &'a Database,
    ledger: InventoryLedger<'a>,
}

impl<'a> Dispenser<'a> {
    /// Create a new dispensing manager.
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            ledger: InventoryLedger::new(db),
        }
    }

    /// Dispense a visit's prescription and move it to Clearance.
    ///
    /// A visit with nothing prescribed still passes through: the flag is
    /// set and the visit advances with no stock touched.
    pub fn dispense(
        &self,
        visit_id: &str,
        user: &str,
        authorizer: &dyn Authorizer,
        notifier: &dyn Notifier,
    ) -> DispenseResult<DispenseOutcome> {
        let mut visit = self
            .db
            .get_visit(visit_id)?
            .ok_or_else(|| DispenseError::VisitNotFound(visit_id.into()))?;

        if !authorizer.allows(PHARMACY_DISPENSE) {
            notifier.notify(
                Severity::Error,
                "You do not have permission to dispense medications",
            );
            return Err(DispenseError::NotAuthorized {
                user: user.into(),
                capability: PHARMACY_DISPENSE.into(),
            });
        }
        if visit.stage != VisitStage::Pharmacy {
            return Err(DispenseError::WrongStage {
                visit_id: visit.id.clone(),
                actual: visit.stage,
            });
        }
        if visit.payment_status != PaymentStatus::Paid {
            notifier.notify(
                Severity::Warning,
                "Payment pending; collect payment before dispensing",
            );
            return Err(DispenseError::PaymentPending(visit.id));
        }

        let mut dispensed = Vec::new();
        let mut failed = Vec::new();
        for line in &visit.prescription {
            let notes = format!("Dispensed to {} (Visit {})", visit.patient_name, visit.id);
            match self.ledger.adjust_stock(
                &line.inventory_id,
                -line.quantity,
                InventoryAction::Dispensed,
                &notes,
                user,
            ) {
                Ok(adjustment) => {
                    let deducted = -adjustment.applied;
                    if adjustment.was_clamped() {
                        let short = format!(
                            "{}: only {} of {} in stock",
                            line.name, deducted, line.quantity
                        );
                        notifier.notify(Severity::Warning, &short);
                    }
                    dispensed.push(DispensedLine {
                        inventory_id: line.inventory_id.clone(),
                        name: line.name.clone(),
                        requested: line.quantity,
                        deducted,
                        stock_after: adjustment.item.stock,
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        "Could not deduct {} for visit {}: {}",
                        line.name,
                        visit.id,
                        err
                    );
                    notifier.notify(Severity::Error, &format!("{}: {}", line.name, err));
                    failed.push(FailedLine {
                        inventory_id: line.inventory_id.clone(),
                        name: line.name.clone(),
                        requested: line.quantity,
                        reason: err.to_string(),
                    });
                }
            }
        }

        visit.medications_dispensed = true;
        visit.total_bill = billing::compute_total(&visit);
        validate_transition(&visit, &VisitStage::Clearance)?;
        visit.enter_stage(VisitStage::Clearance);
        visit.version = self.db.update_visit(&visit)?;

        tracing::info!(
            "Dispensed {} line(s) for visit {} ({} failed)",
            dispensed.len(),
            visit.id,
            failed.len()
        );

        let outcome = DispenseOutcome {
            visit,
            dispensed,
            failed,
        };
        if outcome.is_partial() {
            notifier.notify(
                Severity::Warning,
                "Dispensed with shortages; review the stock report",
            );
        } else if !outcome.dispensed.is_empty() {
            notifier.notify(Severity::Success, "All medications dispensed");
        }
        Ok(outcome)
    }
}
