//! Visit workflow service.
//!
//! Stations: Check-In → Vitals → Consultation → Lab → Billing → Pharmacy → Clearance → Completed
//!
//! Staff operations that move a visit go through this service, except
//! the Pharmacy exit, which belongs to the dispensing transaction. All
//! transitions are validated by `machine` and persisted with a version
//! check, so two stations racing on one visit cannot lose a write.

mod machine;

pub use machine::*;

use thiserror::Error;

use crate::billing;
use crate::db::{Database, DbError};
use crate::models::{
    LabOrder, PaymentStatus, Patient, PrescriptionLine, Visit, VisitPriority, VisitStage, Vitals,
};

/// Workflow errors.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Illegal stage transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("Visit not found: {0}")]
    VisitNotFound(String),

    #[error("Patient not found: {0}")]
    PatientNotFound(String),

    #[error("Visit {visit_id} is at {actual}, operation requires {expected}")]
    WrongStage {
        visit_id: String,
        expected: VisitStage,
        actual: VisitStage,
    },

    #[error("Visit {0} must be dispensed to leave Pharmacy")]
    DispenseRequired(String),

    #[error("Lab order not found: {0}")]
    LabOrderNotFound(String),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Coordinates the visit lifecycle against the database.
pub struct VisitWorkflow<'a> {
    db: &'a Database,
}

impl<'a> VisitWorkflow<'a> {
    /// Create a new workflow service.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Register a patient arrival. Claims the next queue number for the
    /// day; with `skip_vitals` the visit starts directly at Consultation
    /// and the choice is final.
    pub fn check_in(
        &self,
        patient_id: &str,
        priority: VisitPriority,
        complaint: Option<String>,
        skip_vitals: bool,
    ) -> WorkflowResult<Visit> {
        let patient = self
            .db
            .get_patient(patient_id)?
            .ok_or_else(|| WorkflowError::PatientNotFound(patient_id.into()))?;

        let day = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let queue_number = self.db.next_queue_number(&day)?;

        let mut visit = Visit::new(
            patient.id.clone(),
            patient.name.clone(),
            queue_number,
            priority,
            skip_vitals,
        );
        visit.complaint = complaint;
        self.db.insert_visit(&visit)?;

        tracing::info!(
            "Checked in {} as queue #{} (visit {})",
            visit.patient_name,
            queue_number,
            visit.id
        );
        Ok(visit)
    }

    /// Record vitals and hand the visit to the clinician. Accepts visits
    /// still at Check-In; both hops are validated.
    pub fn record_vitals(&self, visit_id: &str, vitals: Vitals) -> WorkflowResult<Visit> {
        let mut visit = self.load_visit(visit_id)?;
        if visit.stage == VisitStage::CheckIn {
            self.advance_to(&mut visit, VisitStage::Vitals)?;
        }
        if visit.stage != VisitStage::Vitals {
            return Err(WorkflowError::WrongStage {
                visit_id: visit.id.clone(),
                expected: VisitStage::Vitals,
                actual: visit.stage,
            });
        }

        visit.vitals = Some(vitals);
        self.advance_to(&mut visit, VisitStage::Consultation)?;
        self.persist(&mut visit)?;
        Ok(visit)
    }

    /// Record the consultation outcome and route the visit onward: to the
    /// lab when tests were ordered, otherwise straight to the cashier.
    pub fn complete_consultation(
        &self,
        visit_id: &str,
        diagnosis: Option<String>,
        consultation_fee: f64,
        lab_orders: Vec<LabOrder>,
        prescription: Vec<PrescriptionLine>,
    ) -> WorkflowResult<Visit> {
        let mut visit = self.load_visit(visit_id)?;
        if visit.stage != VisitStage::Consultation {
            return Err(WorkflowError::WrongStage {
                visit_id: visit.id.clone(),
                expected: VisitStage::Consultation,
                actual: visit.stage,
            });
        }

        visit.diagnosis = diagnosis;
        visit.consultation_fee = consultation_fee;
        visit.lab_orders = lab_orders;
        visit.prescription = prescription;
        visit.total_bill = billing::compute_total(&visit);

        if let Some(next) = machine::next_stage(&visit) {
            self.advance_to(&mut visit, next)?;
        }
        self.persist(&mut visit)?;

        tracing::info!(
            "Consultation done for visit {}: {} lab order(s), {} prescription line(s)",
            visit.id,
            visit.lab_orders.len(),
            visit.prescription.len()
        );
        Ok(visit)
    }

    /// Enter a lab result. The visit moves to the cashier once every
    /// ordered test has results.
    pub fn complete_lab_order(
        &self,
        visit_id: &str,
        order_id: &str,
        result: String,
    ) -> WorkflowResult<Visit> {
        let mut visit = self.load_visit(visit_id)?;
        if visit.stage != VisitStage::Lab {
            return Err(WorkflowError::WrongStage {
                visit_id: visit.id.clone(),
                expected: VisitStage::Lab,
                actual: visit.stage,
            });
        }

        let order = visit
            .lab_orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| WorkflowError::LabOrderNotFound(order_id.into()))?;
        order.complete(result);

        visit.total_bill = billing::compute_total(&visit);
        if visit.pending_lab_count() == 0 {
            self.advance_to(&mut visit, VisitStage::Billing)?;
        } else {
            visit.touch();
        }
        self.persist(&mut visit)?;
        Ok(visit)
    }

    /// Settle the bill at the cashier and send the visit to the pharmacy.
    /// The total is recomputed before capture so the receipt never shows
    /// a stale figure.
    pub fn record_payment(&self, visit_id: &str) -> WorkflowResult<Visit> {
        let mut visit = self.load_visit(visit_id)?;
        if visit.stage != VisitStage::Billing {
            return Err(WorkflowError::WrongStage {
                visit_id: visit.id.clone(),
                expected: VisitStage::Billing,
                actual: visit.stage,
            });
        }

        visit.total_bill = billing::compute_total(&visit);
        visit.payment_status = PaymentStatus::Paid;
        self.advance_to(&mut visit, VisitStage::Pharmacy)?;
        self.persist(&mut visit)?;

        tracing::info!(
            "Payment of {:.2} recorded for visit {}",
            visit.total_bill,
            visit.id
        );
        Ok(visit)
    }

    /// Move a visit to its single legal next stage. The Pharmacy exit is
    /// reserved for the dispensing transaction, which marks the visit
    /// dispensed on the way out; reaching Completed goes through the
    /// completion path so the history fold happens.
    pub fn advance_stage(&self, visit_id: &str) -> WorkflowResult<Visit> {
        let visit = self.load_visit(visit_id)?;
        match machine::next_stage(&visit) {
            Some(VisitStage::Clearance) => Err(WorkflowError::DispenseRequired(visit.id)),
            Some(VisitStage::Completed) => self.complete_visit(visit_id),
            Some(next) => {
                let mut visit = visit;
                self.advance_to(&mut visit, next)?;
                self.persist(&mut visit)?;
                Ok(visit)
            }
            None => Err(WorkflowError::Transition(TransitionError::TerminalStage {
                visit_id: visit.id,
            })),
        }
    }

    /// Discharge the visit: freeze it at Completed and fold a summary
    /// into the patient's history, exactly once, in one transaction.
    pub fn complete_visit(&self, visit_id: &str) -> WorkflowResult<Visit> {
        let mut visit = self.load_visit(visit_id)?;
        machine::validate_transition(&visit, &VisitStage::Completed)?;

        let mut patient = self.load_patient(&visit.patient_id)?;
        visit.enter_stage(VisitStage::Completed);
        patient.record_visit(visit.summary());

        visit.version = self.db.update_visit_and_patient(&visit, &patient)?;
        tracing::info!("Visit {} completed for {}", visit.id, visit.patient_name);
        Ok(visit)
    }

    fn load_visit(&self, visit_id: &str) -> WorkflowResult<Visit> {
        self.db
            .get_visit(visit_id)?
            .ok_or_else(|| WorkflowError::VisitNotFound(visit_id.into()))
    }

    fn load_patient(&self, patient_id: &str) -> WorkflowResult<Patient> {
        self.db
            .get_patient(patient_id)?
            .ok_or_else(|| WorkflowError::PatientNotFound(patient_id.into()))
    }

    fn advance_to(&self, visit: &mut Visit, to: VisitStage) -> WorkflowResult<()> {
        machine::validate_transition(visit, &to)?;
        visit.enter_stage(to);
        Ok(())
    }

    fn persist(&self, visit: &mut Visit) -> WorkflowResult<()> {
        visit.version = self.db.update_visit(visit)?;
        Ok(())
    }
}
