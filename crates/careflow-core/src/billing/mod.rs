//! Bill aggregation for visits.
//!
//! The total is always recomputed in full from the visit's charge
//! sources; there is no incremental bookkeeping to drift out of sync.

use serde::{Deserialize, Serialize};

use crate::models::{PaymentStatus, Visit};

/// Recompute a visit's total bill: consultation fee, plus every
/// completed lab order, plus prescription lines at price times quantity.
/// Pending lab orders are not billable.
pub fn compute_total(visit: &Visit) -> f64 {
    visit.consultation_fee + visit.lab_total() + visit.prescription_total()
}

/// Kind of charge on a statement line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChargeKind {
    /// Clinician's consultation fee
    Consultation,
    /// Completed lab test
    LabOrder,
    /// Prescribed medication
    Prescription,
}

/// Single line on a bill statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillLine {
    /// Charge description
    pub description: String,
    /// What kind of charge this is
    pub kind: ChargeKind,
    /// Quantity, 1 for fees and lab tests
    pub quantity: i64,
    /// Price per unit
    pub unit_price: f64,
    /// Line amount
    pub amount: f64,
}

/// Itemized statement for the cashier screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillStatement {
    /// Visit the statement belongs to
    pub visit_id: String,
    /// Patient ID
    pub patient_id: String,
    /// Patient name
    pub patient_name: String,
    /// Statement lines
    pub lines: Vec<BillLine>,
    /// Grand total, equals the visit's recomputed total bill
    pub total: f64,
    /// Payment state at generation time
    pub payment_status: PaymentStatus,
    /// Generation timestamp
    pub generated_at: String,
}

impl BillStatement {
    /// Build a statement from a visit.
    pub fn from_visit(visit: &Visit) -> Self {
        let mut lines = Vec::new();

        lines.push(BillLine {
            description: "Consultation".into(),
            kind: ChargeKind::Consultation,
            quantity: 1,
            unit_price: visit.consultation_fee,
            amount: visit.consultation_fee,
        });

        for order in visit.lab_orders.iter().filter(|o| o.is_completed()) {
            lines.push(BillLine {
                description: order.test_name.clone(),
                kind: ChargeKind::LabOrder,
                quantity: 1,
                unit_price: order.price,
                amount: order.price,
            });
        }

        for line in &visit.prescription {
            lines.push(BillLine {
                description: line.name.clone(),
                kind: ChargeKind::Prescription,
                quantity: line.quantity,
                unit_price: line.price,
                amount: line.line_total(),
            });
        }

        Self {
            visit_id: visit.id.clone(),
            patient_id: visit.patient_id.clone(),
            patient_name: visit.patient_name.clone(),
            lines,
            total: compute_total(visit),
            payment_status: visit.payment_status,
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
