//! Visit models for the clinical encounter lifecycle.

use serde::{Deserialize, Serialize};

/// Clinical stage of a visit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VisitStage {
    /// Registered at the front desk
    CheckIn,
    /// Nurse station, vitals capture
    Vitals,
    /// With the clinician
    Consultation,
    /// Laboratory tests in progress
    Lab,
    /// At the cashier
    Billing,
    /// Medication dispensing
    Pharmacy,
    /// Final review before discharge
    Clearance,
    /// Discharged, visit frozen
    Completed,
}

impl VisitStage {
    /// Whether this stage admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, VisitStage::Completed)
    }
}

impl std::fmt::Display for VisitStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            VisitStage::CheckIn => "Check-In",
            VisitStage::Vitals => "Vitals",
            VisitStage::Consultation => "Consultation",
            VisitStage::Lab => "Lab",
            VisitStage::Billing => "Billing",
            VisitStage::Pharmacy => "Pharmacy",
            VisitStage::Clearance => "Clearance",
            VisitStage::Completed => "Completed",
        };
        write!(f, "{}", label)
    }
}

/// Triage priority assigned at check-in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VisitPriority {
    /// Routine visit
    Normal,
    /// Seen ahead of routine visits
    Urgent,
    /// Immediate attention
    Emergency,
}

/// Payment state of the visit bill.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentStatus {
    /// Bill not yet settled
    Pending,
    /// Bill settled at the cashier
    Paid,
}

/// Vital signs captured at the nurse station.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vitals {
    /// Body temperature in Celsius
    pub temperature_c: Option<f64>,
    /// Blood pressure reading (e.g. "120/80")
    pub blood_pressure: Option<String>,
    /// Pulse in beats per minute
    pub pulse_bpm: Option<i64>,
    /// Respiratory rate per minute
    pub respiratory_rate: Option<i64>,
    /// Weight in kg
    pub weight_kg: Option<f64>,
    /// Height in cm
    pub height_cm: Option<f64>,
    /// Staff member who recorded the vitals
    pub recorded_by: String,
    /// Capture timestamp
    pub recorded_at: String,
}

impl Vitals {
    /// Create an empty vitals record attributed to a staff member.
    pub fn new(recorded_by: String) -> Self {
        Self {
            temperature_c: None,
            blood_pressure: None,
            pulse_bpm: None,
            respiratory_rate: None,
            weight_kg: None,
            height_cm: None,
            recorded_by,
            recorded_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Status of a single lab order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LabOrderStatus {
    /// Ordered, awaiting results
    Ordered,
    /// Results entered, billable
    Completed,
}

/// A lab test ordered during consultation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabOrder {
    /// Unique order ID
    pub id: String,
    /// Test name (e.g. "Malaria RDT")
    pub test_name: String,
    /// Test price
    pub price: f64,
    /// Order status
    pub status: LabOrderStatus,
    /// Result text, entered on completion
    pub result: Option<String>,
    /// Order timestamp
    pub ordered_at: String,
    /// Completion timestamp
    pub completed_at: Option<String>,
}

impl LabOrder {
    /// Create a new pending lab order.
    pub fn new(test_name: String, price: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            test_name,
            price,
            status: LabOrderStatus::Ordered,
            result: None,
            ordered_at: chrono::Utc::now().to_rfc3339(),
            completed_at: None,
        }
    }

    /// Record the result and mark the order completed.
    pub fn complete(&mut self, result: String) {
        self.result = Some(result);
        self.status = LabOrderStatus::Completed;
        self.completed_at = Some(chrono::Utc::now().to_rfc3339());
    }

    /// Whether results have been entered.
    pub fn is_completed(&self) -> bool {
        self.status == LabOrderStatus::Completed
    }
}

/// A single prescribed medication line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionLine {
    /// Inventory item this line draws from
    pub inventory_id: String,
    /// Medication name (for display and audit)
    pub name: String,
    /// Dosage instructions (e.g. "1 tablet twice daily")
    pub dosage: String,
    /// Quantity to dispense
    pub quantity: i64,
    /// Unit price at prescription time
    pub price: f64,
}

impl PrescriptionLine {
    /// Create a prescription line.
    pub fn new(
        inventory_id: String,
        name: String,
        dosage: String,
        quantity: i64,
        price: f64,
    ) -> Self {
        Self {
            inventory_id,
            name,
            dosage,
            quantity,
            price,
        }
    }

    /// Charge contributed by this line.
    pub fn line_total(&self) -> f64 {
        self.price * self.quantity as f64
    }
}

/// One patient encounter moving through the clinic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Visit {
    /// Unique visit ID
    pub id: String,
    /// Patient being seen
    pub patient_id: String,
    /// Patient name (denormalized for queue display)
    pub patient_name: String,
    /// Current clinical stage
    pub stage: VisitStage,
    /// When the current stage was entered
    pub stage_start_time: String,
    /// When the visit was created
    pub start_time: String,
    /// Position in the day's queue, assigned once at check-in
    pub queue_number: i64,
    /// Triage priority
    pub priority: VisitPriority,
    /// Presenting complaint from the front desk
    pub complaint: Option<String>,
    /// Diagnosis recorded at consultation
    pub diagnosis: Option<String>,
    /// Vitals, absent when the nurse station was skipped
    pub vitals: Option<Vitals>,
    /// Lab orders from the consultation
    pub lab_orders: Vec<LabOrder>,
    /// Prescribed medication lines
    pub prescription: Vec<PrescriptionLine>,
    /// Set once by the dispensing transaction
    pub medications_dispensed: bool,
    /// Clinician's consultation fee
    pub consultation_fee: f64,
    /// Derived total, recomputed from fee + labs + prescription
    pub total_bill: f64,
    /// Payment state, written by the cashier
    pub payment_status: PaymentStatus,
    /// Optimistic concurrency counter
    pub version: i64,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl Visit {
    /// Create a visit at check-in. When `skip_vitals` is set the visit
    /// starts directly at Consultation; the choice is final.
    pub fn new(
        patient_id: String,
        patient_name: String,
        queue_number: i64,
        priority: VisitPriority,
        skip_vitals: bool,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        let stage = if skip_vitals {
            VisitStage::Consultation
        } else {
            VisitStage::CheckIn
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id,
            patient_name,
            stage,
            stage_start_time: now.clone(),
            start_time: now.clone(),
            queue_number,
            priority,
            complaint: None,
            diagnosis: None,
            vitals: None,
            lab_orders: Vec::new(),
            prescription: Vec::new(),
            medications_dispensed: false,
            consultation_fee: 0.0,
            total_bill: 0.0,
            payment_status: PaymentStatus::Pending,
            version: 1,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Move to a stage, resetting the stage clock. Legality is checked by
    /// the workflow before this is called.
    pub fn enter_stage(&mut self, stage: VisitStage) {
        self.stage = stage;
        self.stage_start_time = chrono::Utc::now().to_rfc3339();
        self.touch();
    }

    /// Whether the visit has been discharged.
    pub fn is_completed(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Whether any lab work was ordered.
    pub fn has_lab_orders(&self) -> bool {
        !self.lab_orders.is_empty()
    }

    /// Count of lab orders still awaiting results.
    pub fn pending_lab_count(&self) -> usize {
        self.lab_orders.iter().filter(|o| !o.is_completed()).count()
    }

    /// Sum of completed lab order prices.
    pub fn lab_total(&self) -> f64 {
        self.lab_orders
            .iter()
            .filter(|o| o.is_completed())
            .map(|o| o.price)
            .sum()
    }

    /// Sum of prescription line totals.
    pub fn prescription_total(&self) -> f64 {
        self.prescription.iter().map(|l| l.line_total()).sum()
    }

    /// Minutes spent in the current stage, None if the timestamp does
    /// not parse.
    pub fn minutes_in_stage(&self) -> Option<i64> {
        let entered = chrono::DateTime::parse_from_rfc3339(&self.stage_start_time).ok()?;
        Some((chrono::Utc::now() - entered.with_timezone(&chrono::Utc)).num_minutes())
    }

    /// One-line summary folded into patient history at completion.
    pub fn summary(&self) -> String {
        let date = self.start_time.split('T').next().unwrap_or(&self.start_time);
        let diagnosis = self.diagnosis.as_deref().unwrap_or("no diagnosis recorded");
        format!(
            "Visit on {}: {} (bill {:.2}, {} medication(s), {} lab order(s))",
            date,
            diagnosis,
            self.total_bill,
            self.prescription.len(),
            self.lab_orders.len()
        )
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_visit() -> Visit {
        Visit::new(
            "patient-1".into(),
            "Amina Yusuf".into(),
            4,
            VisitPriority::Normal,
            false,
        )
    }

    #[test]
    fn test_new_visit_starts_at_check_in() {
        let visit = make_visit();
        assert_eq!(visit.stage, VisitStage::CheckIn);
        assert_eq!(visit.queue_number, 4);
        assert_eq!(visit.version, 1);
        assert!(!visit.medications_dispensed);
        assert_eq!(visit.payment_status, PaymentStatus::Pending);
    }

    #[test]
    fn test_skip_vitals_starts_at_consultation() {
        let visit = Visit::new(
            "patient-1".into(),
            "Amina Yusuf".into(),
            1,
            VisitPriority::Urgent,
            true,
        );
        assert_eq!(visit.stage, VisitStage::Consultation);
        assert!(visit.vitals.is_none());
    }

    #[test]
    fn test_lab_total_counts_completed_only() {
        let mut visit = make_visit();
        let mut done = LabOrder::new("Malaria RDT".into(), 100.0);
        done.complete("negative".into());
        visit.lab_orders.push(done);
        visit.lab_orders.push(LabOrder::new("FBC".into(), 250.0));

        assert_eq!(visit.lab_total(), 100.0);
        assert_eq!(visit.pending_lab_count(), 1);
    }

    #[test]
    fn test_prescription_total() {
        let mut visit = make_visit();
        visit.prescription.push(PrescriptionLine::new(
            "item-1".into(),
            "Paracetamol 500mg".into(),
            "2 tablets thrice daily".into(),
            2,
            100.0,
        ));
        visit.prescription.push(PrescriptionLine::new(
            "item-2".into(),
            "Amoxicillin 250mg".into(),
            "1 capsule twice daily".into(),
            10,
            15.0,
        ));

        assert_eq!(visit.prescription_total(), 350.0);
    }

    #[test]
    fn test_enter_stage_resets_stage_clock() {
        let mut visit = make_visit();
        let before = visit.stage_start_time.clone();
        std::thread::sleep(std::time::Duration::from_millis(5));
        visit.enter_stage(VisitStage::Vitals);

        assert_eq!(visit.stage, VisitStage::Vitals);
        assert_ne!(visit.stage_start_time, before);
        assert_eq!(visit.start_time, visit.created_at);
    }

    #[test]
    fn test_minutes_in_stage_parses_timestamp() {
        let visit = make_visit();
        assert_eq!(visit.minutes_in_stage(), Some(0));

        let mut broken = make_visit();
        broken.stage_start_time = "not-a-timestamp".into();
        assert_eq!(broken.minutes_in_stage(), None);
    }

    #[test]
    fn test_summary_mentions_diagnosis_and_bill() {
        let mut visit = make_visit();
        visit.diagnosis = Some("uncomplicated malaria".into());
        visit.total_bill = 700.0;

        let summary = visit.summary();
        assert!(summary.contains("uncomplicated malaria"));
        assert!(summary.contains("700.00"));
    }
}
