//! Visit database operations.
//!
//! Visit updates are compare-and-swap on the version column so a stale
//! screen cannot silently clobber another station's write.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::models::{
    LabOrder, PaymentStatus, PrescriptionLine, Visit, VisitPriority, VisitStage, Vitals,
};

impl Database {
    /// Insert a new visit.
    pub fn insert_visit(&self, visit: &Visit) -> DbResult<()> {
        let vitals_json = visit
            .vitals
            .as_ref()
            .map(|v| serde_json::to_string(v))
            .transpose()?;
        let lab_orders_json = serde_json::to_string(&visit.lab_orders)?;
        let prescription_json = serde_json::to_string(&visit.prescription)?;

        self.conn.execute(
            r#"
            INSERT INTO visits (
                id, patient_id, patient_name, stage, stage_start_time, start_time,
                queue_number, priority, complaint, diagnosis, vitals, lab_orders,
                prescription, medications_dispensed, consultation_fee, total_bill,
                payment_status, version, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
            "#,
            params![
                visit.id,
                visit.patient_id,
                visit.patient_name,
                stage_to_string(&visit.stage),
                visit.stage_start_time,
                visit.start_time,
                visit.queue_number,
                priority_to_string(&visit.priority),
                visit.complaint,
                visit.diagnosis,
                vitals_json,
                lab_orders_json,
                prescription_json,
                visit.medications_dispensed,
                visit.consultation_fee,
                visit.total_bill,
                payment_to_string(&visit.payment_status),
                visit.version,
                visit.created_at,
                visit.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Compare-and-swap update. Returns the new version; a version
    /// mismatch rejects the write with a conflict.
    pub fn update_visit(&self, visit: &Visit) -> DbResult<i64> {
        let vitals_json = visit
            .vitals
            .as_ref()
            .map(|v| serde_json::to_string(v))
            .transpose()?;
        let lab_orders_json = serde_json::to_string(&visit.lab_orders)?;
        let prescription_json = serde_json::to_string(&visit.prescription)?;

        let rows_affected = self.conn.execute(
            r#"
            UPDATE visits SET
                stage = ?3,
                stage_start_time = ?4,
                priority = ?5,
                complaint = ?6,
                diagnosis = ?7,
                vitals = ?8,
                lab_orders = ?9,
                prescription = ?10,
                medications_dispensed = ?11,
                consultation_fee = ?12,
                total_bill = ?13,
                payment_status = ?14,
                version = ?2 + 1,
                updated_at = datetime('now')
            WHERE id = ?1 AND version = ?2
            "#,
            params![
                visit.id,
                visit.version,
                stage_to_string(&visit.stage),
                visit.stage_start_time,
                priority_to_string(&visit.priority),
                visit.complaint,
                visit.diagnosis,
                vitals_json,
                lab_orders_json,
                prescription_json,
                visit.medications_dispensed,
                visit.consultation_fee,
                visit.total_bill,
                payment_to_string(&visit.payment_status),
            ],
        )?;
        if rows_affected == 0 {
            return Err(self.stale_visit_error(&visit.id));
        }
        Ok(visit.version + 1)
    }

    /// Get a visit by ID.
    pub fn get_visit(&self, id: &str) -> DbResult<Option<Visit>> {
        self.conn
            .query_row(
                r#"
                SELECT id, patient_id, patient_name, stage, stage_start_time, start_time,
                       queue_number, priority, complaint, diagnosis, vitals, lab_orders,
                       prescription, medications_dispensed, consultation_fee, total_bill,
                       payment_status, version, created_at, updated_at
                FROM visits
                WHERE id = ?
                "#,
                [id],
                |row| {
                    Ok(VisitRow {
                        id: row.get(0)?,
                        patient_id: row.get(1)?,
                        patient_name: row.get(2)?,
                        stage: row.get(3)?,
                        stage_start_time: row.get(4)?,
                        start_time: row.get(5)?,
                        queue_number: row.get(6)?,
                        priority: row.get(7)?,
                        complaint: row.get(8)?,
                        diagnosis: row.get(9)?,
                        vitals: row.get(10)?,
                        lab_orders: row.get(11)?,
                        prescription: row.get(12)?,
                        medications_dispensed: row.get(13)?,
                        consultation_fee: row.get(14)?,
                        total_bill: row.get(15)?,
                        payment_status: row.get(16)?,
                        version: row.get(17)?,
                        created_at: row.get(18)?,
                        updated_at: row.get(19)?,
                    })
                },
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// All visits not yet completed, emergencies first, then queue order.
    pub fn active_visits(&self) -> DbResult<Vec<Visit>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, patient_id, patient_name, stage, stage_start_time, start_time,
                   queue_number, priority, complaint, diagnosis, vitals, lab_orders,
                   prescription, medications_dispensed, consultation_fee, total_bill,
                   payment_status, version, created_at, updated_at
            FROM visits
            WHERE stage != 'completed'
            ORDER BY CASE priority
                WHEN 'emergency' THEN 0
                WHEN 'urgent' THEN 1
                ELSE 2
            END, queue_number
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(VisitRow {
                id: row.get(0)?,
                patient_id: row.get(1)?,
                patient_name: row.get(2)?,
                stage: row.get(3)?,
                stage_start_time: row.get(4)?,
                start_time: row.get(5)?,
                queue_number: row.get(6)?,
                priority: row.get(7)?,
                complaint: row.get(8)?,
                diagnosis: row.get(9)?,
                vitals: row.get(10)?,
                lab_orders: row.get(11)?,
                prescription: row.get(12)?,
                medications_dispensed: row.get(13)?,
                consultation_fee: row.get(14)?,
                total_bill: row.get(15)?,
                payment_status: row.get(16)?,
                version: row.get(17)?,
                created_at: row.get(18)?,
                updated_at: row.get(19)?,
            })
        })?;

        let mut visits = Vec::new();
        for row in rows {
            visits.push(row?.try_into()?);
        }
        Ok(visits)
    }

    /// Visits waiting at one stage, emergencies first, then queue order.
    pub fn visits_at_stage(&self, stage: &VisitStage) -> DbResult<Vec<Visit>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, patient_id, patient_name, stage, stage_start_time, start_time,
                   queue_number, priority, complaint, diagnosis, vitals, lab_orders,
                   prescription, medications_dispensed, consultation_fee, total_bill,
                   payment_status, version, created_at, updated_at
            FROM visits
            WHERE stage = ?
            ORDER BY CASE priority
                WHEN 'emergency' THEN 0
                WHEN 'urgent' THEN 1
                ELSE 2
            END, queue_number
            "#,
        )?;

        let rows = stmt.query_map([stage_to_string(stage)], |row| {
            Ok(VisitRow {
                id: row.get(0)?,
                patient_id: row.get(1)?,
                patient_name: row.get(2)?,
                stage: row.get(3)?,
                stage_start_time: row.get(4)?,
                start_time: row.get(5)?,
                queue_number: row.get(6)?,
                priority: row.get(7)?,
                complaint: row.get(8)?,
                diagnosis: row.get(9)?,
                vitals: row.get(10)?,
                lab_orders: row.get(11)?,
                prescription: row.get(12)?,
                medications_dispensed: row.get(13)?,
                consultation_fee: row.get(14)?,
                total_bill: row.get(15)?,
                payment_status: row.get(16)?,
                version: row.get(17)?,
                created_at: row.get(18)?,
                updated_at: row.get(19)?,
            })
        })?;

        let mut visits = Vec::new();
        for row in rows {
            visits.push(row?.try_into()?);
        }
        Ok(visits)
    }

    /// All visits for a patient, newest first.
    pub fn visits_for_patient(&self, patient_id: &str) -> DbResult<Vec<Visit>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, patient_id, patient_name, stage, stage_start_time, start_time,
                   queue_number, priority, complaint, diagnosis, vitals, lab_orders,
                   prescription, medications_dispensed, consultation_fee, total_bill,
                   payment_status, version, created_at, updated_at
            FROM visits
            WHERE patient_id = ?
            ORDER BY start_time DESC
            "#,
        )?;

        let rows = stmt.query_map([patient_id], |row| {
            Ok(VisitRow {
                id: row.get(0)?,
                patient_id: row.get(1)?,
                patient_name: row.get(2)?,
                stage: row.get(3)?,
                stage_start_time: row.get(4)?,
                start_time: row.get(5)?,
                queue_number: row.get(6)?,
                priority: row.get(7)?,
                complaint: row.get(8)?,
                diagnosis: row.get(9)?,
                vitals: row.get(10)?,
                lab_orders: row.get(11)?,
                prescription: row.get(12)?,
                medications_dispensed: row.get(13)?,
                consultation_fee: row.get(14)?,
                total_bill: row.get(15)?,
                payment_status: row.get(16)?,
                version: row.get(17)?,
                created_at: row.get(18)?,
                updated_at: row.get(19)?,
            })
        })?;

        let mut visits = Vec::new();
        for row in rows {
            visits.push(row?.try_into()?);
        }
        Ok(visits)
    }

    /// Update a visit and its patient in one transaction. Used at
    /// completion so the stage change and the history fold land together
    /// or not at all. Returns the visit's new version.
    pub fn update_visit_and_patient(
        &self,
        visit: &Visit,
        patient: &crate::models::Patient,
    ) -> DbResult<i64> {
        let tx = self.conn.unchecked_transaction()?;
        let new_version = self.update_visit(visit)?;
        if !self.update_patient(patient)? {
            return Err(DbError::NotFound(format!("Patient {}", patient.id)));
        }
        tx.commit()?;
        Ok(new_version)
    }

    /// Claim the next queue number for a day. The counter row is bumped
    /// atomically, so concurrent check-ins never share a number.
    pub fn next_queue_number(&self, day: &str) -> DbResult<i64> {
        self.conn
            .query_row(
                r#"
                INSERT INTO queue_counters (day, next) VALUES (?, 1)
                ON CONFLICT(day) DO UPDATE SET next = next + 1
                RETURNING next
                "#,
                [day],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    /// Distinguish a missing row from a stale version on CAS failure.
    fn stale_visit_error(&self, id: &str) -> DbError {
        let exists = self
            .conn
            .query_row("SELECT COUNT(*) FROM visits WHERE id = ?", [id], |row| {
                row.get::<_, i64>(0)
            })
            .unwrap_or(0)
            > 0;
        if exists {
            DbError::Conflict(format!("Visit {} was modified concurrently", id))
        } else {
            DbError::NotFound(format!("Visit {}", id))
        }
    }
}

/// Intermediate row struct for database mapping.
struct VisitRow {
    id: String,
    patient_id: String,
    patient_name: String,
    stage: String,
    stage_start_time: String,
    start_time: String,
    queue_number: i64,
    priority: String,
    complaint: Option<String>,
    diagnosis: Option<String>,
    vitals: Option<String>,
    lab_orders: String,
    prescription: String,
    medications_dispensed: bool,
    consultation_fee: f64,
    total_bill: f64,
    payment_status: String,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<VisitRow> for Visit {
    type Error = DbError;

    fn try_from(row: VisitRow) -> Result<Self, Self::Error> {
        let vitals: Option<Vitals> = row
            .vitals
            .map(|s| serde_json::from_str(&s))
            .transpose()?;
        let lab_orders: Vec<LabOrder> = serde_json::from_str(&row.lab_orders)?;
        let prescription: Vec<PrescriptionLine> = serde_json::from_str(&row.prescription)?;
        let stage = string_to_stage(&row.stage)?;
        let priority = string_to_priority(&row.priority)?;
        let payment_status = string_to_payment(&row.payment_status)?;

        Ok(Visit {
            id: row.id,
            patient_id: row.patient_id,
            patient_name: row.patient_name,
            stage,
            stage_start_time: row.stage_start_time,
            start_time: row.start_time,
            queue_number: row.queue_number,
            priority,
            complaint: row.complaint,
            diagnosis: row.diagnosis,
            vitals,
            lab_orders,
            prescription,
            medications_dispensed: row.medications_dispensed,
            consultation_fee: row.consultation_fee,
            total_bill: row.total_bill,
            payment_status,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn stage_to_string(stage: &VisitStage) -> &'static str {
    match stage {
        VisitStage::CheckIn => "check_in",
        VisitStage::Vitals => "vitals",
        VisitStage::Consultation => "consultation",
        VisitStage::Lab => "lab",
        VisitStage::Billing => "billing",
        VisitStage::Pharmacy => "pharmacy",
        VisitStage::Clearance => "clearance",
        VisitStage::Completed => "completed",
    }
}

fn string_to_stage(s: &str) -> Result<VisitStage, DbError> {
    match s {
        "check_in" => Ok(VisitStage::CheckIn),
        "vitals" => Ok(VisitStage::Vitals),
        "consultation" => Ok(VisitStage::Consultation),
        "lab" => Ok(VisitStage::Lab),
        "billing" => Ok(VisitStage::Billing),
        "pharmacy" => Ok(VisitStage::Pharmacy),
        "clearance" => Ok(VisitStage::Clearance),
        "completed" => Ok(VisitStage::Completed),
        _ => Err(DbError::Constraint(format!("Unknown visit stage: {}", s))),
    }
}

fn priority_to_string(priority: &VisitPriority) -> &'static str {
    match priority {
        VisitPriority::Normal => "normal",
        VisitPriority::Urgent => "urgent",
        VisitPriority::Emergency => "emergency",
    }
}

fn string_to_priority(s: &str) -> Result<VisitPriority, DbError> {
    match s {
        "normal" => Ok(VisitPriority::Normal),
        "urgent" => Ok(VisitPriority::Urgent),
        "emergency" => Ok(VisitPriority::Emergency),
        _ => Err(DbError::Constraint(format!("Unknown priority: {}", s))),
    }
}

fn payment_to_string(status: &PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Pending => "pending",
        PaymentStatus::Paid => "paid",
    }
}

fn string_to_payment(s: &str) -> Result<PaymentStatus, DbError> {
    match s {
        "pending" => Ok(PaymentStatus::Pending),
        "paid" => Ok(PaymentStatus::Paid),
        _ => Err(DbError::Constraint(format!("Unknown payment status: {}", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Patient;

    fn setup_db() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let patient = Patient::new("Amina Yusuf".into());
        db.insert_patient(&patient).unwrap();
        let id = patient.id;
        (db, id)
    }

    fn make_visit(patient_id: &str, queue_number: i64) -> Visit {
        Visit::new(
            patient_id.into(),
            "Amina Yusuf".into(),
            queue_number,
            VisitPriority::Normal,
            false,
        )
    }

    #[test]
    fn test_insert_and_get_roundtrip() {
        let (db, patient_id) = setup_db();

        let mut visit = make_visit(&patient_id, 1);
        visit.vitals = Some(Vitals::new("nurse-joy".into()));
        visit.lab_orders.push(LabOrder::new("Malaria RDT".into(), 100.0));
        visit.prescription.push(PrescriptionLine::new(
            "item-1".into(),
            "Paracetamol 500mg".into(),
            "2 tablets thrice daily".into(),
            6,
            10.0,
        ));
        db.insert_visit(&visit).unwrap();

        let retrieved = db.get_visit(&visit.id).unwrap().unwrap();
        assert_eq!(retrieved.stage, VisitStage::CheckIn);
        assert_eq!(retrieved.vitals.as_ref().unwrap().recorded_by, "nurse-joy");
        assert_eq!(retrieved.lab_orders.len(), 1);
        assert_eq!(retrieved.prescription.len(), 1);
        assert_eq!(retrieved.version, 1);
    }

    #[test]
    fn test_update_bumps_version() {
        let (db, patient_id) = setup_db();
        let mut visit = make_visit(&patient_id, 1);
        db.insert_visit(&visit).unwrap();

        visit.enter_stage(VisitStage::Vitals);
        let new_version = db.update_visit(&visit).unwrap();
        assert_eq!(new_version, 2);

        let retrieved = db.get_visit(&visit.id).unwrap().unwrap();
        assert_eq!(retrieved.stage, VisitStage::Vitals);
        assert_eq!(retrieved.version, 2);
    }

    #[test]
    fn test_stale_update_conflicts() {
        let (db, patient_id) = setup_db();
        let mut visit = make_visit(&patient_id, 1);
        db.insert_visit(&visit).unwrap();

        // First writer wins
        visit.enter_stage(VisitStage::Vitals);
        db.update_visit(&visit).unwrap();

        // Second writer still holds version 1
        visit.diagnosis = Some("stale write".into());
        let result = db.update_visit(&visit);
        assert!(matches!(result, Err(DbError::Conflict(_))));

        let retrieved = db.get_visit(&visit.id).unwrap().unwrap();
        assert!(retrieved.diagnosis.is_none());
    }

    #[test]
    fn test_update_missing_visit_not_found() {
        let (db, patient_id) = setup_db();
        let visit = make_visit(&patient_id, 1);
        let result = db.update_visit(&visit);
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_active_visits_order_and_filter() {
        let (db, patient_id) = setup_db();

        let mut first = make_visit(&patient_id, 1);
        let second = make_visit(&patient_id, 2);
        let mut emergency = Visit::new(
            patient_id.clone(),
            "Amina Yusuf".into(),
            3,
            VisitPriority::Emergency,
            false,
        );
        db.insert_visit(&first).unwrap();
        db.insert_visit(&second).unwrap();
        db.insert_visit(&emergency).unwrap();

        // Completed visits drop out of the active list
        first.enter_stage(VisitStage::Completed);
        db.update_visit(&first).unwrap();
        emergency.enter_stage(VisitStage::Vitals);
        db.update_visit(&emergency).unwrap();

        let active = db.active_visits().unwrap();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].queue_number, 3); // emergency jumps the queue
        assert_eq!(active[1].queue_number, 2);

        let at_vitals = db.visits_at_stage(&VisitStage::Vitals).unwrap();
        assert_eq!(at_vitals.len(), 1);
        assert_eq!(at_vitals[0].id, emergency.id);
    }

    #[test]
    fn test_update_visit_and_patient_rolls_back_together() {
        let (db, patient_id) = setup_db();
        let mut visit = make_visit(&patient_id, 1);
        db.insert_visit(&visit).unwrap();

        let mut patient = db.get_patient(&patient_id).unwrap().unwrap();
        visit.enter_stage(VisitStage::Vitals);
        patient.record_visit("Visit on 2024-06-01: seen".into());

        let new_version = db.update_visit_and_patient(&visit, &patient).unwrap();
        assert_eq!(new_version, 2);
        assert_eq!(db.get_patient(&patient_id).unwrap().unwrap().history.len(), 1);

        // Stale visit version: the fold is rejected along with the stage write
        patient.record_visit("must not land".into());
        let result = db.update_visit_and_patient(&visit, &patient);
        assert!(matches!(result, Err(DbError::Conflict(_))));
        assert_eq!(db.get_patient(&patient_id).unwrap().unwrap().history.len(), 1);
    }

    #[test]
    fn test_next_queue_number_counts_per_day() {
        let (db, _) = setup_db();

        assert_eq!(db.next_queue_number("2024-06-01").unwrap(), 1);
        assert_eq!(db.next_queue_number("2024-06-01").unwrap(), 2);
        assert_eq!(db.next_queue_number("2024-06-01").unwrap(), 3);

        // A new day restarts the count
        assert_eq!(db.next_queue_number("2024-06-02").unwrap(), 1);
    }
}
