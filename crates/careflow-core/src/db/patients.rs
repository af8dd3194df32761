//! Patient database operations.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::models::Patient;

impl Database {
    /// Insert a new patient.
    pub fn insert_patient(&self, patient: &Patient) -> DbResult<()> {
        let history_json = serde_json::to_string(&patient.history)?;

        self.conn.execute(
            r#"
            INSERT INTO patients (
                id, name, phone, gender, date_of_birth, address,
                allergies, notes, history, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                patient.id,
                patient.name,
                patient.phone,
                patient.gender,
                patient.date_of_birth,
                patient.address,
                patient.allergies,
                patient.notes,
                history_json,
                patient.created_at,
                patient.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update an existing patient.
    pub fn update_patient(&self, patient: &Patient) -> DbResult<bool> {
        let history_json = serde_json::to_string(&patient.history)?;

        let rows_affected = self.conn.execute(
            r#"
            UPDATE patients SET
                name = ?2,
                phone = ?3,
                gender = ?4,
                date_of_birth = ?5,
                address = ?6,
                allergies = ?7,
                notes = ?8,
                history = ?9,
                updated_at = datetime('now')
            WHERE id = ?1
            "#,
            params![
                patient.id,
                patient.name,
                patient.phone,
                patient.gender,
                patient.date_of_birth,
                patient.address,
                patient.allergies,
                patient.notes,
                history_json,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, id: &str) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                r#"
                SELECT id, name, phone, gender, date_of_birth, address,
                       allergies, notes, history, created_at, updated_at
                FROM patients
                WHERE id = ?
                "#,
                [id],
                |row| {
                    Ok(PatientRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        phone: row.get(2)?,
                        gender: row.get(3)?,
                        date_of_birth: row.get(4)?,
                        address: row.get(5)?,
                        allergies: row.get(6)?,
                        notes: row.get(7)?,
                        history: row.get(8)?,
                        created_at: row.get(9)?,
                        updated_at: row.get(10)?,
                    })
                },
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Search patients by name or phone (prefix match).
    pub fn search_patients(&self, query: &str, limit: usize) -> DbResult<Vec<Patient>> {
        let pattern = format!("{}%", query);
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name, phone, gender, date_of_birth, address,
                   allergies, notes, history, created_at, updated_at
            FROM patients
            WHERE name LIKE ?1 OR phone LIKE ?1
            ORDER BY name
            LIMIT ?2
            "#,
        )?;

        let rows = stmt.query_map(params![pattern, limit as i64], |row| {
            Ok(PatientRow {
                id: row.get(0)?,
                name: row.get(1)?,
                phone: row.get(2)?,
                gender: row.get(3)?,
                date_of_birth: row.get(4)?,
                address: row.get(5)?,
                allergies: row.get(6)?,
                notes: row.get(7)?,
                history: row.get(8)?,
                created_at: row.get(9)?,
                updated_at: row.get(10)?,
            })
        })?;

        let mut patients = Vec::new();
        for row in rows {
            patients.push(row?.try_into()?);
        }
        Ok(patients)
    }

    /// List all patients.
    pub fn list_patients(&self) -> DbResult<Vec<Patient>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name, phone, gender, date_of_birth, address,
                   allergies, notes, history, created_at, updated_at
            FROM patients
            ORDER BY name
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(PatientRow {
                id: row.get(0)?,
                name: row.get(1)?,
                phone: row.get(2)?,
                gender: row.get(3)?,
                date_of_birth: row.get(4)?,
                address: row.get(5)?,
                allergies: row.get(6)?,
                notes: row.get(7)?,
                history: row.get(8)?,
                created_at: row.get(9)?,
                updated_at: row.get(10)?,
            })
        })?;

        let mut patients = Vec::new();
        for row in rows {
            patients.push(row?.try_into()?);
        }
        Ok(patients)
    }
}

/// Intermediate row struct for database mapping.
struct PatientRow {
    id: String,
    name: String,
    phone: Option<String>,
    gender: Option<String>,
    date_of_birth: Option<String>,
    address: Option<String>,
    allergies: Option<String>,
    notes: Option<String>,
    history: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<PatientRow> for Patient {
    type Error = DbError;

    fn try_from(row: PatientRow) -> Result<Self, Self::Error> {
        let history: Vec<String> = serde_json::from_str(&row.history)?;

        Ok(Patient {
            id: row.id,
            name: row.name,
            phone: row.phone,
            gender: row.gender,
            date_of_birth: row.date_of_birth,
            address: row.address,
            allergies: row.allergies,
            notes: row.notes,
            history,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup_db();

        let mut patient = Patient::new("Amina Yusuf".into());
        patient.phone = Some("0803-555-0101".into());
        patient.allergies = Some("penicillin".into());

        db.insert_patient(&patient).unwrap();

        let retrieved = db.get_patient(&patient.id).unwrap().unwrap();
        assert_eq!(retrieved.name, "Amina Yusuf");
        assert_eq!(retrieved.phone, Some("0803-555-0101".into()));
        assert_eq!(retrieved.allergies, Some("penicillin".into()));
        assert!(retrieved.history.is_empty());
    }

    #[test]
    fn test_update_persists_history() {
        let db = setup_db();

        let mut patient = Patient::new("Amina Yusuf".into());
        db.insert_patient(&patient).unwrap();

        patient.record_visit("Visit on 2024-01-01: malaria".into());
        patient.record_visit("Visit on 2024-02-01: follow-up".into());
        db.update_patient(&patient).unwrap();

        let retrieved = db.get_patient(&patient.id).unwrap().unwrap();
        assert_eq!(retrieved.history.len(), 2);
        assert!(retrieved.history[0].contains("follow-up"));
    }

    #[test]
    fn test_search_patients_by_name_or_phone() {
        let db = setup_db();

        let mut patient1 = Patient::new("Amina Yusuf".into());
        patient1.phone = Some("0803-555-0101".into());
        let patient2 = Patient::new("Aminu Bello".into());
        let patient3 = Patient::new("Chidi Okafor".into());

        db.insert_patient(&patient1).unwrap();
        db.insert_patient(&patient2).unwrap();
        db.insert_patient(&patient3).unwrap();

        let results = db.search_patients("Amin", 10).unwrap();
        assert_eq!(results.len(), 2);

        let results = db.search_patients("0803", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Amina Yusuf");
    }

    #[test]
    fn test_get_missing_patient_is_none() {
        let db = setup_db();
        assert!(db.get_patient("no-such-id").unwrap().is_none());
    }
}
