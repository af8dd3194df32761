//! Patient models.

use serde::{Deserialize, Serialize};

/// A patient record with a rolling visit history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// Unique patient ID
    pub id: String,
    /// Patient full name
    pub name: String,
    /// Contact phone number
    pub phone: Option<String>,
    /// Gender (free text, e.g. "female")
    pub gender: Option<String>,
    /// Date of birth (ISO date)
    pub date_of_birth: Option<String>,
    /// Home address
    pub address: Option<String>,
    /// Known allergies
    pub allergies: Option<String>,
    /// Additional notes
    pub notes: Option<String>,
    /// Visit summaries, most recent first
    pub history: Vec<String>,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl Patient {
    /// Create a new patient with required fields.
    pub fn new(name: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            phone: None,
            gender: None,
            date_of_birth: None,
            address: None,
            allergies: None,
            notes: None,
            history: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Prepend a completed-visit summary to the history.
    pub fn record_visit(&mut self, summary: String) {
        self.history.insert(0, summary);
        self.touch();
    }

    /// Check whether this patient has any recorded visits.
    pub fn has_history(&self) -> bool {
        !self.history.is_empty()
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}
