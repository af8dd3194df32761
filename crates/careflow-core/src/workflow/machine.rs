//! Stage transition rules.
//!
//! All stage legality checks live here; services request transitions and
//! nothing else writes the stage field. A visit moves strictly forward
//! through STAGE_ORDER, one stage at a time, with a single exception: a
//! visit with no lab orders goes from Consultation straight to Billing.

use thiserror::Error;

use crate::models::{Visit, VisitStage};

/// The fixed clinical stage order.
pub const STAGE_ORDER: [VisitStage; 8] = [
    VisitStage::CheckIn,
    VisitStage::Vitals,
    VisitStage::Consultation,
    VisitStage::Lab,
    VisitStage::Billing,
    VisitStage::Pharmacy,
    VisitStage::Clearance,
    VisitStage::Completed,
];

/// Rejected stage transitions.
#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("Visit {visit_id} is completed and cannot change stage")]
    TerminalStage { visit_id: String },

    #[error("Visit {visit_id} cannot move from {from} back to {to}")]
    Backward {
        visit_id: String,
        from: VisitStage,
        to: VisitStage,
    },

    #[error("Visit {visit_id} at {from} must move to {expected}, not {to}")]
    SkippedStage {
        visit_id: String,
        from: VisitStage,
        to: VisitStage,
        expected: VisitStage,
    },
}

/// Position of a stage in the fixed order.
pub fn stage_index(stage: &VisitStage) -> usize {
    STAGE_ORDER
        .iter()
        .position(|s| s == stage)
        .unwrap_or(STAGE_ORDER.len() - 1)
}

/// The single legal successor for a visit, None once completed. Applies
/// the Lab bypass when no lab work was ordered.
pub fn next_stage(visit: &Visit) -> Option<VisitStage> {
    match visit.stage {
        VisitStage::CheckIn => Some(VisitStage::Vitals),
        VisitStage::Vitals => Some(VisitStage::Consultation),
        VisitStage::Consultation => {
            if visit.has_lab_orders() {
                Some(VisitStage::Lab)
            } else {
                Some(VisitStage::Billing)
            }
        }
        VisitStage::Lab => Some(VisitStage::Billing),
        VisitStage::Billing => Some(VisitStage::Pharmacy),
        VisitStage::Pharmacy => Some(VisitStage::Clearance),
        VisitStage::Clearance => Some(VisitStage::Completed),
        VisitStage::Completed => None,
    }
}

/// Check that moving this visit to `to` is legal.
pub fn validate_transition(visit: &Visit, to: &VisitStage) -> Result<(), TransitionError> {
    if visit.stage.is_terminal() {
        return Err(TransitionError::TerminalStage {
            visit_id: visit.id.clone(),
        });
    }
    if stage_index(to) <= stage_index(&visit.stage) {
        return Err(TransitionError::Backward {
            visit_id: visit.id.clone(),
            from: visit.stage,
            to: *to,
        });
    }
    match next_stage(visit) {
        Some(expected) if *to == expected => Ok(()),
        Some(expected) => Err(TransitionError::SkippedStage {
            visit_id: visit.id.clone(),
            from: visit.stage,
            to: *to,
            expected,
        }),
        None => Err(TransitionError::TerminalStage {
            visit_id: visit.id.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LabOrder, VisitPriority};

    fn make_visit_at(stage: VisitStage) -> Visit {
        let mut visit = Visit::new(
            "patient-1".into(),
            "Amina Yusuf".into(),
            1,
            VisitPriority::Normal,
            false,
        );
        visit.stage = stage;
        visit
    }

    #[test]
    fn test_full_forward_walk_is_legal() {
        let mut visit = make_visit_at(VisitStage::CheckIn);
        visit.lab_orders.push(LabOrder::new("FBC".into(), 250.0));

        for window in STAGE_ORDER.windows(2) {
            visit.stage = window[0];
            assert!(validate_transition(&visit, &window[1]).is_ok());
        }
    }

    #[test]
    fn test_lab_bypass_without_orders() {
        let visit = make_visit_at(VisitStage::Consultation);
        assert_eq!(next_stage(&visit), Some(VisitStage::Billing));
        assert!(validate_transition(&visit, &VisitStage::Billing).is_ok());

        // Lab is not reachable when nothing was ordered
        assert!(matches!(
            validate_transition(&visit, &VisitStage::Lab),
            Err(TransitionError::SkippedStage { .. })
        ));
    }

    #[test]
    fn test_lab_required_with_orders() {
        let mut visit = make_visit_at(VisitStage::Consultation);
        visit.lab_orders.push(LabOrder::new("FBC".into(), 250.0));

        assert!(validate_transition(&visit, &VisitStage::Lab).is_ok());
        assert!(matches!(
            validate_transition(&visit, &VisitStage::Billing),
            Err(TransitionError::SkippedStage { .. })
        ));
    }

    #[test]
    fn test_backward_rejected() {
        let visit = make_visit_at(VisitStage::Billing);
        assert!(matches!(
            validate_transition(&visit, &VisitStage::Consultation),
            Err(TransitionError::Backward { .. })
        ));
        // Standing still is not a transition either
        assert!(matches!(
            validate_transition(&visit, &VisitStage::Billing),
            Err(TransitionError::Backward { .. })
        ));
    }

    #[test]
    fn test_skipping_forward_rejected() {
        let visit = make_visit_at(VisitStage::CheckIn);
        assert!(matches!(
            validate_transition(&visit, &VisitStage::Pharmacy),
            Err(TransitionError::SkippedStage { .. })
        ));
    }

    #[test]
    fn test_completed_is_terminal() {
        let visit = make_visit_at(VisitStage::Completed);
        assert_eq!(next_stage(&visit), None);
        for stage in STAGE_ORDER.iter() {
            assert!(validate_transition(&visit, stage).is_err());
        }
    }
}
