//! Property-based tests for the invariants the rest of the system
//! leans on: stock clamping, chain integrity, single-successor stage
//! transitions, and bill arithmetic.

use proptest::prelude::*;

use careflow_core::billing::compute_total;
use careflow_core::ledger::{seal, verify_chain, BreakReason, ChainStatus};
use careflow_core::workflow::{next_stage, validate_transition, STAGE_ORDER};
use careflow_core::{
    BillStatement, InventoryAction, InventoryItem, InventoryLog, ItemCategory, LabOrder,
    PrescriptionLine, Visit, VisitPriority, VisitStage,
};

fn make_visit() -> Visit {
    Visit::new(
        "patient-1".into(),
        "Amina Yusuf".into(),
        1,
        VisitPriority::Normal,
        false,
    )
}

fn sealed_chain(deltas: &[i64]) -> Vec<InventoryLog> {
    let mut logs = Vec::new();
    let mut tip = String::new();
    for delta in deltas {
        let mut log = InventoryLog::new(
            "item-1".into(),
            "Paracetamol 500mg".into(),
            InventoryAction::Dispensed,
            Some(*delta),
            "dispense".into(),
            "pharm".into(),
        );
        seal(&mut log, &tip).unwrap();
        tip = log.entry_hash.clone();
        logs.push(log);
    }
    logs
}

proptest! {
    /// Clamping never yields negative stock, and the applied delta never
    /// exceeds what was requested.
    #[test]
    fn prop_clamped_stock_stays_non_negative(
        stock in 0i64..100_000,
        delta in -200_000i64..200_000,
    ) {
        let mut item = InventoryItem::new(
            "Paracetamol 500mg".into(),
            ItemCategory::Medicine,
            "tablet".into(),
            10.0,
        );
        item.stock = stock;

        let new_stock = item.clamped_stock(delta);
        let applied = new_stock - stock;

        prop_assert!(new_stock >= 0);
        prop_assert_eq!(new_stock, (stock + delta).max(0));
        if delta >= 0 {
            prop_assert_eq!(applied, delta);
        } else {
            prop_assert!(applied <= 0);
            prop_assert!(applied >= delta);
        }
    }

    /// A correctly sealed chain of any length verifies intact.
    #[test]
    fn prop_sealed_chains_verify(deltas in prop::collection::vec(-50i64..50, 0..12)) {
        let logs = sealed_chain(&deltas);
        let entries = logs.len();
        prop_assert_eq!(verify_chain(&logs).unwrap(), ChainStatus::Intact { entries });
    }

    /// Editing any single entry is caught, at exactly that entry.
    #[test]
    fn prop_any_edit_breaks_the_chain(
        deltas in prop::collection::vec(-50i64..50, 1..10),
        victim in any::<prop::sample::Index>(),
    ) {
        let mut logs = sealed_chain(&deltas);
        let target = victim.index(logs.len());
        logs[target].notes = "edited after the fact".into();

        match verify_chain(&logs).unwrap() {
            ChainStatus::Broken { index, reason, .. } => {
                prop_assert_eq!(index, target);
                prop_assert_eq!(reason, BreakReason::TamperedBody);
            }
            ChainStatus::Intact { .. } => prop_assert!(false, "edit went undetected"),
        }
    }

    /// From any stage, exactly the computed successor is accepted and
    /// every other target is rejected.
    #[test]
    fn prop_transitions_have_a_single_successor(
        from in 0usize..8,
        to in 0usize..8,
        has_labs in any::<bool>(),
    ) {
        let mut visit = make_visit();
        visit.stage = STAGE_ORDER[from];
        if has_labs {
            visit.lab_orders.push(LabOrder::new("FBC".into(), 250.0));
        }

        let target = STAGE_ORDER[to];
        let accepted = validate_transition(&visit, &target).is_ok();
        let expected = next_stage(&visit) == Some(target);
        prop_assert_eq!(accepted, expected);
    }

    /// Statement lines always sum to the recomputed total.
    #[test]
    fn prop_statement_lines_sum_to_total(
        fee in 0u32..100_000,
        labs in prop::collection::vec((1u32..50_000, any::<bool>()), 0..5),
        rx in prop::collection::vec((1i64..40, 1u32..10_000), 0..5),
    ) {
        let mut visit = make_visit();
        visit.consultation_fee = fee as f64;
        for (price, done) in labs {
            let mut order = LabOrder::new("Test".into(), price as f64);
            if done {
                order.complete("ok".into());
            }
            visit.lab_orders.push(order);
        }
        for (qty, price) in rx {
            visit.prescription.push(PrescriptionLine::new(
                "item-1".into(),
                "Drug".into(),
                "as directed".into(),
                qty,
                price as f64,
            ));
        }

        let total = compute_total(&visit);
        let statement = BillStatement::from_visit(&visit);

        prop_assert!((statement.total - total).abs() < 1e-6);
        let line_sum: f64 = statement.lines.iter().map(|l| l.amount).sum();
        prop_assert!((line_sum - total).abs() < 1e-6);
    }

    /// Recomputing a bill is idempotent: same inputs, same total.
    #[test]
    fn prop_bill_recompute_is_idempotent(
        fee in 0u32..100_000,
        rx in prop::collection::vec((1i64..40, 1u32..10_000), 0..5),
    ) {
        let mut visit = make_visit();
        visit.consultation_fee = fee as f64;
        for (qty, price) in rx {
            visit.prescription.push(PrescriptionLine::new(
                "item-1".into(),
                "Drug".into(),
                "as directed".into(),
                qty,
                price as f64,
            ));
        }

        let first = compute_total(&visit);
        visit.total_bill = first;
        let second = compute_total(&visit);
        prop_assert_eq!(first, second);
    }
}

#[test]
fn test_stage_order_ends_terminal() {
    // The walk stops at Completed and nowhere else
    for stage in STAGE_ORDER {
        let mut visit = make_visit();
        visit.stage = stage;
        assert_eq!(next_stage(&visit).is_none(), stage == VisitStage::Completed);
    }
}
