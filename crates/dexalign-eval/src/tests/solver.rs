use std::collections::BTreeSet;

use dexalign_common::ErrorKind;
use dexalign_model::FunctionStrings;

use crate::solver::{SolverStack, evaluate};
use crate::tests::{flat_model, nested_model, observations};

#[test]
fn flat_rows_follow_the_mixed_radix_index() {
    let model = flat_model();
    let mut solver = SolverStack::new(&model).unwrap();

    // Table "001112", row = a * 3 + b.
    assert_eq!(solver.solve(&[0, 0]), 0);
    assert_eq!(solver.solve(&[0, 2]), 1);
    assert_eq!(solver.solve(&[1, 0]), 1);
    assert_eq!(solver.solve(&[1, 2]), 2);
}

#[test]
fn nested_aggregates_feed_their_parent() {
    let model = nested_model();
    let mut solver = SolverStack::new(&model).unwrap();

    // A = a & b, R = A | ... table "0011": row = A * 2 + c, R = A.
    assert_eq!(solver.solve(&[0, 0, 0]), 0);
    assert_eq!(solver.solve(&[1, 1, 0]), 1);
    assert_eq!(solver.solve(&[1, 0, 1]), 0);
    assert_eq!(solver.solve(&[1, 1, 1]), 1);
}

#[test]
fn evaluation_is_deterministic() {
    let model = flat_model();
    let mut solver = SolverStack::new(&model).unwrap();
    for _ in 0..3 {
        assert_eq!(solver.solve(&[1, 1]), 1);
    }
}

#[test]
fn trace_records_every_aggregate_in_postorder() {
    let model = nested_model();
    let mut solver = SolverStack::new(&model).unwrap();
    let mut trace = Vec::new();

    let root = solver.solve_trace(&[1, 1, 0], &mut trace);
    assert_eq!(root, 1);
    // A first (children-first order), then R.
    assert_eq!(trace, vec![1, 1]);

    let root = solver.solve_trace(&[1, 0, 1], &mut trace);
    assert_eq!(root, 0);
    assert_eq!(trace, vec![0, 0]);
}

#[test]
fn cell_edits_are_visible_and_restorable() {
    let model = flat_model();
    let mut solver = SolverStack::new(&model).unwrap();

    let baseline = solver.functions();
    solver.value_set(0, 5, 0);
    assert_eq!(solver.solve(&[1, 2]), 0);
    solver.value_restore(0, 5);
    assert_eq!(solver.solve(&[1, 2]), 2);

    solver.value_clear(0, 0);
    solver.value_increase(0, 0);
    assert_eq!(solver.value(0, 0), 1);
    solver.reinit();
    assert_eq!(solver.functions(), baseline);
    assert_eq!(solver.default_value(0, 0), 0);
}

#[test]
fn short_utility_table_is_an_invariant_violation() {
    let mut model = flat_model();
    model.attributes[0].function.low = "0011".to_string();
    let err = SolverStack::new(&model).unwrap_err();
    assert_eq!(err.kind, ErrorKind::EvaluatorInvariant);
}

#[test]
fn out_of_scale_digit_is_an_invariant_violation() {
    let mut model = flat_model();
    model.attributes[0].function.low = "001117".to_string();
    let err = SolverStack::new(&model).unwrap_err();
    assert_eq!(err.kind, ErrorKind::EvaluatorInvariant);
}

#[test]
fn missing_function_is_an_invariant_violation() {
    let mut model = flat_model();
    model.attributes[0].function = FunctionStrings::default();
    assert!(SolverStack::new(&model).is_err());
}

#[test]
fn options_outside_the_scales_are_rejected() {
    let model = flat_model();
    let solver = SolverStack::new(&model).unwrap();

    let narrow = observations(&[(&[0, 0], 0)], 2);
    assert!(solver.check_options(&narrow).is_ok());

    let bad_value = observations(&[(&[2, 0], 0)], 2);
    assert_eq!(
        solver.check_options(&bad_value).unwrap_err().kind,
        ErrorKind::OptionsInconsistent
    );

    let bad_observed = observations(&[(&[0, 0], 3)], 2);
    assert!(solver.check_options(&bad_observed).is_err());
}

#[test]
fn reduce_expands_unknown_children_over_their_scales() {
    let model = nested_model();
    let mut solver = SolverStack::new(&model).unwrap();
    let mut sets = vec![BTreeSet::new(), BTreeSet::new()];

    // a=1, b=0, c=1: A reaches row 2; R sees (A=*, c=1) -> rows 1 and 3.
    solver.reduce(&[1, 0, 1], &mut sets);
    assert_eq!(sets[0].iter().copied().collect::<Vec<_>>(), vec![2]);
    assert_eq!(sets[1].iter().copied().collect::<Vec<_>>(), vec![1, 3]);
}

#[test]
fn reduce_is_idempotent() {
    let model = nested_model();
    let mut solver = SolverStack::new(&model).unwrap();
    let mut once = vec![BTreeSet::new(), BTreeSet::new()];
    solver.reduce(&[1, 0, 1], &mut once);
    let mut twice = once.clone();
    solver.reduce(&[1, 0, 1], &mut twice);
    assert_eq!(once, twice);
}

#[test]
fn evaluate_reports_kappas_and_confusion() {
    let model = flat_model();
    let options = observations(&[(&[0, 0], 0), (&[0, 2], 1), (&[1, 2], 2)], 2);
    let evaluation = evaluate(&model, &options).unwrap();

    assert_eq!(evaluation.simulated, vec![0, 1, 2]);
    assert_eq!(evaluation.linear_kappa, 1.0);
    assert_eq!(evaluation.squared_kappa, 1.0);
    assert_eq!(evaluation.confusion[1][1], 1);
    assert_eq!(evaluation.confusion[1][2], 0);
}

#[test]
fn evaluate_detects_disagreement() {
    let model = flat_model();
    let options = observations(&[(&[0, 0], 2), (&[0, 2], 1)], 2);
    let evaluation = evaluate(&model, &options).unwrap();
    assert_eq!(evaluation.simulated, vec![0, 1]);
    assert!(evaluation.squared_kappa < 1.0);
    assert_eq!(evaluation.confusion[2][0], 1);
}
