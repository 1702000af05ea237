//! End-to-end evaluation scenarios

use std::sync::Arc;

use scoregraph_engine::{EvaluationMode, NO_MAX};
use scoregraph_foundation::{ErrorKind, FloatKey};
use scoregraph_storage::EvaluationStage;

use crate::support::{Broken, Constant, Distance, model, particles};

// =============================================================================
// Basic scoring
// =============================================================================

#[test]
fn distance_between_two_particles() {
    let mut model = model();
    let a = model.add_particle().unwrap();
    let b = model.add_particle().unwrap();
    model.attributes_mut().add_optimized(FloatKey::X, a, 1.0).unwrap();
    model.attributes_mut().add_optimized(FloatKey::X, b, 2.0).unwrap();
    model.add_restraint(Distance::new("d", a, b)).unwrap();

    assert_eq!(model.evaluate(false).unwrap(), 1.0);
    assert!(model.get_had_good_score());
}

#[test]
fn weighted_constants_sum() {
    let mut model = model();
    let five = model.add_restraint(Constant::new("five", 5.0)).unwrap();
    let ten = model.add_restraint(Constant::new("ten", 10.0)).unwrap();
    model.set_weight(five, 2.0).unwrap();
    model.set_weight(ten, 3.0).unwrap();
    assert_eq!(model.get_maximum_score(five).unwrap(), NO_MAX);

    assert_eq!(model.evaluate(false).unwrap(), 40.0);
    assert_eq!(model.get_last_score(five).unwrap(), 5.0);
    assert_eq!(model.get_last_score(ten).unwrap(), 10.0);
    assert_eq!(model.last_score(), 40.0);
}

#[test]
fn exceeding_the_maximum_is_not_good() {
    let mut model = model();
    let r = model.add_restraint(Constant::new("over", 5.0)).unwrap();
    model.set_maximum_score(r, 1.0).unwrap();

    assert_eq!(model.evaluate_if_good(false).unwrap(), 5.0);
    assert!(!model.get_had_good_score());

    model.set_maximum_score(r, 5.0).unwrap();
    model.evaluate_if_good(false).unwrap();
    assert!(model.get_had_good_score());
}

#[test]
fn derivatives_flow_through_weights() {
    let mut model = model();
    let ps = particles(&mut model, 2);
    let r = model.add_restraint(Distance::new("d", ps[0], ps[1])).unwrap();
    model.set_weight(r, 4.0).unwrap();

    assert_eq!(model.evaluate(true).unwrap(), 4.0);
    let store = model.attributes();
    assert_eq!(store.get_derivative(FloatKey::X, ps[0]).unwrap(), -4.0);
    assert_eq!(store.get_derivative(FloatKey::X, ps[1]).unwrap(), 4.0);
}

#[test]
fn nested_sets_multiply_weights() {
    let mut model = model();
    let ps = particles(&mut model, 3);
    let near = model.register_restraint(Distance::new("near", ps[0], ps[1])).unwrap();
    let far = model.register_restraint(Distance::new("far", ps[0], ps[2])).unwrap();
    let inner = model.add_restraint_set("inner", &[near, far]).unwrap();
    let outer = model.add_restraint_set("outer", &[inner]).unwrap();
    model.set_weight(inner, 2.0).unwrap();
    model.set_weight(outer, 10.0).unwrap();

    // 10 * 2 * (1 + 2)
    assert_eq!(model.evaluate(true).unwrap(), 60.0);
    assert_eq!(model.get_last_score(inner).unwrap(), 3.0);
    assert_eq!(model.get_last_score(outer).unwrap(), 6.0);
    assert_eq!(
        model.attributes().get_derivative(FloatKey::X, ps[0]).unwrap(),
        -40.0
    );
}

#[test]
fn set_maximum_applies_to_the_unweighted_sum() {
    let mut model = model();
    let a = model.register_restraint(Constant::new("a", 2.0)).unwrap();
    let b = model.register_restraint(Constant::new("b", 2.0)).unwrap();
    let set = model.add_restraint_set("pair", &[a, b]).unwrap();
    model.set_maximum_score(set, 3.0).unwrap();

    assert_eq!(model.evaluate(false).unwrap(), 4.0);
    assert!(!model.get_had_good_score());
}

// =============================================================================
// Scoring functions and single restraints
// =============================================================================

#[test]
fn scoring_function_evaluates_its_own_list() {
    let mut model = model();
    let a = model.add_restraint(Constant::new("a", 1.0)).unwrap();
    let b = model.register_restraint(Constant::new("b", 2.0)).unwrap();
    let sf = model.add_scoring_function("sf", &[b]).unwrap();
    model.set_weight(sf, 3.0).unwrap();

    assert_eq!(
        model
            .evaluate_scoring_function(sf, false, EvaluationMode::Full)
            .unwrap(),
        6.0
    );
    assert!(model.had_good_score(sf).unwrap());
    assert_eq!(model.evaluate(false).unwrap(), 1.0);
    assert_eq!(model.get_last_score(a).unwrap(), 1.0);
    assert!(model.had_good_score(a).is_err());
}

#[test]
fn evaluate_restraint_applies_its_weight() {
    let mut model = model();
    let r = model.add_restraint(Constant::new("r", 2.5)).unwrap();
    model.set_weight(r, 2.0).unwrap();
    assert_eq!(model.evaluate_restraint(r, false).unwrap(), 5.0);
    assert_eq!(model.age(), 1);
}

#[test]
fn evaluate_restraint_rejects_other_kinds() {
    let mut model = model();
    let r = model.register_restraint(Constant::new("r", 1.0)).unwrap();
    let sf = model.add_scoring_function("sf", &[r]).unwrap();
    assert!(matches!(
        model.evaluate_restraint(sf, false).unwrap_err().kind,
        ErrorKind::UnknownObject(_)
    ));
}

// =============================================================================
// Failures and staging
// =============================================================================

#[test]
fn failing_restraint_leaves_model_usable() {
    let mut model = model();
    let broken = model.add_restraint(Arc::new(Broken)).unwrap();
    model.add_restraint(Constant::new("fine", 1.0)).unwrap();

    let err = model.evaluate(false).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::EvaluationFailed { .. }));
    assert!(err.to_string().contains("in restraint broken"));
    assert_eq!(model.attributes().stage(), EvaluationStage::Idle);

    model.remove_object(broken).unwrap();
    assert_eq!(model.evaluate(false).unwrap(), 1.0);
}

#[test]
fn structural_changes_are_rejected_mid_evaluation() {
    let mut model = model();
    let p = model.add_particle().unwrap();
    let cell = Arc::clone(model.attributes().stage_cell());
    let guard = cell.begin(EvaluationStage::Evaluating).unwrap();

    for err in [
        model.add_particle().unwrap_err(),
        model.remove_particle(p).unwrap_err(),
        model.attributes_mut().add(FloatKey::X, p, 1.0).unwrap_err(),
        model.add_restraint(Constant::new("late", 1.0)).unwrap_err(),
        model.evaluate(false).unwrap_err(),
    ] {
        assert!(
            matches!(err.kind, ErrorKind::InvalidState { stage: "evaluating", .. }),
            "{err}"
        );
    }

    // Cache attributes are allowed at any stage.
    model.attributes_mut().add_cache(FloatKey::Y, p, 0.0).unwrap();

    drop(guard);
    assert!(model.add_particle().is_ok());
}

#[test]
fn caches_are_cleared_before_each_evaluation() {
    let mut model = model();
    let p = model.add_particle().unwrap();
    model.attributes_mut().add_cache(FloatKey::Y, p, 1.0).unwrap();
    model.evaluate(false).unwrap();
    assert!(!model.attributes().has(FloatKey::Y, p));
}
