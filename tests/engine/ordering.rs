//! Score-state ordering and the dependency graph

use std::sync::Arc;

use scoregraph_engine::{ModelNode, ObjectKind};
use scoregraph_foundation::ErrorKind;

use crate::support::{Broken, Constant, Distance, Recorder, journal, model, particles};

#[test]
fn prerequisites_run_first_and_finish_last() {
    let mut model = model();
    let ps = particles(&mut model, 4);
    let log = journal();

    // c reads what b writes, b reads what a writes; registered out of order.
    let c = model
        .add_score_state(Recorder::new("c", vec![ps[2].into()], vec![ps[3].into()], &log))
        .unwrap();
    let a = model
        .add_score_state(Recorder::new("a", vec![], vec![ps[1].into()], &log))
        .unwrap();
    let b = model
        .add_score_state(Recorder::new("b", vec![ps[1].into()], vec![ps[2].into()], &log))
        .unwrap();
    model.add_restraint(Distance::new("d", ps[0], ps[3])).unwrap();

    assert_eq!(model.get_update_order(a).unwrap(), 0);
    assert_eq!(model.get_update_order(b).unwrap(), 1);
    assert_eq!(model.get_update_order(c).unwrap(), 2);

    model.evaluate(false).unwrap();
    assert_eq!(
        *log.lock(),
        vec!["before a", "before b", "before c", "after c", "after b", "after a"]
    );
}

#[test]
fn only_required_states_run() {
    let mut model = model();
    let ps = particles(&mut model, 4);
    let log = journal();
    model
        .add_score_state(Recorder::new("used", vec![], vec![ps[0].into()], &log))
        .unwrap();
    model
        .add_score_state(Recorder::new("unused", vec![], vec![ps[2].into()], &log))
        .unwrap();
    let r = model.add_restraint(Distance::new("d", ps[0], ps[1])).unwrap();

    let required = model.get_required_score_states(&[r]).unwrap();
    assert_eq!(required.len(), 1);
    assert_eq!(model.object_name(required[0]).unwrap(), "used");

    model.evaluate(false).unwrap();
    assert_eq!(*log.lock(), vec!["before used", "after used"]);

    log.lock().clear();
    model.update().unwrap();
    assert_eq!(*log.lock(), vec!["before used", "before unused"]);
}

#[test]
fn states_feeding_a_set_are_required_by_it() {
    let mut model = model();
    let ps = particles(&mut model, 2);
    let log = journal();
    let state = model
        .add_score_state(Recorder::new("prep", vec![], vec![ps[1].into()], &log))
        .unwrap();
    let d = model.register_restraint(Distance::new("d", ps[0], ps[1])).unwrap();
    let set = model.add_restraint_set("all", &[d]).unwrap();

    assert_eq!(model.get_required_score_states(&[set]).unwrap(), vec![state]);
    let graph = model.ensure_dependencies().unwrap();
    assert!(graph.has_edge(ModelNode::Object(d), ModelNode::Object(set)));
    assert!(graph.has_edge(ModelNode::Object(state), ModelNode::Particle(ps[1])));
}

#[test]
fn score_state_may_read_another_directly() {
    let mut model = model();
    let ps = particles(&mut model, 2);
    let log = journal();
    let first = model
        .add_score_state(Recorder::new("first", vec![], vec![ps[0].into()], &log))
        .unwrap();
    let second = model
        .add_score_state(Recorder::new("second", vec![first.into()], vec![ps[1].into()], &log))
        .unwrap();
    assert_eq!(model.object_kind(second).unwrap(), ObjectKind::ScoreState);
    assert_eq!(model.get_update_order(second).unwrap(), 1);
}

#[test]
fn dependency_cycles_are_reported() {
    let mut model = model();
    let ps = particles(&mut model, 2);
    let log = journal();
    model
        .add_score_state(Recorder::new("ping", vec![ps[0].into()], vec![ps[1].into()], &log))
        .unwrap();
    model
        .add_score_state(Recorder::new("pong", vec![ps[1].into()], vec![ps[0].into()], &log))
        .unwrap();
    model.add_restraint(Distance::new("d", ps[0], ps[1])).unwrap();

    let err = model.evaluate(false).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err.kind, ErrorKind::DependencyCycle { .. }));
    assert!(err.to_string().contains("ping -> pong"));
    assert!(log.lock().is_empty());
}

#[test]
fn dependent_restraints_of_a_particle() {
    let mut model = model();
    let ps = particles(&mut model, 4);
    let log = journal();
    model
        .add_score_state(Recorder::new("mid", vec![ps[0].into()], vec![ps[1].into()], &log))
        .unwrap();
    let direct = model.add_restraint(Distance::new("direct", ps[0], ps[2])).unwrap();
    let derived = model.add_restraint(Distance::new("derived", ps[1], ps[2])).unwrap();
    model.add_restraint(Distance::new("other", ps[2], ps[3])).unwrap();

    assert_eq!(
        model.get_dependent_restraints(ps[0]).unwrap(),
        vec![direct, derived]
    );
    assert_eq!(model.get_dependent_restraints(ps[3]).unwrap().len(), 1);
}

#[test]
fn removing_a_particle_invalidates_the_graph() {
    let mut model = model();
    let ps = particles(&mut model, 2);
    model.ensure_dependencies().unwrap();
    assert!(model.dependency_graph().is_some());
    model.remove_particle(ps[1]).unwrap();
    assert!(model.dependency_graph().is_none());
    assert!(model.get_dependent_restraints(ps[1]).is_err());
}

#[test]
fn refining_state_waits_for_the_writer() {
    let mut model = model();
    let ps = particles(&mut model, 2);
    let log = journal();

    // refine both reads and writes ps[0]; produce only writes it.
    let refine = model
        .add_score_state(Recorder::new("refine", vec![ps[0].into()], vec![ps[0].into()], &log))
        .unwrap();
    let produce = model
        .add_score_state(Recorder::new("produce", vec![], vec![ps[0].into()], &log))
        .unwrap();
    model.add_restraint(Distance::new("d", ps[0], ps[1])).unwrap();

    assert_eq!(model.get_update_order(produce).unwrap(), 0);
    assert_eq!(model.get_update_order(refine).unwrap(), 1);

    model.evaluate(false).unwrap();
    assert_eq!(
        *log.lock(),
        vec!["before produce", "before refine", "after refine", "after produce"]
    );
}

#[test]
fn schedules_are_reused_until_the_graph_changes() {
    let mut model = model();
    let ps = particles(&mut model, 2);
    let log = journal();
    model
        .add_score_state(Recorder::new("s", vec![], vec![ps[0].into()], &log))
        .unwrap();
    let d = model.add_restraint(Distance::new("d", ps[0], ps[1])).unwrap();
    let other = model.register_restraint(Constant::new("other", 3.0)).unwrap();

    model.evaluate(false).unwrap();
    model.evaluate(false).unwrap();
    model.evaluate_restraint(d, false).unwrap();
    assert_eq!(model.dependency_graph().unwrap().cached_schedules(), 1);
    assert_eq!(log.lock().len(), 6);

    model.evaluate_restraint(other, false).unwrap();
    assert_eq!(model.dependency_graph().unwrap().cached_schedules(), 2);
    assert_eq!(log.lock().len(), 6);

    model.set_weight(d, 2.0).unwrap();
    assert!(model.dependency_graph().is_none());
    assert_eq!(model.evaluate(false).unwrap(), 2.0);
    assert_eq!(model.dependency_graph().unwrap().cached_schedules(), 1);
}

#[test]
fn a_failed_evaluation_keeps_the_top_level_list() {
    let mut model = model();
    let ok = model.add_restraint(Constant::new("ok", 1.0)).unwrap();
    let broken = model
        .add_restraint(Arc::new(Broken))
        .unwrap();

    assert!(model.evaluate(false).is_err());
    assert_eq!(model.top_level_restraints(), [ok, broken]);
}
