//! Score states and restraints working together

use std::sync::Arc;

use scoregraph::engine::Model;
use scoregraph::foundation::{FloatKey, ParticleIndex};

use crate::support::{Centroid, Distance, Recorder, journal, model, particles};

/// Four members at x = 0..3 and a centroid particle that follows them.
fn centroid_model() -> (Model, Vec<ParticleIndex>, ParticleIndex) {
    let mut model = model();
    let members = particles(&mut model, 4);
    let target = model.add_named_particle("center").unwrap();
    model.attributes_mut().add(FloatKey::X, target, 0.0).unwrap();
    model
        .add_score_state(Arc::new(Centroid {
            members: members.clone(),
            target,
        }))
        .unwrap();
    (model, members, target)
}

#[test]
fn centroid_feeds_a_restraint() {
    let (mut model, members, target) = centroid_model();
    model
        .add_restraint(Distance::new("pull", target, members[0]))
        .unwrap();

    assert_eq!(model.evaluate(true).unwrap(), 1.5);
    let store = model.attributes();
    assert_eq!(store.get(FloatKey::X, target).unwrap(), 1.5);
    assert_eq!(store.get_derivative(FloatKey::X, target).unwrap(), 1.0);
    assert_eq!(store.get_derivative(FloatKey::X, members[0]).unwrap(), -0.75);
    for &m in &members[1..] {
        assert_eq!(store.get_derivative(FloatKey::X, m).unwrap(), 0.25);
    }
}

#[test]
fn derivatives_do_not_leak_between_evaluations() {
    let (mut model, members, target) = centroid_model();
    model
        .add_restraint(Distance::new("pull", target, members[0]))
        .unwrap();

    model.evaluate(true).unwrap();
    model.evaluate(true).unwrap();
    assert_eq!(
        model.attributes().get_derivative(FloatKey::X, members[0]).unwrap(),
        -0.75
    );

    // Without derivatives the previous values are left alone.
    model.evaluate(false).unwrap();
    assert_eq!(
        model.attributes().get_derivative(FloatKey::X, members[0]).unwrap(),
        -0.75
    );
}

#[test]
fn moving_a_member_moves_the_score() {
    let (mut model, members, target) = centroid_model();
    model
        .add_restraint(Distance::new("pull", target, members[0]))
        .unwrap();
    assert_eq!(model.evaluate(false).unwrap(), 1.5);

    model
        .attributes_mut()
        .set(FloatKey::X, members[3], 7.0)
        .unwrap();
    assert_eq!(model.evaluate(false).unwrap(), 2.5);
    assert_eq!(model.attributes().get(FloatKey::X, target).unwrap(), 2.5);
}

#[test]
fn unrelated_particles_come_and_go() {
    let (mut model, members, target) = centroid_model();
    let pull = model
        .add_restraint(Distance::new("pull", target, members[0]))
        .unwrap();
    let bystander = model.add_named_particle("bystander").unwrap();
    model
        .attributes_mut()
        .add(FloatKey::X, bystander, 100.0)
        .unwrap();
    assert_eq!(model.evaluate(false).unwrap(), 1.5);
    let age = model.age();

    model.remove_particle(bystander).unwrap();
    assert!(model.dependency_graph().is_none());
    assert_eq!(model.evaluate(false).unwrap(), 1.5);
    assert_eq!(model.age(), age + 1);
    assert_eq!(model.get_dependent_restraints(members[2]).unwrap(), [pull]);

    // Recycled indices start with no attributes.
    let newcomer = model.add_particle().unwrap();
    assert!(!model.attributes().has(FloatKey::X, newcomer));
}

#[test]
fn containers_group_particles_for_ordering() {
    let log = journal();
    let mut model = model();
    let ps = particles(&mut model, 3);
    let group = model
        .add_container(Recorder::new("group", Vec::new(), vec![ps[1].into(), ps[2].into()], &log))
        .unwrap();
    model
        .add_score_state(Recorder::new("fill", vec![ps[0].into()], vec![group.into()], &log))
        .unwrap();
    model
        .add_score_state(Recorder::new("idle", vec![ps[0].into()], Vec::new(), &log))
        .unwrap();
    model.add_restraint(Distance::new("d", ps[1], ps[2])).unwrap();

    assert_eq!(model.evaluate(true).unwrap(), 1.0);
    assert_eq!(*log.lock(), ["before fill", "after fill"]);
}
