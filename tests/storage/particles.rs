//! Integration tests for particle allocation and index reuse

use scoregraph_foundation::{
    ErrorKind, FloatKey, Int, IntKey, KeyRegistry, ParticleIndex, ParticleRef, Text,
};
use scoregraph_storage::AttributeStore;

fn store() -> AttributeStore {
    AttributeStore::new(KeyRegistry::shared())
}

#[test]
fn indices_are_dense() {
    let mut store = store();
    let ps: Vec<_> = (0..4).map(|_| store.add_particle().unwrap()).collect();
    assert_eq!(
        ps,
        (0..4).map(ParticleIndex::new).collect::<Vec<_>>()
    );
    assert_eq!(store.particle_count(), 4);
    assert_eq!(store.particle_capacity(), 4);
}

#[test]
fn released_index_is_reused_without_stale_data() {
    let mut store = store();
    let charge: IntKey = store.registry().key("charge").unwrap();
    let label = store.registry().key::<Text>("label").unwrap();
    let partner = store.registry().key::<ParticleRef>("partner").unwrap();

    let a = store.add_particle().unwrap();
    let b = store.add_particle().unwrap();
    store.add_optimized(FloatKey::X, a, 3.0).unwrap();
    store.add(charge, a, -1).unwrap();
    store.add(label, a, "old".to_string()).unwrap();
    store.add(partner, a, b).unwrap();

    store.remove_particle(a).unwrap();
    assert!(!store.is_live(a));
    let again = store.add_particle().unwrap();
    assert_eq!(again, a);

    assert!(!store.has(FloatKey::X, again));
    assert!(!store.has(charge, again));
    assert!(!store.has(label, again));
    assert!(!store.has(partner, again));
    assert!(!store.is_optimized(FloatKey::X, again));
    assert!(store.keys_of::<Int>(again).is_empty());
    assert_eq!(store.particle_name(again).unwrap(), "P0");
}

#[test]
fn double_release_is_fatal() {
    let mut store = store();
    let p = store.add_particle().unwrap();
    store.remove_particle(p).unwrap();
    let err = store.remove_particle(p).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err.kind, ErrorKind::Internal(_)));
}

#[test]
fn attributes_require_live_particles() {
    let mut store = store();
    let err = store.add(FloatKey::X, ParticleIndex::new(5), 1.0).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownParticle(_)));
}

#[test]
fn names_follow_particles() {
    let mut store = store();
    let p = store.add_named_particle("anchor").unwrap();
    assert_eq!(store.particle_name(p).unwrap(), "anchor");
    store.set_particle_name(p, "pivot").unwrap();
    assert_eq!(store.particle_name(p).unwrap(), "pivot");
    assert_eq!(store.live_particles(), vec![p]);
}
