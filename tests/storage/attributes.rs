//! Integration tests for the attribute store
//!
//! Covers the add/get/set/remove contract for every attribute kind, sentinel
//! rejection, cache attributes, derivatives and ranges.

use scoregraph_foundation::{
    ErrorKind, Float, FloatKey, FloatList, FloatRange, Int, IntList, Key, KeyRegistry, Object,
    ObjectRef, ParticleIndex, ParticleRef, ParticleRefList, Text,
};
use scoregraph_storage::{AttributeStore, DerivativeAccumulator, StoredAttribute};

fn setup() -> (AttributeStore, ParticleIndex, ParticleIndex) {
    let mut store = AttributeStore::new(KeyRegistry::shared());
    let a = store.add_particle().unwrap();
    let b = store.add_particle().unwrap();
    (store, a, b)
}

/// Add, read back, overwrite and remove one attribute.
fn round_trip<A: StoredAttribute>(
    store: &mut AttributeStore,
    key: Key<A>,
    p: ParticleIndex,
    first: A::Value,
    second: A::Value,
) {
    assert!(!store.has(key, p));
    store.add(key, p, first.clone()).unwrap();
    assert!(store.has(key, p));
    assert_eq!(store.get(key, p).unwrap(), first);
    assert!(matches!(
        store.add(key, p, second.clone()).unwrap_err().kind,
        ErrorKind::DuplicateAttribute { .. }
    ));

    store.set(key, p, second.clone()).unwrap();
    assert_eq!(store.get(key, p).unwrap(), second);

    store.remove(key, p).unwrap();
    assert!(!store.has(key, p));
    assert!(matches!(
        store.get(key, p).unwrap_err().kind,
        ErrorKind::MissingAttribute { .. }
    ));
    assert!(matches!(
        store.remove(key, p).unwrap_err().kind,
        ErrorKind::MissingAttribute { .. }
    ));
    assert!(store.set(key, p, first).is_err());
}

/// Both add and set refuse the kind's sentinel.
fn rejects_sentinel<A: StoredAttribute>(store: &mut AttributeStore, key: Key<A>, p: ParticleIndex, valid: A::Value) {
    assert!(matches!(
        store.add(key, p, A::invalid()).unwrap_err().kind,
        ErrorKind::InvalidValue { .. }
    ));
    store.add(key, p, valid).unwrap();
    assert!(matches!(
        store.set(key, p, A::invalid()).unwrap_err().kind,
        ErrorKind::InvalidValue { .. }
    ));
    store.remove(key, p).unwrap();
}

// =============================================================================
// Round trips
// =============================================================================

#[test]
fn round_trip_every_kind() {
    let (mut store, a, b) = setup();
    let registry = store.registry().clone();

    round_trip(&mut store, FloatKey::X, a, 1.5, -2.0);
    round_trip(&mut store, registry.key::<Float>("mass").unwrap(), a, 12.0, 14.0);
    round_trip(&mut store, registry.key::<Int>("charge").unwrap(), a, -1, 2);
    round_trip(
        &mut store,
        registry.key::<Text>("element").unwrap(),
        a,
        "C".to_string(),
        "N".to_string(),
    );
    let handle = ObjectRef::new(vec![1_u8, 2, 3]);
    round_trip(
        &mut store,
        registry.key::<Object>("payload").unwrap(),
        a,
        Some(handle.clone()),
        Some(ObjectRef::new(0_u32)),
    );
    round_trip(&mut store, registry.key::<ParticleRef>("bonded").unwrap(), a, b, a);
    round_trip(
        &mut store,
        registry.key::<FloatList>("charges").unwrap(),
        a,
        vec![0.1, 0.2],
        vec![0.3],
    );
    round_trip(&mut store, registry.key::<IntList>("ids").unwrap(), a, vec![1, 2], vec![3]);
    round_trip(
        &mut store,
        registry.key::<ParticleRefList>("neighbors").unwrap(),
        a,
        vec![b],
        vec![a, b],
    );
}

#[test]
fn object_handles_downcast() {
    let (mut store, a, _) = setup();
    let key = store.registry().key::<Object>("payload").unwrap();
    store.add(key, a, Some(ObjectRef::new(String::from("data")))).unwrap();
    let handle = store.get(key, a).unwrap().unwrap();
    assert_eq!(handle.downcast_ref::<String>().unwrap(), "data");
    assert!(handle.downcast_ref::<u32>().is_none());
}

// =============================================================================
// Sentinels
// =============================================================================

#[test]
fn sentinels_are_rejected_for_every_kind() {
    let (mut store, a, b) = setup();
    let registry = store.registry().clone();

    rejects_sentinel(&mut store, FloatKey::Y, a, 0.0);
    rejects_sentinel(&mut store, registry.key::<Float>("energy").unwrap(), a, 0.0);
    rejects_sentinel(&mut store, registry.key::<Int>("charge").unwrap(), a, 0);
    rejects_sentinel(&mut store, registry.key::<Text>("name").unwrap(), a, String::new());
    rejects_sentinel(
        &mut store,
        registry.key::<Object>("payload").unwrap(),
        a,
        Some(ObjectRef::new(1_i32)),
    );
    rejects_sentinel(&mut store, registry.key::<ParticleRef>("partner").unwrap(), a, b);
    rejects_sentinel(&mut store, registry.key::<FloatList>("xs").unwrap(), a, vec![1.0]);
    rejects_sentinel(&mut store, registry.key::<IntList>("ns").unwrap(), a, vec![1]);
    rejects_sentinel(&mut store, registry.key::<ParticleRefList>("ps").unwrap(), a, vec![b]);
}

#[test]
fn non_sentinel_special_floats_are_data() {
    let (mut store, a, b) = setup();
    store.add(FloatKey::Z, a, f64::NEG_INFINITY).unwrap();
    store.add(FloatKey::Z, b, f64::NAN).unwrap();
    assert_eq!(store.get(FloatKey::Z, a).unwrap(), f64::NEG_INFINITY);
    assert!(store.get(FloatKey::Z, b).unwrap().is_nan());
}

#[test]
fn raw_reads_return_the_sentinel_when_absent() {
    let (mut store, a, b) = setup();
    store.add(FloatKey::X, a, 4.0).unwrap();
    assert_eq!(store.get_raw(FloatKey::X, a), 4.0);
    assert_eq!(store.get_raw(FloatKey::X, b), f64::INFINITY);
    let charge = store.registry().key::<Int>("charge").unwrap();
    assert_eq!(store.get_raw(charge, ParticleIndex::new(1000)), i64::MAX);
}

// =============================================================================
// Caches
// =============================================================================

#[test]
fn caches_clear_per_particle_and_in_bulk() {
    let (mut store, a, b) = setup();
    let registry = store.registry().clone();
    let centroid = registry.key::<Float>("centroid").unwrap();
    let count = registry.key::<Int>("count").unwrap();
    let persistent = registry.key::<Int>("persistent").unwrap();

    store.add_cache(centroid, a, 1.0).unwrap();
    store.add_cache(centroid, b, 2.0).unwrap();
    store.add_cache(count, a, 3).unwrap();
    store.add(persistent, a, 4).unwrap();

    store.clear_caches(a);
    assert!(!store.has(centroid, a));
    assert!(!store.has(count, a));
    assert!(store.has(centroid, b));
    assert!(store.has(persistent, a));

    store.clear_all_caches();
    assert!(!store.has(centroid, b));
    assert!(store.has(persistent, a));

    // Cleared caches may be added again.
    store.add_cache(centroid, a, 5.0).unwrap();
    assert_eq!(store.get(centroid, a).unwrap(), 5.0);
}

// =============================================================================
// Derivatives, optimization flags and ranges
// =============================================================================

#[test]
fn derivatives_require_the_base_value() {
    let (mut store, a, b) = setup();
    store.add_optimized(FloatKey::X, a, 0.0).unwrap();
    let half = DerivativeAccumulator::new(0.5);

    store.add_to_derivative(FloatKey::X, a, 4.0, &half).unwrap();
    store.add_to_derivative(FloatKey::X, a, 2.0, &half).unwrap();
    assert_eq!(store.get_derivative(FloatKey::X, a).unwrap(), 3.0);

    let err = store.add_to_derivative(FloatKey::X, b, 1.0, &half).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MissingAttribute { .. }));

    store.zero_derivatives();
    assert_eq!(store.get_derivative(FloatKey::X, a).unwrap(), 0.0);

    store.remove(FloatKey::X, a).unwrap();
    assert!(store.get_derivative(FloatKey::X, a).is_err());
}

#[test]
fn optimized_flags() {
    let (mut store, a, _) = setup();
    store.add_optimized(FloatKey::X, a, 0.0).unwrap();
    store.add(FloatKey::Y, a, 0.0).unwrap();
    assert_eq!(store.optimized_attributes(a), vec![FloatKey::X]);

    store.set_optimized(FloatKey::Y, a, true).unwrap();
    store.set_optimized(FloatKey::X, a, false).unwrap();
    assert!(store.is_optimized(FloatKey::Y, a));
    assert!(!store.is_optimized(FloatKey::X, a));
    assert!(store.set_optimized(FloatKey::Z, a, true).is_err());
}

#[test]
fn ranges_are_scanned_unless_overridden() {
    let (mut store, a, b) = setup();
    let energy = store.registry().key::<Float>("energy").unwrap();
    assert_eq!(store.get_range(energy), None);

    store.add(energy, a, -2.0).unwrap();
    store.add(energy, b, 5.0).unwrap();
    assert_eq!(store.get_range(energy), Some(FloatRange::new(-2.0, 5.0)));

    store.set(energy, b, 1.0).unwrap();
    assert_eq!(store.get_range(energy), Some(FloatRange::new(-2.0, 1.0)));

    store.set_range(energy, FloatRange::new(-10.0, 10.0));
    store.set(energy, b, 50.0).unwrap();
    assert_eq!(store.get_range(energy), Some(FloatRange::new(-10.0, 10.0)));
}

#[test]
fn enumeration_for_io() {
    let (mut store, a, b) = setup();
    let charge = store.registry().key::<Int>("charge").unwrap();
    let tag = store.registry().key::<Int>("tag").unwrap();
    store.add(charge, a, 1).unwrap();
    store.add(charge, b, -1).unwrap();
    store.add(tag, b, 9).unwrap();

    assert_eq!(store.particles_with(charge), vec![a, b]);
    assert_eq!(store.keys_of::<Int>(b), vec![charge, tag]);
    assert_eq!(store.keys_of::<Int>(a), vec![charge]);
}
