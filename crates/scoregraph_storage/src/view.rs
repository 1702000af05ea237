//! Attribute access handed to score states and restraints during evaluation.
//!
//! Views wrap the store and, when checks are compiled in and masks are
//! supplied, reject accesses outside the object's declared inputs and outputs.
//! Without masks a view is a thin pass-through.

use scoregraph_foundation::{FloatKey, Key, ParticleIndex, Result};
#[cfg(feature = "checks")]
use scoregraph_foundation::{AccessKind, Attribute};

use crate::derivative::DerivativeAccumulator;
#[cfg(feature = "checks")]
use crate::masks::AccessMasks;
use crate::store::{AttributeStore, StoredAttribute};

#[cfg(feature = "checks")]
fn check<A: Attribute>(
    store: &AttributeStore,
    masks: Option<&AccessMasks>,
    access: AccessKind,
    key: Key<A>,
    particle: ParticleIndex,
) -> Result<()> {
    match masks {
        Some(masks) => masks.check(access, particle, || store.registry().label(key)),
        None => Ok(()),
    }
}

/// Read access plus derivative accumulation, shared between concurrent restraints.
#[derive(Debug, Clone, Copy)]
pub struct AttributeView<'a> {
    store: &'a AttributeStore,
    #[cfg(feature = "checks")]
    masks: Option<&'a AccessMasks>,
}

impl<'a> AttributeView<'a> {
    /// Creates an unchecked view.
    #[must_use]
    pub fn new(store: &'a AttributeStore) -> Self {
        Self {
            store,
            #[cfg(feature = "checks")]
            masks: None,
        }
    }

    /// Creates a view that enforces `masks` when given.
    #[cfg(feature = "checks")]
    #[must_use]
    pub fn checked(store: &'a AttributeStore, masks: Option<&'a AccessMasks>) -> Self {
        Self { store, masks }
    }

    /// Returns true if the attribute is present. Presence checks are never masked.
    #[must_use]
    pub fn has<A: StoredAttribute>(&self, key: Key<A>, particle: ParticleIndex) -> bool {
        self.store.has(key, particle)
    }

    /// Reads an attribute.
    ///
    /// # Errors
    ///
    /// `InputOutputViolation` if the particle is not readable, `MissingAttribute` if absent.
    pub fn get<A: StoredAttribute>(&self, key: Key<A>, particle: ParticleIndex) -> Result<A::Value> {
        #[cfg(feature = "checks")]
        check(self.store, self.masks, AccessKind::Get, key, particle)?;
        self.store.get(key, particle)
    }

    /// Reads a derivative.
    ///
    /// # Errors
    ///
    /// `InputOutputViolation` or `MissingAttribute`.
    pub fn get_derivative(&self, key: FloatKey, particle: ParticleIndex) -> Result<f64> {
        #[cfg(feature = "checks")]
        check(self.store, self.masks, AccessKind::ReadDerivative, key, particle)?;
        self.store.get_derivative(key, particle)
    }

    /// Accumulates into a derivative.
    ///
    /// # Errors
    ///
    /// `InputOutputViolation` or `MissingAttribute`.
    pub fn add_to_derivative(
        &self,
        key: FloatKey,
        particle: ParticleIndex,
        delta: f64,
        accumulator: &DerivativeAccumulator,
    ) -> Result<()> {
        #[cfg(feature = "checks")]
        check(self.store, self.masks, AccessKind::WriteDerivative, key, particle)?;
        self.store.add_to_derivative(key, particle, delta, accumulator)
    }

    /// Name of a particle, for messages.
    ///
    /// # Errors
    ///
    /// `UnknownParticle` if not live.
    pub fn particle_name(&self, particle: ParticleIndex) -> Result<&'a str> {
        self.store.particle_name(particle)
    }
}

/// Mutable access for score states.
#[derive(Debug)]
pub struct AttributeViewMut<'a> {
    store: &'a mut AttributeStore,
    #[cfg(feature = "checks")]
    masks: Option<&'a AccessMasks>,
}

impl<'a> AttributeViewMut<'a> {
    /// Creates an unchecked view.
    #[must_use]
    pub fn new(store: &'a mut AttributeStore) -> Self {
        Self {
            store,
            #[cfg(feature = "checks")]
            masks: None,
        }
    }

    /// Creates a view that enforces `masks` when given.
    #[cfg(feature = "checks")]
    #[must_use]
    pub fn checked(store: &'a mut AttributeStore, masks: Option<&'a AccessMasks>) -> Self {
        Self { store, masks }
    }

    /// Reborrows as a shared view with the same masks.
    #[must_use]
    pub fn as_view(&self) -> AttributeView<'_> {
        AttributeView {
            store: &*self.store,
            #[cfg(feature = "checks")]
            masks: self.masks,
        }
    }

    /// Returns true if the attribute is present.
    #[must_use]
    pub fn has<A: StoredAttribute>(&self, key: Key<A>, particle: ParticleIndex) -> bool {
        self.store.has(key, particle)
    }

    /// Reads an attribute.
    ///
    /// # Errors
    ///
    /// `InputOutputViolation` or `MissingAttribute`.
    pub fn get<A: StoredAttribute>(&self, key: Key<A>, particle: ParticleIndex) -> Result<A::Value> {
        self.as_view().get(key, particle)
    }

    /// Overwrites an attribute.
    ///
    /// # Errors
    ///
    /// `InputOutputViolation`, `InvalidValue` or `MissingAttribute`.
    pub fn set<A: StoredAttribute>(
        &mut self,
        key: Key<A>,
        particle: ParticleIndex,
        value: A::Value,
    ) -> Result<()> {
        #[cfg(feature = "checks")]
        check(self.store, self.masks, AccessKind::Set, key, particle)?;
        self.store.set(key, particle, value)
    }

    /// Adds a cache attribute.
    ///
    /// # Errors
    ///
    /// `InputOutputViolation`, `InvalidValue` or `DuplicateAttribute`.
    pub fn add_cache<A: StoredAttribute>(
        &mut self,
        key: Key<A>,
        particle: ParticleIndex,
        value: A::Value,
    ) -> Result<()> {
        #[cfg(feature = "checks")]
        check(self.store, self.masks, AccessKind::Add, key, particle)?;
        self.store.add_cache(key, particle, value)
    }

    /// Reads a derivative.
    ///
    /// # Errors
    ///
    /// `InputOutputViolation` or `MissingAttribute`.
    pub fn get_derivative(&self, key: FloatKey, particle: ParticleIndex) -> Result<f64> {
        self.as_view().get_derivative(key, particle)
    }

    /// Accumulates into a derivative.
    ///
    /// # Errors
    ///
    /// `InputOutputViolation` or `MissingAttribute`.
    pub fn add_to_derivative(
        &self,
        key: FloatKey,
        particle: ParticleIndex,
        delta: f64,
        accumulator: &DerivativeAccumulator,
    ) -> Result<()> {
        self.as_view()
            .add_to_derivative(key, particle, delta, accumulator)
    }
}
