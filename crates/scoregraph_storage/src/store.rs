//! The attribute store: every table of a model plus its particles.
//!
//! `AttributeStore` is what a model owns. Its API is generic over the
//! attribute kind through [`StoredAttribute`], so `store.get(key, p)` works the
//! same for floats, strings or particle lists.

use std::sync::Arc;

use scoregraph_foundation::{
    Attribute, Float, FloatKey, FloatList, FloatRange, Int, IntList, Key, KeyRegistry, Object,
    ParticleIndex, ParticleRef, ParticleRefList, Result, Text,
};

use crate::derivative::DerivativeAccumulator;
use crate::float::FloatAttributeTable;
use crate::particle::ParticleIndexSpace;
use crate::stage::{EvaluationStage, StageCell};
use crate::table::{AttributeTable, Table};

/// One table per attribute kind.
#[derive(Debug)]
pub struct Tables {
    floats: FloatAttributeTable,
    ints: AttributeTable<Int>,
    strings: AttributeTable<Text>,
    objects: AttributeTable<Object>,
    particle_refs: AttributeTable<ParticleRef>,
    float_lists: AttributeTable<FloatList>,
    int_lists: AttributeTable<IntList>,
    particle_lists: AttributeTable<ParticleRefList>,
}

impl Tables {
    fn new(registry: &Arc<KeyRegistry>) -> Self {
        Self {
            floats: FloatAttributeTable::new(Arc::clone(registry)),
            ints: AttributeTable::new(Arc::clone(registry)),
            strings: AttributeTable::new(Arc::clone(registry)),
            objects: AttributeTable::new(Arc::clone(registry)),
            particle_refs: AttributeTable::new(Arc::clone(registry)),
            float_lists: AttributeTable::new(Arc::clone(registry)),
            int_lists: AttributeTable::new(Arc::clone(registry)),
            particle_lists: AttributeTable::new(Arc::clone(registry)),
        }
    }

    fn for_each(&mut self, mut f: impl FnMut(&mut dyn TableOps)) {
        f(&mut self.floats);
        f(&mut self.ints);
        f(&mut self.strings);
        f(&mut self.objects);
        f(&mut self.particle_refs);
        f(&mut self.float_lists);
        f(&mut self.int_lists);
        f(&mut self.particle_lists);
    }
}

/// Kind-erased bulk operations, so `Tables` can sweep every table.
trait TableOps {
    fn clear_caches(&mut self, particle: ParticleIndex);
    fn clear_all_caches(&mut self);
    fn clear_particle(&mut self, particle: ParticleIndex);
}

impl TableOps for FloatAttributeTable {
    fn clear_caches(&mut self, particle: ParticleIndex) {
        Table::clear_caches(self, particle);
    }
    fn clear_all_caches(&mut self) {
        Table::clear_all_caches(self);
    }
    fn clear_particle(&mut self, particle: ParticleIndex) {
        Table::clear_particle(self, particle);
    }
}

impl<A: Attribute> TableOps for AttributeTable<A> {
    fn clear_caches(&mut self, particle: ParticleIndex) {
        Table::clear_caches(self, particle);
    }
    fn clear_all_caches(&mut self) {
        Table::clear_all_caches(self);
    }
    fn clear_particle(&mut self, particle: ParticleIndex) {
        Table::clear_particle(self, particle);
    }
}

/// Attribute kinds that have a table in [`Tables`].
pub trait StoredAttribute: Attribute + Sized {
    /// The table type holding this kind.
    type Table: Table<Self> + Send + Sync;

    /// Selects this kind's table.
    fn table(tables: &Tables) -> &Self::Table;

    /// Selects this kind's table mutably.
    fn table_mut(tables: &mut Tables) -> &mut Self::Table;
}

macro_rules! stored_attribute {
    ($kind:ty, $table:ty, $field:ident) => {
        impl StoredAttribute for $kind {
            type Table = $table;

            fn table(tables: &Tables) -> &$table {
                &tables.$field
            }

            fn table_mut(tables: &mut Tables) -> &mut $table {
                &mut tables.$field
            }
        }
    };
}

stored_attribute!(Float, FloatAttributeTable, floats);
stored_attribute!(Int, AttributeTable<Int>, ints);
stored_attribute!(Text, AttributeTable<Text>, strings);
stored_attribute!(Object, AttributeTable<Object>, objects);
stored_attribute!(ParticleRef, AttributeTable<ParticleRef>, particle_refs);
stored_attribute!(FloatList, AttributeTable<FloatList>, float_lists);
stored_attribute!(IntList, AttributeTable<IntList>, int_lists);
stored_attribute!(ParticleRefList, AttributeTable<ParticleRefList>, particle_lists);

/// All attribute tables of one model, its particle index space and its stage.
#[derive(Debug)]
pub struct AttributeStore {
    registry: Arc<KeyRegistry>,
    particles: ParticleIndexSpace,
    tables: Tables,
    stage: Arc<StageCell>,
}

impl AttributeStore {
    /// Creates an empty store whose keys come from `registry`.
    #[must_use]
    pub fn new(registry: Arc<KeyRegistry>) -> Self {
        Self {
            tables: Tables::new(&registry),
            registry,
            particles: ParticleIndexSpace::new(),
            stage: Arc::new(StageCell::new()),
        }
    }

    /// The key registry shared with this store.
    #[must_use]
    pub fn registry(&self) -> &Arc<KeyRegistry> {
        &self.registry
    }

    /// The current evaluation stage.
    #[must_use]
    pub fn stage(&self) -> EvaluationStage {
        self.stage.get()
    }

    /// The stage cell, for starting an evaluation.
    #[must_use]
    pub fn stage_cell(&self) -> &Arc<StageCell> {
        &self.stage
    }

    // =========================================================================
    // Particles
    // =========================================================================

    /// Creates a particle named `"P{index}"`.
    ///
    /// # Errors
    ///
    /// `InvalidState` during evaluation; `Internal` if the index space is exhausted.
    pub fn add_particle(&mut self) -> Result<ParticleIndex> {
        self.stage.ensure_idle("add a particle")?;
        self.particles.allocate()
    }

    /// Creates a named particle.
    ///
    /// # Errors
    ///
    /// As [`AttributeStore::add_particle`].
    pub fn add_named_particle(&mut self, name: impl Into<String>) -> Result<ParticleIndex> {
        self.stage.ensure_idle("add a particle")?;
        self.particles.allocate_named(name)
    }

    /// Removes a particle, clearing every attribute it carried.
    ///
    /// # Errors
    ///
    /// `InvalidState` during evaluation; `Internal` if the particle is not live.
    pub fn remove_particle(&mut self, particle: ParticleIndex) -> Result<()> {
        self.stage.ensure_idle("remove a particle")?;
        self.particles.release(particle)?;
        self.tables.for_each(|t| t.clear_particle(particle));
        Ok(())
    }

    /// Returns true if the particle is live.
    #[must_use]
    pub fn is_live(&self, particle: ParticleIndex) -> bool {
        self.particles.is_live(particle)
    }

    /// Number of live particles.
    #[must_use]
    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    /// One past the largest particle index ever allocated.
    #[must_use]
    pub fn particle_capacity(&self) -> usize {
        self.particles.capacity()
    }

    /// Live particles in index order.
    #[must_use]
    pub fn live_particles(&self) -> Vec<ParticleIndex> {
        self.particles.iter().collect()
    }

    /// Name of a live particle.
    ///
    /// # Errors
    ///
    /// `UnknownParticle` if not live.
    pub fn particle_name(&self, particle: ParticleIndex) -> Result<&str> {
        self.particles.name(particle)
    }

    /// Renames a live particle.
    ///
    /// # Errors
    ///
    /// `UnknownParticle` if not live.
    pub fn set_particle_name(
        &mut self,
        particle: ParticleIndex,
        name: impl Into<String>,
    ) -> Result<()> {
        self.particles.set_name(particle, name)
    }

    // =========================================================================
    // Generic attribute API
    // =========================================================================

    /// Adds an attribute to a live particle.
    ///
    /// # Errors
    ///
    /// `InvalidState` during evaluation, `UnknownParticle`, `InvalidValue` or
    /// `DuplicateAttribute`.
    pub fn add<A: StoredAttribute>(
        &mut self,
        key: Key<A>,
        particle: ParticleIndex,
        value: A::Value,
    ) -> Result<()> {
        self.stage.ensure_idle("add an attribute")?;
        self.particles.validate(particle)?;
        A::table_mut(&mut self.tables).add(key, particle, value)
    }

    /// Adds a cache attribute. Allowed at any stage.
    ///
    /// # Errors
    ///
    /// `UnknownParticle`, `InvalidValue` or `DuplicateAttribute`.
    pub fn add_cache<A: StoredAttribute>(
        &mut self,
        key: Key<A>,
        particle: ParticleIndex,
        value: A::Value,
    ) -> Result<()> {
        self.particles.validate(particle)?;
        A::table_mut(&mut self.tables).add_cache(key, particle, value)
    }

    /// Removes an attribute.
    ///
    /// # Errors
    ///
    /// `InvalidState` during evaluation or `MissingAttribute`.
    pub fn remove<A: StoredAttribute>(&mut self, key: Key<A>, particle: ParticleIndex) -> Result<()> {
        self.stage.ensure_idle("remove an attribute")?;
        A::table_mut(&mut self.tables).remove(key, particle)
    }

    /// Returns true if the attribute is present.
    #[must_use]
    pub fn has<A: StoredAttribute>(&self, key: Key<A>, particle: ParticleIndex) -> bool {
        A::table(&self.tables).has(key, particle)
    }

    /// Reads an attribute.
    ///
    /// # Errors
    ///
    /// `MissingAttribute` if absent.
    pub fn get<A: StoredAttribute>(&self, key: Key<A>, particle: ParticleIndex) -> Result<A::Value> {
        A::table(&self.tables).get(key, particle)
    }

    /// Reads the stored cell without checking presence.
    ///
    /// An absent attribute reads as the kind's sentinel.
    #[must_use]
    pub fn get_raw<A: StoredAttribute>(&self, key: Key<A>, particle: ParticleIndex) -> A::Value {
        A::table(&self.tables).get_raw(key, particle)
    }

    /// Overwrites a present attribute. Allowed at any stage.
    ///
    /// # Errors
    ///
    /// `InvalidValue` or `MissingAttribute`.
    pub fn set<A: StoredAttribute>(
        &mut self,
        key: Key<A>,
        particle: ParticleIndex,
        value: A::Value,
    ) -> Result<()> {
        A::table_mut(&mut self.tables).set(key, particle, value)
    }

    /// Keys of kind `A` present on a particle.
    #[must_use]
    pub fn keys_of<A: StoredAttribute>(&self, particle: ParticleIndex) -> Vec<Key<A>> {
        A::table(&self.tables).keys_of(particle)
    }

    /// Particles carrying an attribute.
    #[must_use]
    pub fn particles_with<A: StoredAttribute>(&self, key: Key<A>) -> Vec<ParticleIndex> {
        A::table(&self.tables).particles_with(key)
    }

    /// Resets every cache attribute of one particle.
    pub fn clear_caches(&mut self, particle: ParticleIndex) {
        self.tables.for_each(|t| t.clear_caches(particle));
    }

    /// Resets every cache attribute of every particle.
    pub fn clear_all_caches(&mut self) {
        self.tables.for_each(|t| t.clear_all_caches());
    }

    // =========================================================================
    // Float extras
    // =========================================================================

    /// The float table, for float-only operations.
    #[must_use]
    pub fn floats(&self) -> &FloatAttributeTable {
        &self.tables.floats
    }

    /// Adds a float attribute flagged as optimized.
    ///
    /// # Errors
    ///
    /// Same as [`AttributeStore::add`].
    pub fn add_optimized(&mut self, key: FloatKey, particle: ParticleIndex, value: f64) -> Result<()> {
        self.stage.ensure_idle("add an attribute")?;
        self.particles.validate(particle)?;
        self.tables.floats.add_float(key, particle, value, true)
    }

    /// Flags or unflags a float attribute as optimized.
    ///
    /// # Errors
    ///
    /// `MissingAttribute` if absent.
    pub fn set_optimized(
        &mut self,
        key: FloatKey,
        particle: ParticleIndex,
        optimized: bool,
    ) -> Result<()> {
        self.tables.floats.set_optimized(key, particle, optimized)
    }

    /// Returns true if a float attribute is flagged as optimized.
    #[must_use]
    pub fn is_optimized(&self, key: FloatKey, particle: ParticleIndex) -> bool {
        self.tables.floats.is_optimized(key, particle)
    }

    /// Optimized float keys of a particle.
    #[must_use]
    pub fn optimized_attributes(&self, particle: ParticleIndex) -> Vec<FloatKey> {
        self.tables.floats.optimized_attributes(particle)
    }

    /// Reads a derivative.
    ///
    /// # Errors
    ///
    /// `MissingAttribute` if the base attribute is absent.
    pub fn get_derivative(&self, key: FloatKey, particle: ParticleIndex) -> Result<f64> {
        self.tables.floats.get_derivative(key, particle)
    }

    /// Accumulates into a derivative through a shared reference.
    ///
    /// # Errors
    ///
    /// `MissingAttribute` if the base attribute is absent.
    pub fn add_to_derivative(
        &self,
        key: FloatKey,
        particle: ParticleIndex,
        delta: f64,
        accumulator: &DerivativeAccumulator,
    ) -> Result<()> {
        self.tables
            .floats
            .add_to_derivative(key, particle, delta, accumulator)
    }

    /// Zeroes every derivative.
    pub fn zero_derivatives(&mut self) {
        self.tables.floats.zero_derivatives();
    }

    /// Overrides the advisory range of a float key.
    pub fn set_range(&mut self, key: FloatKey, range: FloatRange) {
        self.tables.floats.set_range(key, range);
    }

    /// The advisory range of a float key, `None` if it was never added.
    #[must_use]
    pub fn get_range(&self, key: FloatKey) -> Option<FloatRange> {
        self.tables.floats.get_range(key)
    }
}
