//! Float attribute storage.
//!
//! The seven reserved float keys get contiguous per-particle storage: `x`, `y`,
//! `z` and `radius` form a sphere, and the three internal coordinates form a
//! second triple. Every other float key uses a generic column. Each float
//! attribute also owns a derivative cell and an "optimized" flag.

#![allow(clippy::cast_possible_truncation)]

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use scoregraph_foundation::{
    Error, Float, FloatKey, FloatRange, KeyRegistry, ParticleIndex, Result,
};

use crate::derivative::{AtomicF64, DerivativeAccumulator};
use crate::table::Table;

const INVALID: f64 = f64::INFINITY;
const SPHERE_WIDTH: usize = 4;
const RESERVED: usize = FloatKey::RESERVED_COUNT as usize;

/// Storage for float attributes, their derivatives and optimization flags.
#[derive(Debug)]
pub struct FloatAttributeTable {
    /// `[x, y, z, radius]` per particle.
    spheres: Vec<[f64; 4]>,
    /// `[local_x, local_y, local_z]` per particle.
    internal: Vec<[f64; 3]>,
    /// Columns for keys past the reserved ones, indexed by `key - 7`.
    columns: Vec<Vec<f64>>,
    /// Derivative cells, `[key][particle]`.
    derivatives: Vec<Vec<AtomicF64>>,
    /// Optimized flags, `[key][particle]`.
    optimized: Vec<Vec<bool>>,
    /// Keys ever added, with an explicit range if one was set.
    ranges: HashMap<FloatKey, Option<FloatRange>>,
    caches: BTreeSet<FloatKey>,
    registry: Arc<KeyRegistry>,
}

impl FloatAttributeTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new(registry: Arc<KeyRegistry>) -> Self {
        Self {
            spheres: Vec::new(),
            internal: Vec::new(),
            columns: Vec::new(),
            derivatives: Vec::new(),
            optimized: Vec::new(),
            ranges: HashMap::new(),
            caches: BTreeSet::new(),
            registry,
        }
    }

    fn label(&self, key: FloatKey) -> String {
        self.registry.label(key)
    }

    /// Raw cell, `INVALID` if the storage does not reach that far.
    fn value(&self, key: FloatKey, particle: ParticleIndex) -> f64 {
        let p = particle.slot();
        let k = key.slot();
        if key.is_sphere() {
            self.spheres.get(p).map_or(INVALID, |s| s[k])
        } else if key.is_internal() {
            self.internal.get(p).map_or(INVALID, |s| s[k - SPHERE_WIDTH])
        } else {
            self.columns
                .get(k - RESERVED)
                .and_then(|column| column.get(p))
                .copied()
                .unwrap_or(INVALID)
        }
    }

    fn value_mut(&mut self, key: FloatKey, particle: ParticleIndex) -> &mut f64 {
        let p = particle.slot();
        let k = key.slot();
        if key.is_sphere() {
            if self.spheres.len() <= p {
                self.spheres.resize(p + 1, [INVALID; 4]);
            }
            &mut self.spheres[p][k]
        } else if key.is_internal() {
            if self.internal.len() <= p {
                self.internal.resize(p + 1, [INVALID; 3]);
            }
            &mut self.internal[p][k - SPHERE_WIDTH]
        } else {
            let c = k - RESERVED;
            if self.columns.len() <= c {
                self.columns.resize_with(c + 1, Vec::new);
            }
            let column = &mut self.columns[c];
            if column.len() <= p {
                column.resize(p + 1, INVALID);
            }
            &mut column[p]
        }
    }

    fn derivative_cell(&self, key: FloatKey, particle: ParticleIndex) -> Option<&AtomicF64> {
        self.derivatives.get(key.slot())?.get(particle.slot())
    }

    fn derivative_cell_mut(&mut self, key: FloatKey, particle: ParticleIndex) -> &AtomicF64 {
        if self.derivatives.len() <= key.slot() {
            self.derivatives.resize_with(key.slot() + 1, Vec::new);
        }
        let column = &mut self.derivatives[key.slot()];
        if column.len() <= particle.slot() {
            column.resize_with(particle.slot() + 1, || AtomicF64::new(INVALID));
        }
        &column[particle.slot()]
    }

    fn optimized_mut(&mut self, key: FloatKey, particle: ParticleIndex) -> &mut bool {
        if self.optimized.len() <= key.slot() {
            self.optimized.resize_with(key.slot() + 1, Vec::new);
        }
        let column = &mut self.optimized[key.slot()];
        if column.len() <= particle.slot() {
            column.resize(particle.slot() + 1, false);
        }
        &mut column[particle.slot()]
    }

    /// Resets value, derivative and optimized flag of one cell.
    fn reset(&mut self, key: FloatKey, particle: ParticleIndex) {
        if self.value(key, particle) != INVALID {
            *self.value_mut(key, particle) = INVALID;
        }
        if let Some(cell) = self.derivative_cell(key, particle) {
            cell.store(INVALID);
        }
        if let Some(flag) = self
            .optimized
            .get_mut(key.slot())
            .and_then(|column| column.get_mut(particle.slot()))
        {
            *flag = false;
        }
    }

    /// Every key that has ever held a value, in key order.
    fn known_keys(&self) -> Vec<FloatKey> {
        let mut keys: Vec<FloatKey> = self.ranges.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Number of particle slots covered by `key`'s storage.
    fn column_len(&self, key: FloatKey) -> usize {
        if key.is_sphere() {
            self.spheres.len()
        } else if key.is_internal() {
            self.internal.len()
        } else {
            self.columns.get(key.slot() - RESERVED).map_or(0, Vec::len)
        }
    }

    /// Adds a float attribute, optionally flagged as optimized.
    ///
    /// The derivative cell starts at zero. The first addition of a key
    /// establishes its default (scanned) range.
    ///
    /// # Errors
    ///
    /// `InvalidValue` if `value` is `+inf`, `DuplicateAttribute` if already present.
    pub fn add_float(
        &mut self,
        key: FloatKey,
        particle: ParticleIndex,
        value: f64,
        optimized: bool,
    ) -> Result<()> {
        if value == INVALID {
            return Err(Error::invalid_value(self.label(key), particle));
        }
        if self.has(key, particle) {
            return Err(Error::duplicate_attribute(self.label(key), particle));
        }
        *self.value_mut(key, particle) = value;
        self.derivative_cell_mut(key, particle).store(0.0);
        *self.optimized_mut(key, particle) = optimized;
        self.ranges.entry(key).or_insert(None);
        Ok(())
    }

    /// Flags or unflags an attribute as optimized.
    ///
    /// # Errors
    ///
    /// `MissingAttribute` if the attribute is absent.
    pub fn set_optimized(
        &mut self,
        key: FloatKey,
        particle: ParticleIndex,
        optimized: bool,
    ) -> Result<()> {
        if !self.has(key, particle) {
            return Err(Error::missing_attribute(self.label(key), particle));
        }
        *self.optimized_mut(key, particle) = optimized;
        Ok(())
    }

    /// Returns true if the attribute is present and flagged as optimized.
    #[must_use]
    pub fn is_optimized(&self, key: FloatKey, particle: ParticleIndex) -> bool {
        self.has(key, particle)
            && self
                .optimized
                .get(key.slot())
                .and_then(|column| column.get(particle.slot()))
                .copied()
                .unwrap_or(false)
    }

    /// Optimized keys of a particle, in key order.
    #[must_use]
    pub fn optimized_attributes(&self, particle: ParticleIndex) -> Vec<FloatKey> {
        self.known_keys()
            .into_iter()
            .filter(|&key| self.is_optimized(key, particle))
            .collect()
    }

    /// Reads the accumulated derivative of an attribute.
    ///
    /// # Errors
    ///
    /// `MissingAttribute` if the base attribute is absent.
    pub fn get_derivative(&self, key: FloatKey, particle: ParticleIndex) -> Result<f64> {
        match self.derivative_cell(key, particle) {
            Some(cell) if self.has(key, particle) => Ok(cell.load()),
            _ => Err(Error::missing_attribute(self.label(key), particle)),
        }
    }

    /// Adds `accumulator.apply(delta)` to the derivative of an attribute.
    ///
    /// Safe to call concurrently through a shared reference.
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
        match self.derivative_cell(key, particle) {
            Some(cell) if self.has(key, particle) => {
                cell.fetch_add(accumulator.apply(delta));
                Ok(())
            }
            _ => Err(Error::missing_attribute(self.label(key), particle)),
        }
    }

    /// Sets the derivative of every present attribute to zero.
    pub fn zero_derivatives(&mut self) {
        for key in self.known_keys() {
            let Some(column) = self.derivatives.get(key.slot()) else {
                continue;
            };
            for (slot, cell) in column.iter().enumerate() {
                if self.value(key, ParticleIndex::new(slot as u32)) != INVALID {
                    cell.store(0.0);
                }
            }
        }
    }

    /// Overrides the advisory range of a key.
    pub fn set_range(&mut self, key: FloatKey, range: FloatRange) {
        self.ranges.insert(key, Some(range));
    }

    /// Returns the advisory range of a key.
    ///
    /// An explicit range wins; otherwise the column is scanned on every call.
    /// Keys that were never added have no range. A key whose column is
    /// currently empty reports [`FloatRange::UNBOUNDED`].
    #[must_use]
    pub fn get_range(&self, key: FloatKey) -> Option<FloatRange> {
        match self.ranges.get(&key)? {
            Some(range) => Some(*range),
            None => Some(
                FloatRange::spanning(
                    (0..self.column_len(key))
                        .map(|slot| self.value(key, ParticleIndex::new(slot as u32)))
                        .filter(|v| *v != INVALID),
                )
                .unwrap_or(FloatRange::UNBOUNDED),
            ),
        }
    }

    /// Reads `[x, y, z]` of a particle.
    ///
    /// # Errors
    ///
    /// `MissingAttribute` naming the first absent coordinate.
    pub fn get_coordinates(&self, particle: ParticleIndex) -> Result<[f64; 3]> {
        let mut xyz = [0.0; 3];
        for (i, key) in [FloatKey::X, FloatKey::Y, FloatKey::Z].into_iter().enumerate() {
            xyz[i] = self.get(key, particle)?;
        }
        Ok(xyz)
    }
}

impl Table<Float> for FloatAttributeTable {
    fn add(&mut self, key: FloatKey, particle: ParticleIndex, value: f64) -> Result<()> {
        self.add_float(key, particle, value, false)
    }

    fn add_cache(&mut self, key: FloatKey, particle: ParticleIndex, value: f64) -> Result<()> {
        self.add_float(key, particle, value, false)?;
        self.caches.insert(key);
        Ok(())
    }

    fn remove(&mut self, key: FloatKey, particle: ParticleIndex) -> Result<()> {
        if !self.has(key, particle) {
            return Err(Error::missing_attribute(self.label(key), particle));
        }
        self.reset(key, particle);
        Ok(())
    }

    fn has(&self, key: FloatKey, particle: ParticleIndex) -> bool {
        self.value(key, particle) != INVALID
    }

    fn get(&self, key: FloatKey, particle: ParticleIndex) -> Result<f64> {
        let value = self.value(key, particle);
        if value == INVALID {
            Err(Error::missing_attribute(self.label(key), particle))
        } else {
            Ok(value)
        }
    }

    fn get_raw(&self, key: FloatKey, particle: ParticleIndex) -> f64 {
        self.value(key, particle)
    }

    fn set(&mut self, key: FloatKey, particle: ParticleIndex, value: f64) -> Result<()> {
        if value == INVALID {
            return Err(Error::invalid_value(self.label(key), particle));
        }
        if !self.has(key, particle) {
            return Err(Error::missing_attribute(self.label(key), particle));
        }
        *self.value_mut(key, particle) = value;
        Ok(())
    }

    fn clear_caches(&mut self, particle: ParticleIndex) {
        let keys: Vec<FloatKey> = self.caches.iter().copied().collect();
        for key in keys {
            self.reset(key, particle);
        }
    }

    fn clear_all_caches(&mut self) {
        let keys: Vec<FloatKey> = self.caches.iter().copied().collect();
        for key in keys {
            for slot in 0..self.column_len(key) {
                self.reset(key, ParticleIndex::new(slot as u32));
            }
        }
    }

    fn clear_particle(&mut self, particle: ParticleIndex) {
        for key in self.known_keys() {
            self.reset(key, particle);
        }
    }

    fn keys_of(&self, particle: ParticleIndex) -> Vec<FloatKey> {
        self.known_keys()
            .into_iter()
            .filter(|&key| self.has(key, particle))
            .collect()
    }

    fn particles_with(&self, key: FloatKey) -> Vec<ParticleIndex> {
        (0..self.column_len(key))
            .map(|slot| ParticleIndex::new(slot as u32))
            .filter(|&p| self.has(key, p))
            .collect()
    }

    fn is_cache_key(&self, key: FloatKey) -> bool {
        self.caches.contains(&key)
    }
}
