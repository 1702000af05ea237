//! Columnar attribute storage for one attribute kind.
//!
//! A table is a sparse matrix indexed `[key][particle]`. Absent cells hold the
//! kind's invalid sentinel, so presence is a single comparison.

// Key and particle slots come from u32 indices.
#![allow(clippy::cast_possible_truncation)]

use std::collections::BTreeSet;
use std::sync::Arc;

use scoregraph_foundation::{Attribute, Error, Key, KeyRegistry, ParticleIndex, Result};

/// Operations every attribute table supports.
///
/// Implemented by the generic [`AttributeTable`] and by the float table, which
/// lays out coordinates specially.
pub trait Table<A: Attribute> {
    /// Adds an attribute.
    ///
    /// # Errors
    ///
    /// `InvalidValue` if `value` is the sentinel, `DuplicateAttribute` if
    /// already present.
    fn add(&mut self, key: Key<A>, particle: ParticleIndex, value: A::Value) -> Result<()>;

    /// Adds an attribute and marks its key as a cache key.
    ///
    /// # Errors
    ///
    /// Same as [`Table::add`].
    fn add_cache(&mut self, key: Key<A>, particle: ParticleIndex, value: A::Value) -> Result<()>;

    /// Removes an attribute.
    ///
    /// # Errors
    ///
    /// `MissingAttribute` if absent.
    fn remove(&mut self, key: Key<A>, particle: ParticleIndex) -> Result<()>;

    /// Returns true if the attribute is present.
    fn has(&self, key: Key<A>, particle: ParticleIndex) -> bool;

    /// Reads an attribute.
    ///
    /// # Errors
    ///
    /// `MissingAttribute` if absent.
    fn get(&self, key: Key<A>, particle: ParticleIndex) -> Result<A::Value>;

    /// Reads the stored cell without a presence check; absent cells read as the sentinel.
    fn get_raw(&self, key: Key<A>, particle: ParticleIndex) -> A::Value;

    /// Overwrites a present attribute.
    ///
    /// # Errors
    ///
    /// `InvalidValue` if `value` is the sentinel, `MissingAttribute` if absent.
    fn set(&mut self, key: Key<A>, particle: ParticleIndex, value: A::Value) -> Result<()>;

    /// Resets every cache column for one particle.
    fn clear_caches(&mut self, particle: ParticleIndex);

    /// Resets every cache column for every particle.
    fn clear_all_caches(&mut self);

    /// Resets every column for one particle.
    fn clear_particle(&mut self, particle: ParticleIndex);

    /// Keys present on a particle, in key order.
    fn keys_of(&self, particle: ParticleIndex) -> Vec<Key<A>>;

    /// Particles carrying an attribute, in index order.
    fn particles_with(&self, key: Key<A>) -> Vec<ParticleIndex>;

    /// Returns true if `key` was ever added as a cache attribute.
    fn is_cache_key(&self, key: Key<A>) -> bool;
}

/// Generic column store for every kind except floats.
#[derive(Debug)]
pub struct AttributeTable<A: Attribute> {
    columns: Vec<Vec<A::Value>>,
    caches: BTreeSet<Key<A>>,
    registry: Arc<KeyRegistry>,
}

impl<A: Attribute> AttributeTable<A> {
    /// Creates an empty table. The registry is only used to name keys in errors.
    #[must_use]
    pub fn new(registry: Arc<KeyRegistry>) -> Self {
        Self {
            columns: Vec::new(),
            caches: BTreeSet::new(),
            registry,
        }
    }

    fn cell(&self, key: Key<A>, particle: ParticleIndex) -> Option<&A::Value> {
        self.columns
            .get(key.slot())?
            .get(particle.slot())
            .filter(|v| !A::is_invalid(v))
    }

    fn cell_mut(&mut self, key: Key<A>, particle: ParticleIndex) -> &mut A::Value {
        if self.columns.len() <= key.slot() {
            self.columns.resize_with(key.slot() + 1, Vec::new);
        }
        let column = &mut self.columns[key.slot()];
        if column.len() <= particle.slot() {
            column.resize_with(particle.slot() + 1, A::invalid);
        }
        &mut column[particle.slot()]
    }

    fn label(&self, key: Key<A>) -> String {
        self.registry.label(key)
    }

    /// Number of key columns allocated so far.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

impl<A: Attribute> Table<A> for AttributeTable<A> {
    fn add(&mut self, key: Key<A>, particle: ParticleIndex, value: A::Value) -> Result<()> {
        if A::is_invalid(&value) {
            return Err(Error::invalid_value(self.label(key), particle));
        }
        if self.has(key, particle) {
            return Err(Error::duplicate_attribute(self.label(key), particle));
        }
        *self.cell_mut(key, particle) = value;
        Ok(())
    }

    fn add_cache(&mut self, key: Key<A>, particle: ParticleIndex, value: A::Value) -> Result<()> {
        self.add(key, particle, value)?;
        self.caches.insert(key);
        Ok(())
    }

    fn remove(&mut self, key: Key<A>, particle: ParticleIndex) -> Result<()> {
        if !self.has(key, particle) {
            return Err(Error::missing_attribute(self.label(key), particle));
        }
        *self.cell_mut(key, particle) = A::invalid();
        Ok(())
    }

    fn has(&self, key: Key<A>, particle: ParticleIndex) -> bool {
        self.cell(key, particle).is_some()
    }

    fn get(&self, key: Key<A>, particle: ParticleIndex) -> Result<A::Value> {
        self.cell(key, particle)
            .cloned()
            .ok_or_else(|| Error::missing_attribute(self.label(key), particle))
    }

    fn get_raw(&self, key: Key<A>, particle: ParticleIndex) -> A::Value {
        self.columns
            .get(key.slot())
            .and_then(|column| column.get(particle.slot()))
            .cloned()
            .unwrap_or_else(A::invalid)
    }

    fn set(&mut self, key: Key<A>, particle: ParticleIndex, value: A::Value) -> Result<()> {
        if A::is_invalid(&value) {
            return Err(Error::invalid_value(self.label(key), particle));
        }
        if !self.has(key, particle) {
            return Err(Error::missing_attribute(self.label(key), particle));
        }
        *self.cell_mut(key, particle) = value;
        Ok(())
    }

    fn clear_caches(&mut self, particle: ParticleIndex) {
        for key in &self.caches {
            if let Some(cell) = self
                .columns
                .get_mut(key.slot())
                .and_then(|column| column.get_mut(particle.slot()))
            {
                *cell = A::invalid();
            }
        }
    }

    fn clear_all_caches(&mut self) {
        for key in &self.caches {
            if let Some(column) = self.columns.get_mut(key.slot()) {
                column.fill_with(A::invalid);
            }
        }
    }

    fn clear_particle(&mut self, particle: ParticleIndex) {
        for column in &mut self.columns {
            if let Some(cell) = column.get_mut(particle.slot()) {
                *cell = A::invalid();
            }
        }
    }

    fn keys_of(&self, particle: ParticleIndex) -> Vec<Key<A>> {
        (0..self.columns.len())
            .map(|slot| Key::from_index(slot as u32))
            .filter(|&key| self.has(key, particle))
            .collect()
    }

    fn particles_with(&self, key: Key<A>) -> Vec<ParticleIndex> {
        self.columns
            .get(key.slot())
            .map(|column| {
                column
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| !A::is_invalid(v))
                    .map(|(slot, _)| ParticleIndex::new(slot as u32))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn is_cache_key(&self, key: Key<A>) -> bool {
        self.caches.contains(&key)
    }
}
