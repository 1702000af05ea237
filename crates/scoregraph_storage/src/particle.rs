//! Particle index allocation.
//!
//! The `ParticleIndexSpace` hands out dense indices, recycling released ones
//! from a free list before growing.

use scoregraph_foundation::{Error, ParticleIndex, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Manages particle lifecycle and names.
///
/// Indices are allocated from the free list when available, otherwise the
/// space grows by one. Releasing an index that is not live is an internal
/// error: two logical particles would end up aliasing the same slot.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParticleIndexSpace {
    /// Liveness per index.
    live: Vec<bool>,
    /// Name per index; empty for released slots.
    names: Vec<String>,
    /// Free list of indices available for reuse.
    free_list: Vec<u32>,
    /// Count of live particles.
    live_count: usize,
}

impl ParticleIndexSpace {
    /// Creates an empty index space.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an index, naming the particle `"P{index}"`.
    ///
    /// # Errors
    ///
    /// `Internal` if every index below [`ParticleIndex::INVALID`] is in use.
    pub fn allocate(&mut self) -> Result<ParticleIndex> {
        let particle = self.allocate_slot()?;
        self.names[particle.slot()] = format!("P{}", particle.get());
        Ok(particle)
    }

    /// Allocates an index with an explicit name.
    ///
    /// # Errors
    ///
    /// As [`ParticleIndexSpace::allocate`].
    pub fn allocate_named(&mut self, name: impl Into<String>) -> Result<ParticleIndex> {
        let particle = self.allocate_slot()?;
        self.names[particle.slot()] = name.into();
        Ok(particle)
    }

    fn allocate_slot(&mut self) -> Result<ParticleIndex> {
        let particle = if let Some(index) = self.free_list.pop() {
            self.live[index as usize] = true;
            ParticleIndex::new(index)
        } else {
            let index = fresh_index(self.live.len())?;
            self.live.push(true);
            self.names.push(String::new());
            ParticleIndex::new(index)
        };
        self.live_count += 1;
        Ok(particle)
    }

    /// Releases a live index back to the free list.
    ///
    /// # Errors
    ///
    /// Returns an `Internal` error if the index is not currently live.
    pub fn release(&mut self, particle: ParticleIndex) -> Result<()> {
        if !self.is_live(particle) {
            return Err(Error::internal(format!(
                "released {particle}, which is not a live particle"
            )));
        }

        self.live[particle.slot()] = false;
        self.names[particle.slot()].clear();
        self.free_list.push(particle.get());
        self.live_count -= 1;

        Ok(())
    }

    /// Returns true if `particle` is currently allocated.
    #[must_use]
    pub fn is_live(&self, particle: ParticleIndex) -> bool {
        self.live.get(particle.slot()).copied().unwrap_or(false)
    }

    /// Validates that a particle is live.
    ///
    /// # Errors
    ///
    /// Returns an `UnknownParticle` error otherwise.
    pub fn validate(&self, particle: ParticleIndex) -> Result<()> {
        if self.is_live(particle) {
            Ok(())
        } else {
            Err(Error::unknown_particle(particle))
        }
    }

    /// Returns the name of a live particle.
    ///
    /// # Errors
    ///
    /// Returns an `UnknownParticle` error if the particle is not live.
    pub fn name(&self, particle: ParticleIndex) -> Result<&str> {
        self.validate(particle)?;
        Ok(&self.names[particle.slot()])
    }

    /// Renames a live particle.
    ///
    /// # Errors
    ///
    /// Returns an `UnknownParticle` error if the particle is not live.
    pub fn set_name(&mut self, particle: ParticleIndex, name: impl Into<String>) -> Result<()> {
        self.validate(particle)?;
        self.names[particle.slot()] = name.into();
        Ok(())
    }

    /// Returns the number of live particles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live_count
    }

    /// Returns true if no particle is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// One past the largest index ever allocated.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.live.len()
    }

    /// Iterates over all live particles in index order.
    pub fn iter(&self) -> impl Iterator<Item = ParticleIndex> + '_ {
        self.live
            .iter()
            .enumerate()
            .filter(|(_, live)| **live)
            .filter_map(|(idx, _)| u32::try_from(idx).ok().map(ParticleIndex::new))
    }
}

/// The index a space holding `len` slots grows into. INVALID is never handed out.
fn fresh_index(len: usize) -> Result<u32> {
    u32::try_from(len)
        .ok()
        .filter(|&index| index != ParticleIndex::INVALID.get())
        .ok_or_else(|| {
            Error::internal(format!("particle index space exhausted after {len} indices"))
        })
}
