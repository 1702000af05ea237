//! Particle identifiers.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Dense, reusable handle for a particle within one model.
///
/// Indices are handed out by the storage layer from a free list. A particle's
/// identity is the pair (owning model, index); the index alone says nothing
/// about which model it belongs to.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParticleIndex(u32);

impl ParticleIndex {
    /// Sentinel value meaning "no particle".
    ///
    /// Used as the invalid value of particle-reference attributes; never allocated.
    pub const INVALID: ParticleIndex = ParticleIndex(u32::MAX);

    /// Creates a particle index from its raw value.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns the index as a `usize`, for addressing columns.
    #[must_use]
    pub const fn slot(self) -> usize {
        self.0 as usize
    }

    /// Returns true if this is the [`ParticleIndex::INVALID`] sentinel.
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        self.0 == u32::MAX
    }
}

impl fmt::Debug for ParticleIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            write!(f, "ParticleIndex(invalid)")
        } else {
            write!(f, "ParticleIndex({})", self.0)
        }
    }
}

impl fmt::Display for ParticleIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            write!(f, "P(invalid)")
        } else {
            write!(f, "P{}", self.0)
        }
    }
}
