//! Per-object access masks.
//!
//! Each mask is a bitset over particle indices. A model builds one
//! [`AccessMasks`] per object from the object's declared inputs and outputs,
//! and attribute views consult them on every access while checks are active.

use scoregraph_foundation::{AccessKind, Error, ErrorKind, ParticleIndex, Result};

const WORD: usize = 64;

/// A growable bitset over particle indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mask {
    words: Vec<u64>,
}

impl Mask {
    /// Creates an empty mask able to hold `capacity` particles without growing.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(WORD)],
        }
    }

    /// Grants access to `particle`.
    pub fn allow(&mut self, particle: ParticleIndex) {
        if particle.is_invalid() {
            return;
        }
        let (word, bit) = (particle.slot() / WORD, particle.slot() % WORD);
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << bit;
    }

    /// Returns true if `particle` may be accessed.
    #[must_use]
    pub fn allows(&self, particle: ParticleIndex) -> bool {
        let (word, bit) = (particle.slot() / WORD, particle.slot() % WORD);
        self.words.get(word).is_some_and(|w| w & (1 << bit) != 0)
    }

    /// Number of particles allowed.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

/// The five permission masks of one object.
#[derive(Debug, Clone, Default)]
pub struct AccessMasks {
    object: String,
    /// Particles whose attributes may be read.
    pub read: Mask,
    /// Particles whose attributes may be overwritten.
    pub write: Mask,
    /// Particles that may gain or lose (cache) attributes.
    pub add_remove: Mask,
    /// Particles whose derivatives may be read.
    pub read_derivatives: Mask,
    /// Particles whose derivatives may be accumulated into.
    pub write_derivatives: Mask,
}

impl AccessMasks {
    /// Creates masks for `object` that allow nothing.
    #[must_use]
    pub fn new(object: impl Into<String>, capacity: usize) -> Self {
        Self {
            object: object.into(),
            read: Mask::with_capacity(capacity),
            write: Mask::with_capacity(capacity),
            add_remove: Mask::with_capacity(capacity),
            read_derivatives: Mask::with_capacity(capacity),
            write_derivatives: Mask::with_capacity(capacity),
        }
    }

    /// Name of the object these masks belong to.
    #[must_use]
    pub fn object(&self) -> &str {
        &self.object
    }

    fn mask(&self, access: AccessKind) -> &Mask {
        match access {
            AccessKind::Get => &self.read,
            AccessKind::Set => &self.write,
            AccessKind::Add | AccessKind::Remove => &self.add_remove,
            AccessKind::ReadDerivative => &self.read_derivatives,
            AccessKind::WriteDerivative => &self.write_derivatives,
        }
    }

    /// Checks one access.
    ///
    /// `key` is only evaluated when building the error.
    ///
    /// # Errors
    ///
    /// `InputOutputViolation` naming the object, key, particle and access.
    pub fn check(
        &self,
        access: AccessKind,
        particle: ParticleIndex,
        key: impl FnOnce() -> String,
    ) -> Result<()> {
        if self.mask(access).allows(particle) {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::InputOutputViolation {
                object: self.object.clone(),
                key: key(),
                particle,
                access,
            }))
        }
    }
}
