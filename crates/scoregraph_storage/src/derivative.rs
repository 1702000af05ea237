//! Derivative cells and the weighting applied when accumulating into them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// An `f64` supporting lock-free accumulation through a shared reference.
///
/// Restraints evaluated concurrently add into the same derivative cells, so
/// a plain read-modify-write is not an option.
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    /// Creates a cell holding `value`.
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    /// Reads the current value.
    #[must_use]
    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    /// Overwrites the value.
    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }

    /// Adds `delta`, returning the previous value.
    pub fn fetch_add(&self, delta: f64) -> f64 {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(previous) => return f64::from_bits(previous),
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl fmt::Debug for AtomicF64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.load())
    }
}

/// Scales derivative contributions by the product of enclosing weights.
///
/// A restraint nested in sets with weights `w1, w2` and itself weighted `w3`
/// contributes `w1 * w2 * w3 * d` for a raw partial derivative `d`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DerivativeAccumulator {
    weight: f64,
}

impl DerivativeAccumulator {
    /// Creates an accumulator with the given weight.
    #[must_use]
    pub const fn new(weight: f64) -> Self {
        Self { weight }
    }

    /// The weight applied to every contribution.
    #[must_use]
    pub const fn weight(&self) -> f64 {
        self.weight
    }

    /// Returns an accumulator for a nested object with its own weight.
    #[must_use]
    pub fn nested(&self, weight: f64) -> Self {
        Self::new(self.weight * weight)
    }

    /// The weighted value of a raw contribution.
    #[must_use]
    pub fn apply(&self, delta: f64) -> f64 {
        self.weight * delta
    }
}

impl Default for DerivativeAccumulator {
    fn default() -> Self {
        Self::new(1.0)
    }
}
