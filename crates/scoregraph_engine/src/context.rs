//! What a restraint sees while it is evaluated.

use scoregraph_foundation::{FloatKey, Key, ParticleIndex, Result};
use scoregraph_storage::{AttributeView, DerivativeAccumulator, StoredAttribute};

/// Attribute access and derivative accumulation for one restraint evaluation.
#[derive(Debug, Clone, Copy)]
pub struct RestraintContext<'a> {
    attributes: AttributeView<'a>,
    accumulator: Option<DerivativeAccumulator>,
}

impl<'a> RestraintContext<'a> {
    /// Creates a context. `accumulator` is `Some` only when derivatives are wanted.
    #[must_use]
    pub fn new(attributes: AttributeView<'a>, accumulator: Option<DerivativeAccumulator>) -> Self {
        Self {
            attributes,
            accumulator,
        }
    }

    /// The attribute view.
    #[must_use]
    pub fn attributes(&self) -> &AttributeView<'a> {
        &self.attributes
    }

    /// Reads an attribute.
    ///
    /// # Errors
    ///
    /// `InputOutputViolation` or `MissingAttribute`.
    pub fn get<A: StoredAttribute>(&self, key: Key<A>, particle: ParticleIndex) -> Result<A::Value> {
        self.attributes.get(key, particle)
    }

    /// Returns true if the attribute is present.
    #[must_use]
    pub fn has<A: StoredAttribute>(&self, key: Key<A>, particle: ParticleIndex) -> bool {
        self.attributes.has(key, particle)
    }

    /// True if the caller asked for derivatives.
    #[must_use]
    pub fn wants_derivatives(&self) -> bool {
        self.accumulator.is_some()
    }

    /// The accumulator carrying this restraint's effective weight.
    #[must_use]
    pub fn derivative_accumulator(&self) -> Option<&DerivativeAccumulator> {
        self.accumulator.as_ref()
    }

    /// Adds a raw partial derivative, scaled by the effective weight.
    ///
    /// Does nothing when derivatives were not requested.
    ///
    /// # Errors
    ///
    /// `InputOutputViolation` or `MissingAttribute`.
    pub fn add_to_derivative(&self, key: FloatKey, particle: ParticleIndex, delta: f64) -> Result<()> {
        match &self.accumulator {
            Some(accumulator) => self
                .attributes
                .add_to_derivative(key, particle, delta, accumulator),
            None => Ok(()),
        }
    }
}
