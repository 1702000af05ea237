//! The collaborator contract: objects a model tracks and evaluates.
//!
//! A model calls into user code through exactly three traits. Every tracked
//! object is a [`ModelObject`] declaring what it reads and writes; a
//! [`ScoreState`] additionally updates attributes around restraint
//! evaluation, and a [`Restraint`] computes a score.

use std::fmt;
use std::sync::Arc;

use scoregraph_foundation::{ParticleIndex, Result};
use scoregraph_storage::{AttributeViewMut, DerivativeAccumulator};

use crate::context::RestraintContext;

slotmap::new_key_type! {
    /// Identifies an object registered with a model.
    pub struct ObjectId;
}

/// A vertex of the dependency graph: a particle or a registered object.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelNode {
    /// A particle of the model.
    Particle(ParticleIndex),
    /// A registered object.
    Object(ObjectId),
}

impl From<ParticleIndex> for ModelNode {
    fn from(particle: ParticleIndex) -> Self {
        Self::Particle(particle)
    }
}

impl From<ObjectId> for ModelNode {
    fn from(object: ObjectId) -> Self {
        Self::Object(object)
    }
}

impl fmt::Display for ModelNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Particle(p) => write!(f, "{p}"),
            Self::Object(id) => write!(f, "{id:?}"),
        }
    }
}

/// Anything a model tracks in its dependency graph.
///
/// Declared inputs and outputs must not change while the object is
/// registered; the model only re-reads them when its graph is rebuilt.
pub trait ModelObject: Send + Sync + fmt::Debug {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Particles and objects this object reads.
    fn inputs(&self) -> Vec<ModelNode> {
        Vec::new()
    }

    /// Particles and objects this object writes.
    fn outputs(&self) -> Vec<ModelNode> {
        Vec::new()
    }
}

/// An object that brings attributes up to date before restraints run, and
/// propagates derivatives back afterwards.
pub trait ScoreState: ModelObject {
    /// Called before restraints are evaluated, in ascending update order.
    ///
    /// # Errors
    ///
    /// Any error aborts the evaluation and is returned to its caller.
    fn before_evaluate(&self, attributes: &mut AttributeViewMut<'_>) -> Result<()>;

    /// Called after restraints are evaluated, in descending update order.
    ///
    /// `accumulator` is `Some` only when derivatives were requested.
    ///
    /// # Errors
    ///
    /// Any error aborts the evaluation and is returned to its caller.
    fn after_evaluate(
        &self,
        attributes: &mut AttributeViewMut<'_>,
        accumulator: Option<&DerivativeAccumulator>,
    ) -> Result<()> {
        let _ = (attributes, accumulator);
        Ok(())
    }
}

/// A scoring term.
pub trait Restraint: ModelObject {
    /// Computes the unweighted score.
    ///
    /// Derivatives, when requested, go through
    /// [`RestraintContext::add_to_derivative`], which applies the weight.
    ///
    /// # Errors
    ///
    /// Any error aborts the evaluation and is returned to its caller.
    fn unprotected_evaluate(&self, context: &RestraintContext<'_>) -> Result<f64>;

    /// Splits this restraint into independent parts whose scores sum to its own.
    ///
    /// An empty result means the restraint does not decompose.
    fn create_decomposition(&self) -> Vec<Arc<dyn Restraint>> {
        Vec::new()
    }
}

/// The kind of a registered object.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// A plain [`ModelObject`] grouping particles.
    Container,
    /// A [`ScoreState`].
    ScoreState,
    /// A single [`Restraint`].
    Restraint,
    /// A weighted group of restraints.
    RestraintSet,
    /// A named entry point for evaluating a list of restraints.
    ScoringFunction,
}

impl ObjectKind {
    /// Lowercase description used in messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::ScoreState => "score state",
            Self::Restraint => "restraint",
            Self::RestraintSet => "restraint set",
            Self::ScoringFunction => "scoring function",
        }
    }

    /// True for restraints and restraint sets.
    #[must_use]
    pub const fn is_restraint(self) -> bool {
        matches!(self, Self::Restraint | Self::RestraintSet)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
