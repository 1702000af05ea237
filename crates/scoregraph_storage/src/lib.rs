//! Attribute storage for scoregraph.
//!
//! This crate provides:
//! - [`ParticleIndexSpace`] - Particle allocation with index reuse
//! - [`AttributeTable`] and [`FloatAttributeTable`] - Columnar, sentinel-based tables
//! - [`AttributeStore`] - All tables of a model, generic over the attribute kind
//! - [`StageCell`] / [`StageGuard`] - Evaluation stage tracking
//! - [`AttributeView`] / [`AttributeViewMut`] - Access handed to objects during evaluation
//! - `AccessMasks` - Declared-access enforcement (with the `checks` feature)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod derivative;
pub mod float;
#[cfg(feature = "checks")]
pub mod masks;
pub mod particle;
pub mod stage;
pub mod store;
pub mod table;
pub mod view;

pub use derivative::{AtomicF64, DerivativeAccumulator};
pub use float::FloatAttributeTable;
#[cfg(feature = "checks")]
pub use masks::{AccessMasks, Mask};
pub use particle::ParticleIndexSpace;
pub use stage::{EvaluationStage, StageCell, StageGuard};
pub use store::{AttributeStore, StoredAttribute, Tables};
pub use table::{AttributeTable, Table};
pub use view::{AttributeView, AttributeViewMut};
