//! Model objects, dependency graph and scoring evaluation for scoregraph.
//!
//! This crate provides:
//! - [`Model`] - Particles, attributes and registered objects in one place
//! - [`ModelObject`], [`ScoreState`] and [`Restraint`] - The collaborator contract
//! - [`DependencyGraph`] - Score-state ordering derived from declared inputs and outputs
//! - [`ScoreAccumulator`] - Weighted score accumulation with early abort
//! - [`EngineConfig`] - Check level, decomposition tolerance and parallelism

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod accumulator;
pub mod config;
pub mod context;
mod decomposition;
mod evaluate;
pub mod graph;
pub mod model;
pub mod object;
mod registry;
#[cfg(feature = "checks")]
mod validation;

pub use accumulator::{EvaluationMode, EvaluationState, NO_MAX, ScoreAccumulator};
pub use config::{CheckLevel, EngineConfig};
pub use context::RestraintContext;
pub use graph::DependencyGraph;
pub use model::Model;
pub use object::{ModelNode, ModelObject, ObjectId, ObjectKind, Restraint, ScoreState};
