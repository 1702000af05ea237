//! Scoregraph - Attribute storage and scoring evaluation for particle models
//!
//! This crate re-exports all layers of the scoregraph workspace for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 2: scoregraph_engine     - Model objects, dependency graph, evaluation
//! Layer 1: scoregraph_storage    - Particle index space, attribute tables, masks
//! Layer 0: scoregraph_foundation - Keys, key registry, particle indices, errors
//! ```

pub use scoregraph_engine as engine;
pub use scoregraph_foundation as foundation;
pub use scoregraph_storage as storage;
