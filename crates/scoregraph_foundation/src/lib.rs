//! Core types for scoregraph.
//!
//! This crate provides:
//! - [`ParticleIndex`] - Dense, reusable particle handles
//! - [`Attribute`] and the attribute kinds ([`Float`], [`Int`], [`Text`], ...)
//! - [`Key`] - Typed attribute keys, with reserved float keys such as [`FloatKey::X`]
//! - [`KeyRegistry`] - Per-kind interning of attribute names
//! - [`FloatRange`] - Advisory ranges for float attributes
//! - [`Error`] - Rich error types with context

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod attribute;
pub mod error;
pub mod intern;
pub mod particle;
pub mod range;

pub use attribute::{
    Attribute, Float, FloatKey, FloatList, FloatsKey, INVALID_STRING, Int, IntKey, IntList,
    IntsKey, Key, KeyKind, Object, ObjectKey, ObjectRef, ParticleKey, ParticleRef,
    ParticleRefList, ParticlesKey, StringKey, Text,
};
pub use error::{AccessKind, Error, ErrorContext, ErrorKind, Result};
pub use intern::{KeyRegistry, KeyRegistryBuilder};
pub use particle::ParticleIndex;
pub use range::FloatRange;
