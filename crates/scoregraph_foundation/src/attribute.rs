//! Attribute kinds, their value types and sentinels, and typed keys.
//!
//! Every attribute kind reserves one in-band value as its "invalid" marker.
//! A stored cell equal to that marker means the attribute is absent, so a
//! presence check costs no extra memory access. The price is that the marker
//! can never be stored as application data.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::particle::ParticleIndex;

/// The kind of an attribute, which partitions the key space.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum KeyKind {
    /// 64-bit float, may carry a derivative and be optimized.
    Float,
    /// 64-bit signed integer.
    Int,
    /// UTF-8 string.
    String,
    /// Shared reference to an arbitrary object.
    Object,
    /// Reference to another particle of the same model.
    ParticleRef,
    /// List of floats.
    FloatList,
    /// List of integers.
    IntList,
    /// List of particle references.
    ParticleRefList,
}

impl KeyKind {
    /// All kinds, in registry order.
    pub const ALL: [KeyKind; 8] = [
        KeyKind::Float,
        KeyKind::Int,
        KeyKind::String,
        KeyKind::Object,
        KeyKind::ParticleRef,
        KeyKind::FloatList,
        KeyKind::IntList,
        KeyKind::ParticleRefList,
    ];

    /// Position of this kind in [`KeyKind::ALL`].
    #[must_use]
    pub const fn ordinal(self) -> usize {
        self as usize
    }

    /// Short lowercase name used in messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::String => "string",
            Self::Object => "object",
            Self::ParticleRef => "particle",
            Self::FloatList => "floats",
            Self::IntList => "ints",
            Self::ParticleRefList => "particles",
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Describes one attribute kind: its value type and its invalid sentinel.
pub trait Attribute: Send + Sync + 'static {
    /// The key space this kind lives in.
    const KIND: KeyKind;

    /// Stored value type.
    type Value: Clone + PartialEq + fmt::Debug + Send + Sync;

    /// The sentinel value standing in for "absent".
    fn invalid() -> Self::Value;

    /// Returns true if `value` is the sentinel.
    fn is_invalid(value: &Self::Value) -> bool {
        *value == Self::invalid()
    }
}

/// Float attributes. Sentinel: `+inf`.
#[derive(Debug)]
pub enum Float {}

/// Integer attributes. Sentinel: `i64::MAX`.
#[derive(Debug)]
pub enum Int {}

/// String attributes. Sentinel: [`INVALID_STRING`].
#[derive(Debug)]
pub enum Text {}

/// Object attributes. Sentinel: `None`.
#[derive(Debug)]
pub enum Object {}

/// Particle reference attributes. Sentinel: [`ParticleIndex::INVALID`].
#[derive(Debug)]
pub enum ParticleRef {}

/// Float list attributes. Sentinel: the empty list.
#[derive(Debug)]
pub enum FloatList {}

/// Integer list attributes. Sentinel: the empty list.
#[derive(Debug)]
pub enum IntList {}

/// Particle reference list attributes. Sentinel: the empty list.
#[derive(Debug)]
pub enum ParticleRefList {}

/// Reserved string marking an absent string attribute.
pub const INVALID_STRING: &str = "\u{0}<invalid string attribute>";

impl Attribute for Float {
    const KIND: KeyKind = KeyKind::Float;
    type Value = f64;

    fn invalid() -> f64 {
        f64::INFINITY
    }

    fn is_invalid(value: &f64) -> bool {
        *value == f64::INFINITY
    }
}

impl Attribute for Int {
    const KIND: KeyKind = KeyKind::Int;
    type Value = i64;

    fn invalid() -> i64 {
        i64::MAX
    }
}

impl Attribute for Text {
    const KIND: KeyKind = KeyKind::String;
    type Value = String;

    fn invalid() -> String {
        INVALID_STRING.to_string()
    }

    fn is_invalid(value: &String) -> bool {
        value == INVALID_STRING
    }
}

impl Attribute for Object {
    const KIND: KeyKind = KeyKind::Object;
    type Value = Option<ObjectRef>;

    fn invalid() -> Option<ObjectRef> {
        None
    }

    fn is_invalid(value: &Option<ObjectRef>) -> bool {
        value.is_none()
    }
}

impl Attribute for ParticleRef {
    const KIND: KeyKind = KeyKind::ParticleRef;
    type Value = ParticleIndex;

    fn invalid() -> ParticleIndex {
        ParticleIndex::INVALID
    }
}

impl Attribute for FloatList {
    const KIND: KeyKind = KeyKind::FloatList;
    type Value = Vec<f64>;

    fn invalid() -> Vec<f64> {
        Vec::new()
    }

    fn is_invalid(value: &Vec<f64>) -> bool {
        value.is_empty()
    }
}

impl Attribute for IntList {
    const KIND: KeyKind = KeyKind::IntList;
    type Value = Vec<i64>;

    fn invalid() -> Vec<i64> {
        Vec::new()
    }

    fn is_invalid(value: &Vec<i64>) -> bool {
        value.is_empty()
    }
}

impl Attribute for ParticleRefList {
    const KIND: KeyKind = KeyKind::ParticleRefList;
    type Value = Vec<ParticleIndex>;

    fn invalid() -> Vec<ParticleIndex> {
        Vec::new()
    }

    fn is_invalid(value: &Vec<ParticleIndex>) -> bool {
        value.is_empty()
    }
}

/// Shared handle stored by object attributes.
///
/// Equality is identity: two handles are equal iff they point at the same
/// allocation.
#[derive(Clone)]
pub struct ObjectRef(Arc<dyn Any + Send + Sync>);

impl ObjectRef {
    /// Wraps a value in a new shared handle.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Wraps an existing shared allocation.
    #[must_use]
    pub fn from_arc(value: Arc<dyn Any + Send + Sync>) -> Self {
        Self(value)
    }

    /// Returns the referenced value if it has type `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:p})", Arc::as_ptr(&self.0))
    }
}

/// Typed attribute key: an interned name within the key space of kind `A`.
///
/// Keys of different kinds are unrelated even when interned from the same
/// string.
pub struct Key<A: Attribute> {
    index: u32,
    _kind: PhantomData<fn() -> A>,
}

impl<A: Attribute> Key<A> {
    /// Creates a key from a raw registry index.
    ///
    /// Prefer obtaining keys from a [`KeyRegistry`](crate::KeyRegistry).
    #[must_use]
    pub const fn from_index(index: u32) -> Self {
        Self {
            index,
            _kind: PhantomData,
        }
    }

    /// Returns the raw index of this key.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the key's index as a column position.
    #[must_use]
    pub const fn slot(self) -> usize {
        self.index as usize
    }

    /// Returns the kind of this key.
    #[must_use]
    pub const fn kind(self) -> KeyKind {
        A::KIND
    }
}

impl<A: Attribute> Copy for Key<A> {}

impl<A: Attribute> Clone for Key<A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: Attribute> PartialEq for Key<A> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<A: Attribute> Eq for Key<A> {}

impl<A: Attribute> Hash for Key<A> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<A: Attribute> PartialOrd for Key<A> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<A: Attribute> Ord for Key<A> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

impl<A: Attribute> fmt::Debug for Key<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key<{}>({})", A::KIND, self.index)
    }
}

/// Key for float attributes.
pub type FloatKey = Key<Float>;
/// Key for integer attributes.
pub type IntKey = Key<Int>;
/// Key for string attributes.
pub type StringKey = Key<Text>;
/// Key for object attributes.
pub type ObjectKey = Key<Object>;
/// Key for particle reference attributes.
pub type ParticleKey = Key<ParticleRef>;
/// Key for float list attributes.
pub type FloatsKey = Key<FloatList>;
/// Key for integer list attributes.
pub type IntsKey = Key<IntList>;
/// Key for particle list attributes.
pub type ParticlesKey = Key<ParticleRefList>;

// =========================================================================
// Reserved float keys
// =========================================================================
// Always interned first, in this order, by every registry.

impl Key<Float> {
    /// Cartesian x coordinate.
    pub const X: FloatKey = Key::from_index(0);
    /// Cartesian y coordinate.
    pub const Y: FloatKey = Key::from_index(1);
    /// Cartesian z coordinate.
    pub const Z: FloatKey = Key::from_index(2);
    /// Sphere radius.
    pub const RADIUS: FloatKey = Key::from_index(3);
    /// First internal (body-local) coordinate.
    pub const LOCAL_X: FloatKey = Key::from_index(4);
    /// Second internal (body-local) coordinate.
    pub const LOCAL_Y: FloatKey = Key::from_index(5);
    /// Third internal (body-local) coordinate.
    pub const LOCAL_Z: FloatKey = Key::from_index(6);

    /// Number of reserved float keys with dedicated storage.
    pub const RESERVED_COUNT: u32 = 7;

    /// Returns true for `x`, `y`, `z` and `radius`.
    #[must_use]
    pub const fn is_sphere(self) -> bool {
        self.index < 4
    }

    /// Returns true for the three internal coordinates.
    #[must_use]
    pub const fn is_internal(self) -> bool {
        self.index >= 4 && self.index < Self::RESERVED_COUNT
    }
}
