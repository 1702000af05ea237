//! Advisory value ranges for float attributes.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Closed interval `[min, max]` describing where a float attribute's values lie.
///
/// Ranges are metadata for optimizers and samplers; stores never enforce them.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FloatRange {
    /// Lower bound.
    pub min: f64,
    /// Upper bound.
    pub max: f64,
}

impl FloatRange {
    /// The range covering every finite value.
    pub const UNBOUNDED: FloatRange = FloatRange {
        min: -f64::MAX,
        max: f64::MAX,
    };

    /// Creates a range. Bounds are swapped if given in the wrong order.
    #[must_use]
    pub fn new(min: f64, max: f64) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Smallest range containing every value, or `None` for an empty iterator.
    pub fn spanning(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values.into_iter().fold(None, |acc, v| match acc {
            None => Some(Self { min: v, max: v }),
            Some(r) => Some(Self {
                min: r.min.min(v),
                max: r.max.max(v),
            }),
        })
    }

    /// Returns true if `value` lies within the range.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }

    /// Width of the range.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

impl Default for FloatRange {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

impl fmt::Display for FloatRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}
