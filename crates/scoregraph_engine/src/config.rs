//! Engine configuration.

/// How much checking evaluation performs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum CheckLevel {
    /// No validation.
    None,
    /// Enforce declared inputs and outputs on the first evaluation after each
    /// graph rebuild, and cross-validate decompositions. Requires the `checks`
    /// feature; without it this behaves like [`CheckLevel::None`].
    #[default]
    Usage,
}

/// Configuration for a [`Model`](crate::Model).
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Validation performed during evaluation.
    pub check_level: CheckLevel,
    /// Relative and absolute tolerance when comparing a decomposition's score
    /// to the original's.
    pub decomposition_tolerance: f64,
    /// Evaluate sibling restraints on the rayon pool (needs the `parallel` feature).
    pub parallel_restraints: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check_level: CheckLevel::Usage,
            decomposition_tolerance: 1e-6,
            parallel_restraints: false,
        }
    }
}

impl EngineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// No validation, parallel restraints where available.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            check_level: CheckLevel::None,
            parallel_restraints: true,
            ..Self::default()
        }
    }

    /// Sets the check level.
    #[must_use]
    pub fn with_check_level(mut self, level: CheckLevel) -> Self {
        self.check_level = level;
        self
    }

    /// Sets the decomposition tolerance.
    #[must_use]
    pub fn with_decomposition_tolerance(mut self, tolerance: f64) -> Self {
        self.decomposition_tolerance = tolerance;
        self
    }

    /// Enables or disables parallel restraint evaluation.
    #[must_use]
    pub fn with_parallel_restraints(mut self, enabled: bool) -> Self {
        self.parallel_restraints = enabled;
        self
    }

    /// True if usage checks run in this build.
    #[must_use]
    pub fn checks_enabled(&self) -> bool {
        cfg!(feature = "checks") && self.check_level == CheckLevel::Usage
    }

    /// True if restraints run in parallel in this build.
    #[must_use]
    pub fn parallel_enabled(&self) -> bool {
        cfg!(feature = "parallel") && self.parallel_restraints
    }

    /// Returns true if `a` and `b` agree within the decomposition tolerance.
    #[must_use]
    pub fn scores_agree(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.decomposition_tolerance * (1.0 + a.abs().max(b.abs()))
    }
}
