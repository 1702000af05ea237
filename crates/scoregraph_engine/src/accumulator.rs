//! Score accumulation with weights, maxima and early abort.

use std::sync::atomic::{AtomicBool, Ordering};

use scoregraph_storage::{AtomicF64, DerivativeAccumulator};

/// Score assigned to restraints without a maximum.
pub const NO_MAX: f64 = f64::MAX;

/// When an evaluation may stop early.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum EvaluationMode {
    /// Evaluate everything.
    Full,
    /// Skip remaining restraints once any restraint exceeds its maximum.
    StopIfGood,
    /// Skip remaining restraints once the running total exceeds the bound.
    StopIfBelowMax(f64),
}

/// Running total and "good" flag of one evaluation, shared by every restraint in it.
#[derive(Debug)]
pub struct EvaluationState {
    score: AtomicF64,
    good: AtomicBool,
}

impl EvaluationState {
    /// A fresh state: zero score, good.
    #[must_use]
    pub fn new() -> Self {
        Self {
            score: AtomicF64::new(0.0),
            good: AtomicBool::new(true),
        }
    }

    /// Current running total.
    #[must_use]
    pub fn score(&self) -> f64 {
        self.score.load()
    }

    /// False once any restraint exceeded its local maximum.
    #[must_use]
    pub fn is_good(&self) -> bool {
        self.good.load(Ordering::Acquire)
    }

    fn add(&self, weighted: f64) -> f64 {
        self.score.fetch_add(weighted) + weighted
    }

    fn mark_bad(&self) {
        self.good.store(false, Ordering::Release);
    }
}

impl Default for EvaluationState {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulator scoped to one restraint (or set) within an evaluation.
///
/// Nesting multiplies weights and tightens the local maximum to
/// `min(outer_max / weight, own_max)`.
#[derive(Debug, Clone, Copy)]
pub struct ScoreAccumulator<'a> {
    state: &'a EvaluationState,
    mode: EvaluationMode,
    weight: f64,
    local_max: f64,
    derivatives: bool,
}

impl<'a> ScoreAccumulator<'a> {
    /// The outermost accumulator of an evaluation.
    #[must_use]
    pub fn root(state: &'a EvaluationState, mode: EvaluationMode, derivatives: bool) -> Self {
        Self {
            state,
            mode,
            weight: 1.0,
            local_max: NO_MAX,
            derivatives,
        }
    }

    /// Accumulator for a child with its own weight and maximum.
    #[must_use]
    pub fn nested(&self, weight: f64, max: f64) -> Self {
        Self {
            weight: self.weight * weight,
            local_max: (self.local_max / weight).min(max),
            ..*self
        }
    }

    /// Product of all enclosing weights.
    #[must_use]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Largest unweighted score this scope may report and still be good.
    #[must_use]
    pub fn local_max(&self) -> f64 {
        self.local_max
    }

    /// True if the remaining work in this evaluation should be skipped.
    #[must_use]
    pub fn abort(&self) -> bool {
        match self.mode {
            EvaluationMode::Full => false,
            EvaluationMode::StopIfGood => !self.state.is_good(),
            EvaluationMode::StopIfBelowMax(max) => self.state.score() > max,
        }
    }

    /// Adds an unweighted score to the shared total.
    pub fn add_score(&self, score: f64) {
        let total = self.state.add(self.weight * score);
        let over_total = match self.mode {
            EvaluationMode::StopIfBelowMax(max) => total > max,
            _ => false,
        };
        if score > self.local_max || over_total {
            self.state.mark_bad();
        }
    }

    /// Marks the evaluation bad if `score` exceeds the local maximum, without adding it.
    pub fn check_score(&self, score: f64) {
        if score > self.local_max {
            self.state.mark_bad();
        }
    }

    /// A derivative accumulator carrying this scope's weight, if derivatives are wanted.
    #[must_use]
    pub fn derivative_accumulator(&self) -> Option<DerivativeAccumulator> {
        self.derivatives
            .then(|| DerivativeAccumulator::new(self.weight))
    }
}
