//! Evaluation stage tracking.
//!
//! A model is `Idle` except while an evaluation runs. Structural mutation is
//! only legal while `Idle`; the [`StageGuard`] returned by [`StageCell::begin`]
//! puts the model back to `Idle` when dropped, including on early return.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use scoregraph_foundation::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Where a model is in the evaluation cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum EvaluationStage {
    /// Not evaluating; structural changes allowed.
    Idle = 0,
    /// Running `before_evaluate` on score states.
    BeforeEvaluating = 1,
    /// Evaluating restraints.
    Evaluating = 2,
    /// Running `after_evaluate` on score states.
    AfterEvaluating = 3,
}

impl EvaluationStage {
    /// Lowercase description used in messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::BeforeEvaluating => "before evaluating",
            Self::Evaluating => "evaluating",
            Self::AfterEvaluating => "after evaluating",
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::BeforeEvaluating,
            2 => Self::Evaluating,
            3 => Self::AfterEvaluating,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for EvaluationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared, atomically updated evaluation stage.
#[derive(Debug, Default)]
pub struct StageCell(AtomicU8);

impl StageCell {
    /// Creates an idle cell.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current stage.
    #[must_use]
    pub fn get(&self) -> EvaluationStage {
        EvaluationStage::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Leaves `Idle` for `stage`, returning a guard that restores `Idle` on drop.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if an evaluation is already in progress.
    pub fn begin(self: &Arc<Self>, stage: EvaluationStage) -> Result<StageGuard> {
        self.0
            .compare_exchange(
                EvaluationStage::Idle as u8,
                stage as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|current| {
                Error::invalid_state("begin an evaluation", EvaluationStage::from_u8(current).name())
            })?;
        Ok(StageGuard {
            cell: Arc::clone(self),
        })
    }

    /// Fails with `InvalidState` unless idle.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` naming `operation` and the current stage.
    pub fn ensure_idle(&self, operation: &str) -> Result<()> {
        match self.get() {
            EvaluationStage::Idle => Ok(()),
            stage => Err(Error::invalid_state(operation, stage.name())),
        }
    }
}

/// Holds a model out of `Idle` for the duration of one evaluation.
#[derive(Debug)]
#[must_use = "dropping the guard immediately returns the model to idle"]
pub struct StageGuard {
    cell: Arc<StageCell>,
}

impl StageGuard {
    /// Moves to the next stage of the same evaluation.
    pub fn advance(&self, stage: EvaluationStage) {
        self.cell.0.store(stage as u8, Ordering::Release);
    }

    /// The current stage.
    #[must_use]
    pub fn stage(&self) -> EvaluationStage {
        self.cell.get()
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        self.cell.0.store(EvaluationStage::Idle as u8, Ordering::Release);
    }
}
