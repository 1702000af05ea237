//! The evaluation protocol.
//!
//! One evaluation runs three phases under a [`StageGuard`]:
//!
//! 1. `before_evaluate` on every required score state, wave by wave in
//!    ascending update order;
//! 2. the target restraints, each under a nested [`ScoreAccumulator`];
//! 3. `after_evaluate` on the same score states in descending update order.
//!
//! The guard returns the store to idle on every exit path, so a model that saw
//! a failing restraint can still be inspected and mutated.
//!
//! [`StageGuard`]: scoregraph_storage::StageGuard

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::{debug, instrument, trace};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use scoregraph_foundation::{Error, ErrorKind, Result};
use scoregraph_storage::{
    AttributeStore, AttributeView, AttributeViewMut, DerivativeAccumulator, EvaluationStage,
};

use crate::accumulator::{EvaluationMode, EvaluationState, NO_MAX, ScoreAccumulator};
use crate::context::RestraintContext;
use crate::model::Model;
use crate::object::{ObjectId, ScoreState};
use crate::registry::{EntryKind, ObjectEntry, ObjectMap, RestraintBody};

#[cfg(feature = "checks")]
type MaskSet = std::collections::HashMap<ObjectId, scoregraph_storage::AccessMasks>;
#[cfg(not(feature = "checks"))]
type MaskSet = ();

#[cfg(feature = "checks")]
fn view<'a>(store: &'a AttributeStore, masks: Option<&'a MaskSet>, id: ObjectId) -> AttributeView<'a> {
    AttributeView::checked(store, masks.and_then(|m| m.get(&id)))
}

#[cfg(not(feature = "checks"))]
fn view<'a>(store: &'a AttributeStore, _masks: Option<&'a MaskSet>, _id: ObjectId) -> AttributeView<'a> {
    AttributeView::new(store)
}

#[cfg(feature = "checks")]
fn view_mut<'a>(
    store: &'a mut AttributeStore,
    masks: Option<&'a MaskSet>,
    id: ObjectId,
) -> AttributeViewMut<'a> {
    AttributeViewMut::checked(store, masks.and_then(|m| m.get(&id)))
}

#[cfg(not(feature = "checks"))]
fn view_mut<'a>(
    store: &'a mut AttributeStore,
    _masks: Option<&'a MaskSet>,
    _id: ObjectId,
) -> AttributeViewMut<'a> {
    AttributeViewMut::new(store)
}

fn frame(entry: &ObjectEntry) -> String {
    format!("{} {}", entry.object_kind(), entry.name)
}

/// Records the stage on an error escaping an evaluation, unless an inner
/// frame already did.
fn with_stage(mut err: Error, stage: EvaluationStage) -> Error {
    let context = err.context.take().unwrap_or_default();
    err.context = Some(match context.stage {
        Some(_) => context,
        None => context.with_stage(stage.name()),
    });
    err
}

fn score_state(objects: &ObjectMap, id: ObjectId) -> Result<(&Arc<dyn ScoreState>, &ObjectEntry)> {
    match objects.get(id) {
        Some(entry) => match &entry.kind {
            EntryKind::ScoreState(state) => Ok((state, entry)),
            _ => Err(Error::internal(format!(
                "{} scheduled as a score state",
                frame(entry)
            ))),
        },
        None => Err(Error::internal(format!("{id:?} scheduled but not registered"))),
    }
}

/// Evaluates restraints and sets against a shared accumulator.
struct RestraintEvaluator<'a> {
    objects: &'a ObjectMap,
    store: &'a AttributeStore,
    masks: Option<&'a MaskSet>,
    parallel: bool,
}

impl RestraintEvaluator<'_> {
    /// Sum of the weighted scores of `children`, in the caller's order.
    fn evaluate_all(&self, children: &[ObjectId], scope: &ScoreAccumulator<'_>) -> Result<f64> {
        if self.parallel && children.len() > 1 {
            return self.evaluate_parallel(children, scope);
        }
        let mut total = 0.0;
        for &child in children {
            if scope.abort() {
                break;
            }
            total += self.evaluate(child, scope)?;
        }
        Ok(total)
    }

    /// Siblings run on the rayon pool; an abort only skips the siblings that
    /// had not started when it was raised.
    #[cfg(feature = "parallel")]
    fn evaluate_parallel(&self, children: &[ObjectId], scope: &ScoreAccumulator<'_>) -> Result<f64> {
        children
            .par_iter()
            .map(|&child| self.evaluate(child, scope))
            .try_reduce(|| 0.0, |a, b| Ok(a + b))
    }

    #[cfg(not(feature = "parallel"))]
    fn evaluate_parallel(&self, children: &[ObjectId], scope: &ScoreAccumulator<'_>) -> Result<f64> {
        children
            .iter()
            .map(|&child| self.evaluate(child, scope))
            .sum()
    }

    /// Evaluates one restraint or set and returns its score times its own weight.
    fn evaluate(&self, id: ObjectId, parent: &ScoreAccumulator<'_>) -> Result<f64> {
        let entry = self
            .objects
            .get(id)
            .ok_or_else(|| Error::new(ErrorKind::UnknownObject(format!("{id:?}"))))?;
        let EntryKind::Restraint { body, scoring } = &entry.kind else {
            return Err(Error::new(ErrorKind::UnknownObject(format!(
                "{} is not a restraint",
                frame(entry)
            ))));
        };

        let scope = parent.nested(scoring.weight, scoring.max);
        if scope.abort() {
            return Ok(0.0);
        }

        let score = match body {
            RestraintBody::Leaf(restraint) => {
                let context = RestraintContext::new(
                    view(self.store, self.masks, id),
                    scope.derivative_accumulator(),
                );
                let score = restraint
                    .unprotected_evaluate(&context)
                    .map_err(|e| e.with_frame(frame(entry)))?;
                scope.add_score(score);
                score
            }
            RestraintBody::Set(children) => {
                let score = self
                    .evaluate_all(children, &scope)
                    .map_err(|e| e.with_frame(frame(entry)))?;
                scope.check_score(score);
                score
            }
        };
        trace!(restraint = %entry.name, score, "evaluated");
        scoring.record(score);
        Ok(scoring.weight * score)
    }
}

impl Model {
    // =========================================================================
    // Entry points
    // =========================================================================

    /// Evaluates every top-level restraint and returns the total score.
    ///
    /// # Errors
    ///
    /// Dependency graph errors, and any error raised by a score state or
    /// restraint, annotated with the stage and the objects it passed through.
    pub fn evaluate(&mut self, derivatives: bool) -> Result<f64> {
        self.evaluate_top_level(derivatives, EvaluationMode::Full)
    }

    /// Like [`Model::evaluate`], but skips the remaining restraints once one
    /// exceeds its maximum score.
    ///
    /// # Errors
    ///
    /// As [`Model::evaluate`].
    pub fn evaluate_if_good(&mut self, derivatives: bool) -> Result<f64> {
        self.evaluate_top_level(derivatives, EvaluationMode::StopIfGood)
    }

    /// Like [`Model::evaluate`], but skips the remaining restraints once the
    /// running total exceeds `max`.
    ///
    /// # Errors
    ///
    /// As [`Model::evaluate`].
    pub fn evaluate_if_below(&mut self, derivatives: bool, max: f64) -> Result<f64> {
        self.evaluate_top_level(derivatives, EvaluationMode::StopIfBelowMax(max))
    }

    fn evaluate_top_level(&mut self, derivatives: bool, mode: EvaluationMode) -> Result<f64> {
        // Registration is rejected while evaluating, so the list cannot change under us.
        let targets = std::mem::take(&mut self.top_level);
        let result = self.run(&targets, 1.0, NO_MAX, derivatives, mode);
        self.top_level = targets;
        let (score, good) = result?;
        self.last_score = score;
        self.last_good = good;
        Ok(score)
    }

    /// False if any restraint exceeded its maximum in the last model-level evaluation.
    #[must_use]
    pub fn get_had_good_score(&self) -> bool {
        self.last_good
    }

    /// Score returned by the last model-level evaluation.
    #[must_use]
    pub fn last_score(&self) -> f64 {
        self.last_score
    }

    /// Evaluates a scoring function and returns its weighted score.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if `function` is not a scoring function, otherwise as
    /// [`Model::evaluate`].
    pub fn evaluate_scoring_function(
        &mut self,
        function: ObjectId,
        derivatives: bool,
        mode: EvaluationMode,
    ) -> Result<f64> {
        let entry = self.entry(function)?;
        let (targets, weight, max) = match &entry.kind {
            EntryKind::ScoringFunction {
                restraints,
                scoring,
                ..
            } => (restraints.clone(), scoring.weight, scoring.max),
            _ => {
                return Err(Error::new(ErrorKind::UnknownObject(format!(
                    "{} is not a scoring function",
                    frame(entry)
                ))));
            }
        };
        let label = frame(entry);

        let (score, good) = self
            .run(&targets, weight, max, derivatives, mode)
            .map_err(|e| e.with_frame(label))?;

        if let Some(entry) = self.objects.get(function) {
            if let EntryKind::ScoringFunction { scoring, good: flag, .. } = &entry.kind {
                scoring.record(score);
                flag.store(good, Ordering::Release);
            }
        }
        Ok(score)
    }

    /// False if any restraint exceeded its maximum the last time `function` was evaluated.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if `function` is not a scoring function.
    pub fn had_good_score(&self, function: ObjectId) -> Result<bool> {
        let entry = self.entry(function)?;
        entry.had_good_score().ok_or_else(|| {
            Error::new(ErrorKind::UnknownObject(format!(
                "{} is not a scoring function",
                frame(entry)
            )))
        })
    }

    /// Evaluates a single restraint or set, with its own weight applied,
    /// running only the score states it needs.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if `restraint` is not a restraint, otherwise as
    /// [`Model::evaluate`].
    pub fn evaluate_restraint(&mut self, restraint: ObjectId, derivatives: bool) -> Result<f64> {
        self.expect_restraint(restraint)?;
        let (score, _) = self.run(&[restraint], 1.0, NO_MAX, derivatives, EvaluationMode::Full)?;
        Ok(score)
    }

    /// Brings every score state up to date without evaluating restraints.
    ///
    /// # Errors
    ///
    /// Dependency graph errors, or any error raised by a score state.
    #[instrument(skip_all, name = "model_update")]
    pub fn update(&mut self) -> Result<()> {
        let waves = {
            let graph = self.ensure_dependencies()?;
            graph.waves(&graph.score_states())
        };
        let masks = self.prepare_masks();
        let stage = Arc::clone(self.store.stage_cell());
        let guard = stage.begin(EvaluationStage::BeforeEvaluating)?;
        self.age += 1;
        self.store.clear_all_caches();
        run_before(&self.objects, &mut self.store, masks.as_ref(), &waves)
            .map_err(|e| with_stage(e, guard.stage()))
    }

    // =========================================================================
    // Protocol
    // =========================================================================

    #[cfg(feature = "checks")]
    fn prepare_masks(&self) -> Option<MaskSet> {
        if self.validated || !self.config.checks_enabled() {
            return None;
        }
        Some(crate::validation::build_masks(
            &self.objects,
            self.store.particle_capacity(),
        ))
    }

    #[cfg(not(feature = "checks"))]
    #[allow(clippy::unused_self)]
    fn prepare_masks(&self) -> Option<MaskSet> {
        None
    }

    /// Runs one evaluation of `targets` under an accumulator with the given
    /// weight and maximum, returning the weighted total and the good flag.
    #[instrument(
        skip_all,
        name = "evaluation",
        fields(targets = targets.len(), derivatives = derivatives, mode = ?mode)
    )]
    fn run(
        &mut self,
        targets: &[ObjectId],
        weight: f64,
        max: f64,
        derivatives: bool,
        mode: EvaluationMode,
    ) -> Result<(f64, bool)> {
        let waves = self.schedule(targets)?;
        let masks = self.prepare_masks();

        let stage = Arc::clone(self.store.stage_cell());
        let guard = stage.begin(EvaluationStage::BeforeEvaluating)?;
        self.age += 1;
        self.store.clear_all_caches();
        if derivatives {
            self.store.zero_derivatives();
        }

        run_before(&self.objects, &mut self.store, masks.as_ref(), &waves)
            .map_err(|e| with_stage(e, guard.stage()))?;

        guard.advance(EvaluationStage::Evaluating);
        let state = EvaluationState::new();
        let scope = ScoreAccumulator::root(&state, mode, derivatives).nested(weight, max);
        let evaluator = RestraintEvaluator {
            objects: &self.objects,
            store: &self.store,
            masks: masks.as_ref(),
            parallel: self.config.parallel_enabled(),
        };
        let total = evaluator
            .evaluate_all(targets, &scope)
            .map_err(|e| with_stage(e, guard.stage()))?;
        scope.check_score(total);

        guard.advance(EvaluationStage::AfterEvaluating);
        let accumulator = derivatives.then(DerivativeAccumulator::default);
        run_after(
            &self.objects,
            &mut self.store,
            masks.as_ref(),
            &waves,
            accumulator.as_ref(),
        )
        .map_err(|e| with_stage(e, guard.stage()))?;
        drop(guard);

        if masks.is_some() {
            self.validated = true;
        }
        let (score, good) = (state.score(), state.is_good());
        debug!(score, good, age = self.age, "evaluation finished");
        Ok((score, good))
    }
}

fn run_before(
    objects: &ObjectMap,
    store: &mut AttributeStore,
    masks: Option<&MaskSet>,
    waves: &[Vec<ObjectId>],
) -> Result<()> {
    for (wave, states) in waves.iter().enumerate() {
        trace!(wave, states = states.len(), "before_evaluate");
        for &id in states {
            let (state, entry) = score_state(objects, id)?;
            state
                .before_evaluate(&mut view_mut(store, masks, id))
                .map_err(|e| e.with_frame(frame(entry)))?;
        }
    }
    Ok(())
}

fn run_after(
    objects: &ObjectMap,
    store: &mut AttributeStore,
    masks: Option<&MaskSet>,
    waves: &[Vec<ObjectId>],
    accumulator: Option<&DerivativeAccumulator>,
) -> Result<()> {
    for (wave, states) in waves.iter().enumerate().rev() {
        trace!(wave, states = states.len(), "after_evaluate");
        for &id in states.iter().rev() {
            let (state, entry) = score_state(objects, id)?;
            state
                .after_evaluate(&mut view_mut(store, masks, id), accumulator)
                .map_err(|e| e.with_frame(frame(entry)))?;
        }
    }
    Ok(())
}
