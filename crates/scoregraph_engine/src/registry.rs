//! Registry entries for the objects a model tracks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use slotmap::SlotMap;

use scoregraph_storage::AtomicF64;

use crate::accumulator::NO_MAX;
use crate::object::{ModelNode, ModelObject, ObjectId, ObjectKind, Restraint, ScoreState};

pub(crate) type ObjectMap = SlotMap<ObjectId, ObjectEntry>;

/// Weight, maximum and last score of a restraint, set or scoring function.
#[derive(Debug)]
pub(crate) struct Scoring {
    pub(crate) weight: f64,
    pub(crate) max: f64,
    last_score: AtomicF64,
}

impl Scoring {
    pub(crate) fn new(weight: f64, max: f64) -> Self {
        Self {
            weight,
            max,
            last_score: AtomicF64::new(0.0),
        }
    }

    pub(crate) fn last_score(&self) -> f64 {
        self.last_score.load()
    }

    pub(crate) fn record(&self, score: f64) {
        self.last_score.store(score);
    }
}

impl Default for Scoring {
    fn default() -> Self {
        Self::new(1.0, NO_MAX)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum RestraintBody {
    Leaf(Arc<dyn Restraint>),
    Set(Vec<ObjectId>),
}

#[derive(Debug)]
pub(crate) enum EntryKind {
    Container(Arc<dyn ModelObject>),
    ScoreState(Arc<dyn ScoreState>),
    Restraint {
        body: RestraintBody,
        scoring: Scoring,
    },
    ScoringFunction {
        restraints: Vec<ObjectId>,
        scoring: Scoring,
        good: AtomicBool,
    },
}

#[derive(Debug)]
pub(crate) struct ObjectEntry {
    pub(crate) name: String,
    /// Registration order; breaks ties between score states of equal update order.
    pub(crate) sequence: u64,
    pub(crate) kind: EntryKind,
}

impl ObjectEntry {
    pub(crate) fn object_kind(&self) -> ObjectKind {
        match &self.kind {
            EntryKind::Container(_) => ObjectKind::Container,
            EntryKind::ScoreState(_) => ObjectKind::ScoreState,
            EntryKind::Restraint {
                body: RestraintBody::Leaf(_),
                ..
            } => ObjectKind::Restraint,
            EntryKind::Restraint {
                body: RestraintBody::Set(_),
                ..
            } => ObjectKind::RestraintSet,
            EntryKind::ScoringFunction { .. } => ObjectKind::ScoringFunction,
        }
    }

    /// Declared inputs. Sets and scoring functions read their members.
    pub(crate) fn inputs(&self) -> Vec<ModelNode> {
        match &self.kind {
            EntryKind::Container(object) => object.inputs(),
            EntryKind::ScoreState(state) => state.inputs(),
            EntryKind::Restraint {
                body: RestraintBody::Leaf(restraint),
                ..
            } => restraint.inputs(),
            EntryKind::Restraint {
                body: RestraintBody::Set(children),
                ..
            }
            | EntryKind::ScoringFunction {
                restraints: children,
                ..
            } => children.iter().copied().map(ModelNode::Object).collect(),
        }
    }

    pub(crate) fn outputs(&self) -> Vec<ModelNode> {
        match &self.kind {
            EntryKind::Container(object) => object.outputs(),
            EntryKind::ScoreState(state) => state.outputs(),
            EntryKind::Restraint {
                body: RestraintBody::Leaf(restraint),
                ..
            } => restraint.outputs(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn scoring(&self) -> Option<&Scoring> {
        match &self.kind {
            EntryKind::Restraint { scoring, .. } | EntryKind::ScoringFunction { scoring, .. } => {
                Some(scoring)
            }
            _ => None,
        }
    }

    pub(crate) fn scoring_mut(&mut self) -> Option<&mut Scoring> {
        match &mut self.kind {
            EntryKind::Restraint { scoring, .. } | EntryKind::ScoringFunction { scoring, .. } => {
                Some(scoring)
            }
            _ => None,
        }
    }

    pub(crate) fn is_score_state(&self) -> bool {
        matches!(self.kind, EntryKind::ScoreState(_))
    }

    pub(crate) fn had_good_score(&self) -> Option<bool> {
        match &self.kind {
            EntryKind::ScoringFunction { good, .. } => Some(good.load(Ordering::Acquire)),
            _ => None,
        }
    }

    /// Drops `member` from this entry's member list, if it has one.
    pub(crate) fn forget(&mut self, member: ObjectId) {
        if let EntryKind::Restraint {
            body: RestraintBody::Set(children),
            ..
        }
        | EntryKind::ScoringFunction {
            restraints: children,
            ..
        } = &mut self.kind
        {
            children.retain(|&c| c != member);
        }
    }
}
