//! The model: attribute store, object registry and dependency graph.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use scoregraph_foundation::{Error, ErrorKind, KeyRegistry, ParticleIndex, Result};
use scoregraph_storage::AttributeStore;

use crate::accumulator::NO_MAX;
use crate::config::EngineConfig;
use crate::graph::DependencyGraph;
use crate::object::{ModelNode, ModelObject, ObjectId, ObjectKind, Restraint, ScoreState};
use crate::registry::{EntryKind, ObjectEntry, ObjectMap, RestraintBody, Scoring};

/// A scored particle system.
///
/// The model owns every attribute table, the particle index space, every
/// registered object and the dependency graph derived from them. The graph is
/// rebuilt lazily: any structural change marks it stale and the next query or
/// evaluation rebuilds it.
#[derive(Debug)]
pub struct Model {
    pub(crate) store: AttributeStore,
    pub(crate) objects: ObjectMap,
    /// Restraints evaluated by [`Model::evaluate`], in evaluation order.
    pub(crate) top_level: Vec<ObjectId>,
    /// `None` while stale.
    pub(crate) graph: Option<DependencyGraph>,
    /// False until the first evaluation after a rebuild has run with masks.
    pub(crate) validated: bool,
    pub(crate) config: EngineConfig,
    pub(crate) age: u64,
    pub(crate) last_score: f64,
    pub(crate) last_good: bool,
    next_sequence: u64,
}

impl Model {
    /// Creates an empty model with the default configuration.
    #[must_use]
    pub fn new(registry: Arc<KeyRegistry>) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    /// Creates an empty model.
    #[must_use]
    pub fn with_config(registry: Arc<KeyRegistry>, config: EngineConfig) -> Self {
        Self {
            store: AttributeStore::new(registry),
            objects: ObjectMap::with_key(),
            top_level: Vec::new(),
            graph: None,
            validated: false,
            config,
            age: 0,
            last_score: 0.0,
            last_good: true,
            next_sequence: 0,
        }
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The key registry shared by this model.
    #[must_use]
    pub fn registry(&self) -> &Arc<KeyRegistry> {
        self.store.registry()
    }

    /// Attribute access.
    #[must_use]
    pub fn attributes(&self) -> &AttributeStore {
        &self.store
    }

    /// Mutable attribute access.
    ///
    /// Adding or removing particles through the store directly does not mark
    /// the dependency graph stale; prefer [`Model::add_particle`] and
    /// [`Model::remove_particle`].
    pub fn attributes_mut(&mut self) -> &mut AttributeStore {
        &mut self.store
    }

    /// Number of evaluations and updates run so far.
    #[must_use]
    pub fn age(&self) -> u64 {
        self.age
    }

    fn invalidate(&mut self) {
        self.graph = None;
    }

    // =========================================================================
    // Particles
    // =========================================================================

    /// Creates a particle named `"P{index}"`.
    ///
    /// # Errors
    ///
    /// `InvalidState` during evaluation.
    pub fn add_particle(&mut self) -> Result<ParticleIndex> {
        let particle = self.store.add_particle()?;
        self.invalidate();
        Ok(particle)
    }

    /// Creates a named particle.
    ///
    /// # Errors
    ///
    /// `InvalidState` during evaluation.
    pub fn add_named_particle(&mut self, name: impl Into<String>) -> Result<ParticleIndex> {
        let particle = self.store.add_named_particle(name)?;
        self.invalidate();
        Ok(particle)
    }

    /// Removes a particle and all of its attributes.
    ///
    /// # Errors
    ///
    /// `InvalidState` during evaluation; `Internal` if the particle is not live.
    pub fn remove_particle(&mut self, particle: ParticleIndex) -> Result<()> {
        self.store.remove_particle(particle)?;
        self.invalidate();
        Ok(())
    }

    // =========================================================================
    // Registration
    // =========================================================================

    fn insert(&mut self, name: String, kind: EntryKind) -> Result<ObjectId> {
        self.store.stage_cell().ensure_idle("register an object")?;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let id = self.objects.insert(ObjectEntry {
            name,
            sequence,
            kind,
        });
        self.invalidate();
        Ok(id)
    }

    /// Registers a container: an object that only groups particles or other objects.
    ///
    /// # Errors
    ///
    /// `InvalidState` during evaluation.
    pub fn add_container(&mut self, container: Arc<dyn ModelObject>) -> Result<ObjectId> {
        let name = container.name().to_string();
        self.insert(name, EntryKind::Container(container))
    }

    /// Registers a score state.
    ///
    /// # Errors
    ///
    /// `InvalidState` during evaluation.
    pub fn add_score_state(&mut self, state: Arc<dyn ScoreState>) -> Result<ObjectId> {
        let name = state.name().to_string();
        self.insert(name, EntryKind::ScoreState(state))
    }

    /// Registers a restraint without scheduling it for [`Model::evaluate`].
    ///
    /// Use this for restraints that will only be evaluated through a set or
    /// scoring function.
    ///
    /// # Errors
    ///
    /// `InvalidState` during evaluation.
    pub fn register_restraint(&mut self, restraint: Arc<dyn Restraint>) -> Result<ObjectId> {
        let name = restraint.name().to_string();
        self.insert(
            name,
            EntryKind::Restraint {
                body: RestraintBody::Leaf(restraint),
                scoring: Scoring::default(),
            },
        )
    }

    /// Registers a restraint (weight 1, no maximum) and adds it to the
    /// restraints evaluated by [`Model::evaluate`].
    ///
    /// # Errors
    ///
    /// `InvalidState` during evaluation.
    pub fn add_restraint(&mut self, restraint: Arc<dyn Restraint>) -> Result<ObjectId> {
        let id = self.register_restraint(restraint)?;
        self.top_level.push(id);
        Ok(id)
    }

    pub(crate) fn insert_restraint(
        &mut self,
        name: String,
        body: RestraintBody,
        scoring: Scoring,
    ) -> Result<ObjectId> {
        self.insert(name, EntryKind::Restraint { body, scoring })
    }

    /// Groups restraints into a weighted set evaluated by [`Model::evaluate`].
    ///
    /// Members stop being evaluated on their own at the top level.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if a member is not a registered restraint or set.
    pub fn add_restraint_set(
        &mut self,
        name: impl Into<String>,
        members: &[ObjectId],
    ) -> Result<ObjectId> {
        for &member in members {
            self.expect_restraint(member)?;
        }
        let id = self.insert_restraint(
            name.into(),
            RestraintBody::Set(members.to_vec()),
            Scoring::default(),
        )?;
        self.top_level.retain(|r| !members.contains(r));
        self.top_level.push(id);
        Ok(id)
    }

    /// Appends a restraint to a set.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if `set` is not a restraint set or `member` not a
    /// restraint; `DependencyCycle` if the set would contain itself.
    pub fn add_to_restraint_set(&mut self, set: ObjectId, member: ObjectId) -> Result<()> {
        self.store.stage_cell().ensure_idle("change a restraint set")?;
        self.expect_restraint(member)?;
        if member == set || self.set_contains(member, set) {
            return Err(Error::new(ErrorKind::DependencyCycle {
                objects: vec![self.entry(set)?.name.clone(), self.entry(member)?.name.clone()],
            }));
        }
        let entry = self.entry_mut(set)?;
        match &mut entry.kind {
            EntryKind::Restraint {
                body: RestraintBody::Set(children),
                ..
            } => children.push(member),
            _ => {
                return Err(Error::new(ErrorKind::UnknownObject(format!(
                    "{} is a {}, not a restraint set",
                    entry.name,
                    entry.object_kind()
                ))));
            }
        }
        self.top_level.retain(|&r| r != member);
        self.invalidate();
        Ok(())
    }

    /// Returns true if `set` (transitively) contains `needle`.
    fn set_contains(&self, set: ObjectId, needle: ObjectId) -> bool {
        match self.objects.get(set).map(|e| &e.kind) {
            Some(EntryKind::Restraint {
                body: RestraintBody::Set(children),
                ..
            }) => children
                .iter()
                .any(|&c| c == needle || self.set_contains(c, needle)),
            _ => false,
        }
    }

    /// Registers a scoring function over `restraints`, with weight 1 and no maximum.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if a member is not a registered restraint or set.
    pub fn add_scoring_function(
        &mut self,
        name: impl Into<String>,
        restraints: &[ObjectId],
    ) -> Result<ObjectId> {
        for &r in restraints {
            self.expect_restraint(r)?;
        }
        self.insert(
            name.into(),
            EntryKind::ScoringFunction {
                restraints: restraints.to_vec(),
                scoring: Scoring::default(),
                good: AtomicBool::new(true),
            },
        )
    }

    /// Unregisters an object and drops every reference to it from sets and
    /// scoring functions.
    ///
    /// # Errors
    ///
    /// `InvalidState` during evaluation, `UnknownObject` if not registered.
    pub fn remove_object(&mut self, id: ObjectId) -> Result<()> {
        self.store.stage_cell().ensure_idle("remove an object")?;
        if self.objects.remove(id).is_none() {
            return Err(unknown(id));
        }
        for (_, entry) in &mut self.objects {
            entry.forget(id);
        }
        self.top_level.retain(|&r| r != id);
        self.invalidate();
        Ok(())
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub(crate) fn entry(&self, id: ObjectId) -> Result<&ObjectEntry> {
        self.objects.get(id).ok_or_else(|| unknown(id))
    }

    fn entry_mut(&mut self, id: ObjectId) -> Result<&mut ObjectEntry> {
        self.objects.get_mut(id).ok_or_else(|| unknown(id))
    }

    pub(crate) fn expect_restraint(&self, id: ObjectId) -> Result<&ObjectEntry> {
        let entry = self.entry(id)?;
        if entry.object_kind().is_restraint() {
            Ok(entry)
        } else {
            Err(Error::new(ErrorKind::UnknownObject(format!(
                "{} is a {}, not a restraint",
                entry.name,
                entry.object_kind()
            ))))
        }
    }

    fn scoring(&self, id: ObjectId) -> Result<&Scoring> {
        let entry = self.entry(id)?;
        entry.scoring().ok_or_else(|| not_scored(entry))
    }

    /// Returns true if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    /// Number of registered objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Name of a registered object.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if not registered.
    pub fn object_name(&self, id: ObjectId) -> Result<&str> {
        Ok(&self.entry(id)?.name)
    }

    /// Kind of a registered object.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if not registered.
    pub fn object_kind(&self, id: ObjectId) -> Result<ObjectKind> {
        Ok(self.entry(id)?.object_kind())
    }

    /// Restraints and sets evaluated by [`Model::evaluate`], in order.
    #[must_use]
    pub fn top_level_restraints(&self) -> &[ObjectId] {
        &self.top_level
    }

    /// Members of a restraint set or scoring function.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if `id` has no members.
    pub fn members(&self, id: ObjectId) -> Result<&[ObjectId]> {
        let entry = self.entry(id)?;
        match &entry.kind {
            EntryKind::Restraint {
                body: RestraintBody::Set(children),
                ..
            }
            | EntryKind::ScoringFunction {
                restraints: children,
                ..
            } => Ok(children),
            _ => Err(Error::new(ErrorKind::UnknownObject(format!(
                "{} is a {} and has no members",
                entry.name,
                entry.object_kind()
            )))),
        }
    }

    // =========================================================================
    // Weights and maxima
    // =========================================================================

    /// Sets the weight of a restraint, set or scoring function.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if `id` carries no weight.
    pub fn set_weight(&mut self, id: ObjectId, weight: f64) -> Result<()> {
        let entry = self.entry_mut(id)?;
        match entry.scoring_mut() {
            Some(scoring) => scoring.weight = weight,
            None => return Err(not_scored(entry)),
        }
        self.invalidate();
        Ok(())
    }

    /// Weight of a restraint, set or scoring function.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if `id` carries no weight.
    pub fn get_weight(&self, id: ObjectId) -> Result<f64> {
        Ok(self.scoring(id)?.weight)
    }

    /// Sets the maximum acceptable unweighted score; [`NO_MAX`] disables it.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if `id` carries no maximum.
    pub fn set_maximum_score(&mut self, id: ObjectId, max: f64) -> Result<()> {
        let entry = self.entry_mut(id)?;
        match entry.scoring_mut() {
            Some(scoring) => scoring.max = max,
            None => return Err(not_scored(entry)),
        }
        self.invalidate();
        Ok(())
    }

    /// Maximum acceptable unweighted score.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if `id` carries no maximum.
    pub fn get_maximum_score(&self, id: ObjectId) -> Result<f64> {
        Ok(self.scoring(id)?.max)
    }

    /// Unweighted score from the most recent evaluation that reached `id`.
    ///
    /// For sets this is the weighted sum of their members' scores.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if `id` is not scored.
    pub fn get_last_score(&self, id: ObjectId) -> Result<f64> {
        Ok(self.scoring(id)?.last_score())
    }

    /// True if `restraint` has an explicit maximum.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if `id` carries no maximum.
    pub fn has_maximum_score(&self, id: ObjectId) -> Result<bool> {
        Ok(self.scoring(id)?.max < NO_MAX)
    }

    // =========================================================================
    // Dependency graph
    // =========================================================================

    /// Rebuilds the dependency graph if stale and returns it.
    ///
    /// # Errors
    ///
    /// `DependencyCycle` if score states depend on each other circularly,
    /// `UnknownObject` if an object declares an unregistered object.
    pub fn ensure_dependencies(&mut self) -> Result<&DependencyGraph> {
        if self.graph.is_none() {
            self.graph = Some(DependencyGraph::build(&self.objects)?);
            self.validated = false;
        }
        self.graph
            .as_ref()
            .ok_or_else(|| Error::internal("dependency graph missing after rebuild"))
    }

    /// Score-state waves for evaluating `targets`, cached on the graph.
    pub(crate) fn schedule(&mut self, targets: &[ObjectId]) -> Result<Arc<[Vec<ObjectId>]>> {
        self.ensure_dependencies()?;
        self.graph
            .as_mut()
            .map(|graph| graph.schedule(targets))
            .ok_or_else(|| Error::internal("dependency graph missing after rebuild"))
    }

    /// The current dependency graph, or `None` if it is stale.
    #[must_use]
    pub fn dependency_graph(&self) -> Option<&DependencyGraph> {
        self.graph.as_ref()
    }

    /// Update order of a score state.
    ///
    /// # Errors
    ///
    /// Rebuild errors, or `UnknownObject` if `state` is not a score state.
    pub fn get_update_order(&mut self, state: ObjectId) -> Result<usize> {
        let kind = self.object_kind(state)?;
        let graph = self.ensure_dependencies()?;
        graph.update_order(state).ok_or_else(|| {
            Error::new(ErrorKind::UnknownObject(format!(
                "{state:?} is a {kind}, not a score state"
            )))
        })
    }

    /// The score states that must run before evaluating `objects`, in order.
    ///
    /// # Errors
    ///
    /// Rebuild errors, or `UnknownObject` for an unregistered object.
    pub fn get_required_score_states(&mut self, objects: &[ObjectId]) -> Result<Vec<ObjectId>> {
        for &id in objects {
            self.entry(id)?;
        }
        Ok(self.ensure_dependencies()?.required_score_states(objects))
    }

    /// Restraints and sets whose inputs (transitively) include `particle`.
    ///
    /// # Errors
    ///
    /// Rebuild errors, or `UnknownParticle` if the particle is not live.
    pub fn get_dependent_restraints(&mut self, particle: ParticleIndex) -> Result<Vec<ObjectId>> {
        if !self.store.is_live(particle) {
            return Err(Error::unknown_particle(particle));
        }
        let downstream = self
            .ensure_dependencies()?
            .downstream(ModelNode::Particle(particle));
        let mut restraints: Vec<ObjectId> = downstream
            .into_iter()
            .filter_map(|node| match node {
                ModelNode::Object(id) => Some(id),
                ModelNode::Particle(_) => None,
            })
            .filter(|&id| {
                self.objects
                    .get(id)
                    .is_some_and(|e| e.object_kind().is_restraint())
            })
            .collect();
        restraints.sort_by_key(|&id| self.objects[id].sequence);
        Ok(restraints)
    }
}

fn unknown(id: ObjectId) -> Error {
    Error::new(ErrorKind::UnknownObject(format!("{id:?}")))
}

fn not_scored(entry: &ObjectEntry) -> Error {
    Error::new(ErrorKind::UnknownObject(format!(
        "{} is a {}, which has no weight or maximum",
        entry.name,
        entry.object_kind()
    )))
}
