//! The dependency graph between particles and registered objects.
//!
//! Edges point from what is read to what reads it: `input -> object` and
//! `object -> output`. A node that is both an input and an output of the same
//! object gets both edges; the resulting two-cycle through the object itself
//! is ignored when ordering. Score states are ordered so that a state runs
//! after every state whose outputs it (transitively) consumes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, instrument};

use scoregraph_foundation::{Error, ErrorKind, Result};

use crate::object::{ModelNode, ObjectId};
use crate::registry::ObjectMap;

/// Snapshot of the dependency structure, rebuilt whenever the model changes.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<ModelNode, ()>,
    indices: HashMap<ModelNode, NodeIndex>,
    update_order: HashMap<ObjectId, usize>,
    sequence: HashMap<ObjectId, u64>,
    waves: usize,
    /// Waves already computed for a target list.
    schedules: HashMap<Vec<ObjectId>, Arc<[Vec<ObjectId>]>>,
}

/// Distinct target lists remembered per graph before the cache is reset.
const SCHEDULE_CACHE_LIMIT: usize = 64;

impl DependencyGraph {
    /// Builds the graph from every registered object.
    #[instrument(skip_all, name = "rebuild_dependencies", fields(objects = objects.len()))]
    pub(crate) fn build(objects: &ObjectMap) -> Result<Self> {
        let mut entries: Vec<_> = objects.iter().collect();
        entries.sort_by_key(|(_, entry)| entry.sequence);

        let mut graph = Self::default();
        for (id, entry) in &entries {
            graph.node(ModelNode::Object(*id));
            graph.sequence.insert(*id, entry.sequence);
        }

        for (id, entry) in &entries {
            let this = ModelNode::Object(*id);
            for output in entry.outputs() {
                check_known(objects, output, "an output", &entry.name)?;
                graph.edge(this, output);
            }
            for input in entry.inputs() {
                check_known(objects, input, "an input", &entry.name)?;
                graph.edge(input, this);
            }
        }

        graph.order_score_states(objects)?;

        debug!(
            vertices = graph.vertex_count(),
            edges = graph.edge_count(),
            score_states = graph.update_order.len(),
            waves = graph.waves,
            "rebuilt dependency graph"
        );
        Ok(graph)
    }

    fn node(&mut self, node: ModelNode) -> NodeIndex {
        if let Some(&index) = self.indices.get(&node) {
            return index;
        }
        let index = self.graph.add_node(node);
        self.indices.insert(node, index);
        index
    }

    fn edge(&mut self, from: ModelNode, to: ModelNode) {
        let a = self.node(from);
        let b = self.node(to);
        self.graph.update_edge(a, b, ());
    }

    /// Assigns every score state `1 + max(update order of its prerequisites)`.
    fn order_score_states(&mut self, objects: &ObjectMap) -> Result<()> {
        let mut states: DiGraph<ObjectId, ()> = DiGraph::new();
        let mut state_index = HashMap::new();
        let mut ids: Vec<ObjectId> = objects
            .iter()
            .filter(|(_, entry)| entry.is_score_state())
            .map(|(id, _)| id)
            .collect();
        ids.sort_by_key(|id| self.sequence[id]);
        for &id in &ids {
            state_index.insert(id, states.add_node(id));
        }

        // A prerequisite is the nearest score state upstream along any path.
        for &id in &ids {
            let start = self.indices[&ModelNode::Object(id)];
            let mut stack: Vec<NodeIndex> = self
                .graph
                .neighbors_directed(start, Direction::Incoming)
                .collect();
            let mut seen = HashSet::new();
            while let Some(n) = stack.pop() {
                if n == start || !seen.insert(n) {
                    continue;
                }
                match self.graph[n] {
                    ModelNode::Object(other) if state_index.contains_key(&other) => {
                        states.update_edge(state_index[&other], state_index[&id], ());
                    }
                    _ => stack.extend(self.graph.neighbors_directed(n, Direction::Incoming)),
                }
            }
        }

        let sorted = toposort(&states, None).map_err(|cycle| {
            let on_cycle = tarjan_scc(&states)
                .into_iter()
                .find(|component| component.contains(&cycle.node_id()))
                .unwrap_or_else(|| vec![cycle.node_id()]);
            let mut members: Vec<ObjectId> = on_cycle.into_iter().map(|n| states[n]).collect();
            members.sort_by_key(|id| self.sequence[id]);
            Error::new(ErrorKind::DependencyCycle {
                objects: members
                    .into_iter()
                    .map(|id| objects[id].name.clone())
                    .collect(),
            })
        })?;

        for n in sorted {
            let order = states
                .neighbors_directed(n, Direction::Incoming)
                .map(|p| self.update_order[&states[p]] + 1)
                .max()
                .unwrap_or(0);
            self.update_order.insert(states[n], order);
            self.waves = self.waves.max(order + 1);
        }
        Ok(())
    }

    /// Number of vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Number of distinct update orders among score states.
    #[must_use]
    pub fn wave_count(&self) -> usize {
        self.waves
    }

    /// Returns true if the graph has an edge `from -> to`.
    #[must_use]
    pub fn has_edge(&self, from: ModelNode, to: ModelNode) -> bool {
        match (self.indices.get(&from), self.indices.get(&to)) {
            (Some(&a), Some(&b)) => self.graph.contains_edge(a, b),
            _ => false,
        }
    }

    /// Update order of a score state.
    #[must_use]
    pub fn update_order(&self, state: ObjectId) -> Option<usize> {
        self.update_order.get(&state).copied()
    }

    /// Every score state, sorted by update order then registration order.
    #[must_use]
    pub fn score_states(&self) -> Vec<ObjectId> {
        let mut states: Vec<ObjectId> = self.update_order.keys().copied().collect();
        self.sort_states(&mut states);
        states
    }

    /// The score states upstream of any of `targets`, sorted by update order
    /// then registration order, without duplicates.
    #[must_use]
    pub fn required_score_states(&self, targets: &[ObjectId]) -> Vec<ObjectId> {
        let mut stack: Vec<NodeIndex> = targets
            .iter()
            .filter_map(|id| self.indices.get(&ModelNode::Object(*id)))
            .flat_map(|&n| self.graph.neighbors_directed(n, Direction::Incoming))
            .collect();
        let mut seen = HashSet::new();
        let mut required = Vec::new();
        while let Some(n) = stack.pop() {
            if !seen.insert(n) {
                continue;
            }
            if let ModelNode::Object(id) = self.graph[n] {
                if self.update_order.contains_key(&id) {
                    required.push(id);
                }
            }
            stack.extend(self.graph.neighbors_directed(n, Direction::Incoming));
        }
        self.sort_states(&mut required);
        required
    }

    /// Splits sorted score states into waves of equal update order.
    #[must_use]
    pub fn waves(&self, states: &[ObjectId]) -> Vec<Vec<ObjectId>> {
        let mut waves: Vec<Vec<ObjectId>> = Vec::new();
        let mut current = None;
        for &id in states {
            let order = self.update_order(id);
            if current != Some(order) || waves.is_empty() {
                waves.push(Vec::new());
                current = Some(order);
            }
            if let Some(wave) = waves.last_mut() {
                wave.push(id);
            }
        }
        waves
    }

    /// The waves of score states required by `targets`, computed once per
    /// distinct target list for the lifetime of this graph.
    pub(crate) fn schedule(&mut self, targets: &[ObjectId]) -> Arc<[Vec<ObjectId>]> {
        if let Some(waves) = self.schedules.get(targets) {
            return Arc::clone(waves);
        }
        if self.schedules.len() >= SCHEDULE_CACHE_LIMIT {
            self.schedules.clear();
        }
        let waves: Arc<[Vec<ObjectId>]> = self.waves(&self.required_score_states(targets)).into();
        self.schedules.insert(targets.to_vec(), Arc::clone(&waves));
        waves
    }

    /// Number of target lists with a cached schedule.
    #[must_use]
    pub fn cached_schedules(&self) -> usize {
        self.schedules.len()
    }

    /// Every node reachable downstream of `node`.
    #[must_use]
    pub fn downstream(&self, node: ModelNode) -> Vec<ModelNode> {
        let Some(&start) = self.indices.get(&node) else {
            return Vec::new();
        };
        let mut stack: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(start, Direction::Outgoing)
            .collect();
        let mut seen = HashSet::new();
        let mut reached = Vec::new();
        while let Some(n) = stack.pop() {
            if !seen.insert(n) {
                continue;
            }
            reached.push(self.graph[n]);
            stack.extend(self.graph.neighbors_directed(n, Direction::Outgoing));
        }
        reached
    }

    fn sort_states(&self, states: &mut [ObjectId]) {
        states.sort_by_key(|id| {
            (
                self.update_order.get(id).copied().unwrap_or(usize::MAX),
                self.sequence.get(id).copied().unwrap_or(u64::MAX),
            )
        });
    }
}

fn check_known(objects: &ObjectMap, node: ModelNode, role: &str, owner: &str) -> Result<()> {
    match node {
        ModelNode::Object(id) if !objects.contains_key(id) => Err(Error::new(
            ErrorKind::UnknownObject(format!("{id:?}, declared as {role} of {owner}")),
        )),
        _ => Ok(()),
    }
}
