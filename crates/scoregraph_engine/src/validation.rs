//! Access masks derived from declared inputs and outputs.
//!
//! Only compiled with the `checks` feature. Masks are per particle: an object
//! that declares a particle (directly, or through a container or the outputs
//! of a score state) may touch any attribute of it.

use std::collections::{HashMap, HashSet};

use scoregraph_foundation::ParticleIndex;
use scoregraph_storage::{AccessMasks, Mask};

use crate::object::{ModelNode, ObjectId};
use crate::registry::{EntryKind, ObjectMap};

/// Particles reachable from `node` for access purposes.
fn collect_particles(
    objects: &ObjectMap,
    node: ModelNode,
    seen: &mut HashSet<ObjectId>,
    out: &mut Vec<ParticleIndex>,
) {
    match node {
        ModelNode::Particle(p) => out.push(p),
        ModelNode::Object(id) => {
            if !seen.insert(id) {
                return;
            }
            let Some(entry) = objects.get(id) else {
                return;
            };
            let nested = match &entry.kind {
                EntryKind::Container(_) => {
                    let mut all = entry.inputs();
                    all.extend(entry.outputs());
                    all
                }
                EntryKind::ScoreState(_) => entry.outputs(),
                _ => Vec::new(),
            };
            for n in nested {
                collect_particles(objects, n, seen, out);
            }
        }
    }
}

fn particles(objects: &ObjectMap, nodes: Vec<ModelNode>) -> Vec<ParticleIndex> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for node in nodes {
        collect_particles(objects, node, &mut seen, &mut out);
    }
    out
}

fn allow_all(mask: &mut Mask, particles: &[ParticleIndex]) {
    for &p in particles {
        mask.allow(p);
    }
}

/// Masks for every score state and leaf restraint.
///
/// Score states may read their inputs and outputs, write and add cache
/// attributes to their outputs, and read or write derivatives of either.
/// Restraints may read their inputs and accumulate derivatives into them.
pub(crate) fn build_masks(objects: &ObjectMap, capacity: usize) -> HashMap<ObjectId, AccessMasks> {
    let mut masks = HashMap::new();
    for (id, entry) in objects {
        let is_state = match &entry.kind {
            EntryKind::ScoreState(_) => true,
            EntryKind::Restraint { .. } => false,
            _ => continue,
        };
        let label = format!("{} {}", entry.object_kind(), entry.name);
        let inputs = particles(objects, entry.inputs());
        let outputs = particles(objects, entry.outputs());
        let mut m = AccessMasks::new(label, capacity);

        allow_all(&mut m.read, &inputs);
        allow_all(&mut m.read_derivatives, &inputs);
        allow_all(&mut m.write_derivatives, &inputs);
        if is_state {
            allow_all(&mut m.read, &outputs);
            allow_all(&mut m.write, &outputs);
            allow_all(&mut m.add_remove, &outputs);
            allow_all(&mut m.read_derivatives, &outputs);
            allow_all(&mut m.write_derivatives, &outputs);
        }
        masks.insert(id, m);
    }
    masks
}
