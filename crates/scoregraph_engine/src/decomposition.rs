//! Splitting restraints into independently scored parts.

use std::sync::Arc;

use tracing::{debug, warn};

use scoregraph_foundation::{Error, Result};

use crate::accumulator::NO_MAX;
use crate::model::Model;
use crate::object::{ObjectId, Restraint};
use crate::registry::{EntryKind, RestraintBody, Scoring};

impl Model {
    /// Registers the decomposition of a restraint or set and returns its id.
    ///
    /// A leaf restraint becomes the parts returned by
    /// [`Restraint::create_decomposition`], grouped in a set carrying the
    /// original weight and maximum; a leaf that does not decompose is
    /// re-registered as is. A set decomposes each member. The result is not
    /// added to the top-level restraints.
    ///
    /// With usage checks enabled both are evaluated and a mismatch beyond the
    /// configured tolerance is logged as a warning. If anything fails, every
    /// object registered for the decomposition is removed again.
    ///
    /// # Errors
    ///
    /// `UnknownObject` if `restraint` is not a restraint, or any error from
    /// the cross-check evaluations.
    pub fn create_decomposition(&mut self, restraint: ObjectId) -> Result<ObjectId> {
        let mut created = Vec::new();
        let result = self
            .decompose(restraint, &mut created)
            .and_then(|decomposition| {
                self.cross_check(restraint, decomposition)?;
                Ok(decomposition)
            });
        if result.is_err() {
            self.discard(&created);
        }
        result
    }

    fn cross_check(&mut self, restraint: ObjectId, decomposition: ObjectId) -> Result<()> {
        if !self.config.checks_enabled() {
            return Ok(());
        }
        let original = self.evaluate_restraint(restraint, false)?;
        let parts = self.evaluate_restraint(decomposition, false)?;
        if !self.config.scores_agree(original, parts) {
            warn!(
                restraint = self.object_name(restraint)?,
                original,
                decomposed = parts,
                "decomposition score differs from the original"
            );
        }
        Ok(())
    }

    fn discard(&mut self, created: &[ObjectId]) {
        for &id in created.iter().rev() {
            if let Err(err) = self.remove_object(id) {
                warn!(error = %err, "could not remove a partial decomposition");
            }
        }
    }

    fn decompose(&mut self, id: ObjectId, created: &mut Vec<ObjectId>) -> Result<ObjectId> {
        let entry = self.expect_restraint(id)?;
        let name = entry.name.clone();
        let (body, weight, max) = match &entry.kind {
            EntryKind::Restraint { body, scoring } => (body.clone(), scoring.weight, scoring.max),
            _ => return Err(Error::internal(format!("{name} is not a restraint entry"))),
        };

        let decomposition = match body {
            RestraintBody::Leaf(restraint) => {
                let parts = restraint.create_decomposition();
                debug!(restraint = %name, parts = parts.len(), "decomposing");
                if parts.len() > 1 {
                    let mut members = Vec::with_capacity(parts.len());
                    for part in parts {
                        let part_name = part.name().to_string();
                        let member = self.insert_leaf(part_name, part, 1.0, NO_MAX)?;
                        created.push(member);
                        members.push(member);
                    }
                    self.insert_restraint(
                        name,
                        RestraintBody::Set(members),
                        Scoring::new(weight, max),
                    )?
                } else {
                    let part = parts.into_iter().next().unwrap_or(restraint);
                    self.insert_leaf(name, part, weight, max)?
                }
            }
            RestraintBody::Set(children) => {
                let mut members = Vec::with_capacity(children.len());
                for child in children {
                    members.push(self.decompose(child, created)?);
                }
                self.insert_restraint(name, RestraintBody::Set(members), Scoring::new(weight, max))?
            }
        };
        created.push(decomposition);
        Ok(decomposition)
    }

    fn insert_leaf(
        &mut self,
        name: String,
        restraint: Arc<dyn Restraint>,
        weight: f64,
        max: f64,
    ) -> Result<ObjectId> {
        self.insert_restraint(name, RestraintBody::Leaf(restraint), Scoring::new(weight, max))
    }
}
