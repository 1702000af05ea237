//! Declared input/output enforcement on the first evaluation after a rebuild

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use scoregraph_engine::{
    CheckLevel, EngineConfig, Model, ModelNode, ModelObject, Restraint, RestraintContext,
    ScoreState,
};
use scoregraph_foundation::{AccessKind, ErrorKind, FloatKey, KeyRegistry, ParticleIndex, Result};
use scoregraph_storage::AttributeViewMut;

use crate::support::{Recorder, Sneaky, journal, model, particles};

fn sneaky(model: &mut Model, cheat: bool) -> (Arc<Sneaky>, Vec<ParticleIndex>) {
    let ps = particles(model, 2);
    let restraint = Arc::new(Sneaky {
        declared: ps[0],
        hidden: ps[1],
        cheat: AtomicBool::new(cheat),
    });
    model.add_restraint(restraint.clone()).unwrap();
    (restraint, ps)
}

fn assert_violation(err: &scoregraph_foundation::Error, who: &str, expected: AccessKind) {
    match &err.kind {
        ErrorKind::InputOutputViolation {
            object,
            key,
            access,
            ..
        } => {
            assert_eq!(object, who);
            assert_eq!(key, "x (float)");
            assert_eq!(*access, expected);
        }
        other => panic!("expected an input/output violation, got {other:?}"),
    }
}

#[test]
fn undeclared_read_is_rejected() {
    let mut model = model();
    let (_, ps) = sneaky(&mut model, true);

    let err = model.evaluate(false).unwrap_err();
    assert_violation(&err, "restraint sneaky", AccessKind::Get);
    assert!(err.to_string().contains(&ps[1].to_string()));
    assert!(!err.is_fatal());
}

#[test]
fn checks_can_be_switched_off() {
    let mut model = Model::with_config(
        KeyRegistry::shared(),
        EngineConfig::new().with_check_level(CheckLevel::None),
    );
    sneaky(&mut model, true);
    assert_eq!(model.evaluate(false).unwrap(), 1.0);
}

#[test]
fn only_the_first_evaluation_after_a_rebuild_is_checked() {
    let mut model = model();
    let (restraint, _) = sneaky(&mut model, false);
    let top = model.top_level_restraints()[0];

    assert_eq!(model.evaluate(false).unwrap(), 0.0);
    restraint.cheat.store(true, Ordering::Relaxed);
    assert_eq!(model.evaluate(false).unwrap(), 1.0);

    // Any structural change forces another checked pass.
    model.set_weight(top, 1.0).unwrap();
    assert!(model.evaluate(false).is_err());
}

#[test]
fn a_failed_check_keeps_checking() {
    let mut model = model();
    let (restraint, _) = sneaky(&mut model, true);
    assert!(model.evaluate(false).is_err());
    assert!(model.evaluate(false).is_err());

    restraint.cheat.store(false, Ordering::Relaxed);
    assert_eq!(model.evaluate(false).unwrap(), 0.0);
}

#[test]
fn has_is_never_masked() {
    #[derive(Debug)]
    struct Peek(ParticleIndex);

    impl ModelObject for Peek {
        fn name(&self) -> &str {
            "peek"
        }
    }

    impl Restraint for Peek {
        fn unprotected_evaluate(&self, context: &RestraintContext<'_>) -> Result<f64> {
            Ok(if context.has(FloatKey::X, self.0) { 1.0 } else { 0.0 })
        }
    }

    let mut model = model();
    let ps = particles(&mut model, 1);
    model.add_restraint(Arc::new(Peek(ps[0]))).unwrap();
    assert_eq!(model.evaluate(false).unwrap(), 1.0);
}

/// Copies x from `from` onto `to`, optionally clobbering `from` as well.
#[derive(Debug)]
struct Mirror {
    from: ParticleIndex,
    to: ParticleIndex,
    clobber: bool,
}

impl ModelObject for Mirror {
    fn name(&self) -> &str {
        "mirror"
    }

    fn inputs(&self) -> Vec<ModelNode> {
        vec![self.from.into()]
    }

    fn outputs(&self) -> Vec<ModelNode> {
        vec![self.to.into()]
    }
}

impl ScoreState for Mirror {
    fn before_evaluate(&self, attributes: &mut AttributeViewMut<'_>) -> Result<()> {
        let x = attributes.get(FloatKey::X, self.from)?;
        attributes.set(FloatKey::X, self.to, x)?;
        if self.clobber {
            attributes.set(FloatKey::X, self.from, 0.0)?;
        }
        Ok(())
    }
}

#[test]
fn score_states_write_only_their_outputs() {
    let mut model = model();
    let ps = particles(&mut model, 2);
    model
        .add_score_state(Arc::new(Mirror {
            from: ps[1],
            to: ps[0],
            clobber: false,
        }))
        .unwrap();
    model.update().unwrap();
    assert_eq!(model.attributes().get(FloatKey::X, ps[0]).unwrap(), 1.0);

    let mut model = self::model();
    let ps = particles(&mut model, 2);
    model
        .add_score_state(Arc::new(Mirror {
            from: ps[1],
            to: ps[0],
            clobber: true,
        }))
        .unwrap();
    let err = model.update().unwrap_err();
    assert_violation(&err, "score state mirror", AccessKind::Set);
}

#[test]
fn restraints_may_read_through_containers_and_score_states() {
    let mut model = model();
    let ps = particles(&mut model, 3);
    let group = model
        .add_container(Recorder::new("group", vec![ps[0].into()], Vec::new(), &journal()))
        .unwrap();
    let mirror = model
        .add_score_state(Arc::new(Mirror {
            from: ps[1],
            to: ps[2],
            clobber: false,
        }))
        .unwrap();

    #[derive(Debug)]
    struct Reader {
        inputs: Vec<ModelNode>,
        reads: Vec<ParticleIndex>,
    }

    impl ModelObject for Reader {
        fn name(&self) -> &str {
            "reader"
        }

        fn inputs(&self) -> Vec<ModelNode> {
            self.inputs.clone()
        }
    }

    impl Restraint for Reader {
        fn unprotected_evaluate(&self, context: &RestraintContext<'_>) -> Result<f64> {
            let mut total = 0.0;
            for &p in &self.reads {
                total += context.get(FloatKey::X, p)?;
            }
            Ok(total)
        }
    }

    model
        .add_restraint(Arc::new(Reader {
            inputs: vec![group.into(), mirror.into()],
            reads: vec![ps[0], ps[2]],
        }))
        .unwrap();
    assert_eq!(model.evaluate(false).unwrap(), 1.0);

    // The inputs of a score state are not readable through it.
    let mut model = self::model();
    let ps = particles(&mut model, 2);
    let mirror = model
        .add_score_state(Arc::new(Mirror {
            from: ps[1],
            to: ps[0],
            clobber: false,
        }))
        .unwrap();
    model
        .add_restraint(Arc::new(Reader {
            inputs: vec![mirror.into()],
            reads: vec![ps[1]],
        }))
        .unwrap();
    let err = model.evaluate(false).unwrap_err();
    assert_violation(&err, "restraint reader", AccessKind::Get);
}

#[test]
fn undeclared_derivatives_are_rejected() {
    #[derive(Debug)]
    struct Push {
        declared: ParticleIndex,
        pushed: ParticleIndex,
    }

    impl ModelObject for Push {
        fn name(&self) -> &str {
            "push"
        }

        fn inputs(&self) -> Vec<ModelNode> {
            vec![self.declared.into()]
        }
    }

    impl Restraint for Push {
        fn unprotected_evaluate(&self, context: &RestraintContext<'_>) -> Result<f64> {
            context.add_to_derivative(FloatKey::X, self.pushed, 1.0)?;
            Ok(0.0)
        }
    }

    let mut model = model();
    let ps = particles(&mut model, 2);
    model
        .add_restraint(Arc::new(Push {
            declared: ps[0],
            pushed: ps[1],
        }))
        .unwrap();
    // Without derivatives nothing is accumulated and nothing is checked.
    assert_eq!(model.evaluate(false).unwrap(), 0.0);

    let top = model.top_level_restraints()[0];
    model.set_weight(top, 1.0).unwrap();
    let err = model.evaluate(true).unwrap_err();
    assert_violation(&err, "restraint push", AccessKind::WriteDerivative);
}
