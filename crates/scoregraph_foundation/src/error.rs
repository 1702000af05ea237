//! Error types for scoregraph.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.

use std::fmt;

use thiserror::Error;

use crate::attribute::KeyKind;
use crate::particle::ParticleIndex;

/// The main error type for scoregraph operations.
#[derive(Debug, Error)]
#[error("{kind}{}", .context.as_ref().map(|c| c.to_string()).unwrap_or_default())]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error, replacing any existing context.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Pushes a frame onto this error's context stack, creating the context if needed.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        let context = self.context.take().unwrap_or_default();
        self.context = Some(context.with_frame(frame));
        self
    }

    /// Creates a missing attribute error.
    #[must_use]
    pub fn missing_attribute(key: impl Into<String>, particle: ParticleIndex) -> Self {
        Self::new(ErrorKind::MissingAttribute {
            key: key.into(),
            particle,
        })
    }

    /// Creates a duplicate attribute error.
    #[must_use]
    pub fn duplicate_attribute(key: impl Into<String>, particle: ParticleIndex) -> Self {
        Self::new(ErrorKind::DuplicateAttribute {
            key: key.into(),
            particle,
        })
    }

    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid_value(key: impl Into<String>, particle: ParticleIndex) -> Self {
        Self::new(ErrorKind::InvalidValue {
            key: key.into(),
            particle,
        })
    }

    /// Creates an invalid state error.
    #[must_use]
    pub fn invalid_state(operation: impl Into<String>, stage: &'static str) -> Self {
        Self::new(ErrorKind::InvalidState {
            operation: operation.into(),
            stage,
        })
    }

    /// Creates an unknown particle error.
    #[must_use]
    pub fn unknown_particle(particle: ParticleIndex) -> Self {
        Self::new(ErrorKind::UnknownParticle(particle))
    }

    /// Creates an error reported by collaborator code during evaluation.
    #[must_use]
    pub fn evaluation(object: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EvaluationFailed {
            object: object.into(),
            message: message.into(),
        })
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(message.into()))
    }

    /// Returns true for errors that indicate broken engine invariants.
    ///
    /// These are returned rather than panicking, but they are not meant to be
    /// caught and retried.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Corruption { .. } | ErrorKind::DependencyCycle { .. } | ErrorKind::Internal(_)
        )
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// A key was looked up in a kind that does not create keys implicitly.
    #[error("no {kind} key named {name:?} is registered")]
    Lookup {
        /// The key space searched.
        kind: KeyKind,
        /// The requested name.
        name: String,
    },

    /// A key index that was never handed out by the registry.
    #[error("{kind} key #{index} was never registered")]
    Corruption {
        /// The key space.
        kind: KeyKind,
        /// The raw index.
        index: u32,
    },

    /// The attribute is already present on the particle.
    #[error("attribute {key} already present on {particle}")]
    DuplicateAttribute {
        /// The attribute key, by name.
        key: String,
        /// The particle.
        particle: ParticleIndex,
    },

    /// The attribute is not present on the particle.
    #[error("attribute {key} not present on {particle}")]
    MissingAttribute {
        /// The attribute key, by name.
        key: String,
        /// The particle.
        particle: ParticleIndex,
    },

    /// The value equals the kind's reserved invalid sentinel.
    #[error("cannot store the invalid sentinel in attribute {key} of {particle}")]
    InvalidValue {
        /// The attribute key, by name.
        key: String,
        /// The particle.
        particle: ParticleIndex,
    },

    /// A structural mutation was attempted while the model is evaluating.
    #[error("cannot {operation} while the model is {stage}")]
    InvalidState {
        /// The rejected operation.
        operation: String,
        /// The evaluation stage at the time.
        stage: &'static str,
    },

    /// An object touched an attribute outside its declared inputs and outputs.
    #[error("{object} attempted to {access} attribute {key} of {particle}, which it did not declare")]
    InputOutputViolation {
        /// Name of the offending object.
        object: String,
        /// The attribute key, by name.
        key: String,
        /// The particle touched.
        particle: ParticleIndex,
        /// The operation attempted.
        access: AccessKind,
    },

    /// The particle index is not live in this model.
    #[error("particle not found: {0}")]
    UnknownParticle(ParticleIndex),

    /// The object is not registered with this model, or has the wrong kind.
    #[error("object not found: {0}")]
    UnknownObject(String),

    /// A score state or restraint reported a failure.
    #[error("{object} failed: {message}")]
    EvaluationFailed {
        /// Name of the failing object.
        object: String,
        /// What went wrong.
        message: String,
    },

    /// The score-state dependency graph has a cycle.
    #[error("score states form a dependency cycle: {}", .objects.join(" -> "))]
    DependencyCycle {
        /// Names of score states on or feeding the cycle.
        objects: Vec<String>,
    },

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// The attribute operation named in an input/output violation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AccessKind {
    /// Reading a value.
    Get,
    /// Overwriting a value.
    Set,
    /// Adding an attribute.
    Add,
    /// Removing an attribute.
    Remove,
    /// Reading a derivative.
    ReadDerivative,
    /// Accumulating into a derivative.
    WriteDerivative,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Add => "add",
            Self::Remove => "remove",
            Self::ReadDerivative => "read the derivative of",
            Self::WriteDerivative => "write the derivative of",
        };
        f.write_str(name)
    }
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Evaluation stage when the error surfaced, if any.
    pub stage: Option<String>,
    /// Chain of objects the error propagated through, innermost first.
    pub stack: Vec<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the evaluation stage.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Adds a stack frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack.push(frame.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(stage) = &self.stage {
            write!(f, " (while {stage})")?;
        }
        for frame in &self.stack {
            write!(f, "\n  in {frame}")?;
        }
        Ok(())
    }
}

/// Result type alias using the scoregraph [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
