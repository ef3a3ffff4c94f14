//! Engine error type
//!
//! Every pipeline operation returns `Result<_, EngineError>`. Only
//! [`EngineError::Validation`] is recoverable; everything else aborts the
//! build in progress.

use crate::config::ConfigError;
use crate::report::ValidationFailure;
use arbor_merge::MergeError;
use arbor_model::{HookError, ModelError, PhaseId, SchemaError};

/// Errors raised while building or finishing a model tree
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Schema misconfiguration
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Model contract violation
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Template or merge failure
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// Configuration document rejected
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// User hook, provider or deferred callback failed
    #[error("{phase} hook failed: {source}")]
    Hook {
        /// Phase in which the hook ran
        phase: PhaseId,
        /// Hook failure
        #[source]
        source: HookError,
    },

    /// A phase kept discovering new nodes
    #[error("phase '{phase}' did not stabilise after {rounds} rounds")]
    Unstable {
        /// Offending phase
        phase: PhaseId,
        /// Rounds taken
        rounds: usize,
    },

    /// Custom phase declared without an action
    #[error("no action bound to phase '{0}'")]
    UnboundPhase(PhaseId),

    /// Action bound to a phase the registry does not declare
    #[error("phase '{0}' is not declared in the registry")]
    UndeclaredPhase(PhaseId),

    /// Templates never run through phases
    #[error("'{0}' object is a template and cannot be finished")]
    TemplateNotExecutable(String),

    /// Validation threshold reached
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
}

impl EngineError {
    /// Create hook error
    #[inline]
    #[must_use]
    pub fn hook(phase: &PhaseId, source: HookError) -> Self {
        Self::Hook {
            phase: phase.clone(),
            source,
        }
    }

    /// Whether the build produced a usable tree despite the error
    ///
    /// Only validation failures qualify: the tree is complete and the
    /// issues can be inspected.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Validation failure, if this is one
    #[must_use]
    pub fn as_validation(&self) -> Option<&ValidationFailure> {
        match self {
            Self::Validation(failure) => Some(failure),
            _ => None,
        }
    }
}
