//! Phase driver
//!
//! Runs every phase of the registry's phase order over a root object, one
//! phase to completion before the next. At the start of each phase the
//! deferred callbacks bound to it are drained in registration order.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::visitor::{collect, visit_unseen, Visit};
use arbor_model::{ObjectRef, PhaseId, SchemaRegistry, Severity};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Whether verification raises or only reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Raise once the threshold is met
    Enforce {
        /// Minimum severity that fails the build
        threshold: Severity,
    },

    /// Collect issues without raising
    Inspect,
}

/// Shared state handed to every phase action
#[derive(Debug, Clone, Copy)]
pub struct PhaseContext<'a> {
    /// Phase being run
    pub phase: &'a PhaseId,

    /// Registry the tree was built from
    pub registry: &'a SchemaRegistry,

    /// Engine configuration
    pub config: &'a EngineConfig,

    /// Verification mode
    pub mode: RunMode,
}

/// One lifecycle stage over a whole tree
pub trait PhaseAction: Send + Sync {
    /// Run the stage
    ///
    /// # Errors
    /// Any fatal [`EngineError`]; validation issues are recorded on the
    /// nodes instead.
    fn run(&self, root: &ObjectRef, ctx: &PhaseContext<'_>) -> Result<(), EngineError>;
}

/// Per-node body of a [`NodePhase`]
pub trait NodeAction: Send + Sync {
    /// Process one node
    ///
    /// # Errors
    /// Any fatal [`EngineError`].
    fn apply(&self, visit: &Visit<'_>, ctx: &PhaseContext<'_>) -> Result<(), EngineError>;
}

impl<F> NodeAction for F
where
    F: Fn(&Visit<'_>, &PhaseContext<'_>) -> Result<(), EngineError> + Send + Sync,
{
    fn apply(&self, visit: &Visit<'_>, ctx: &PhaseContext<'_>) -> Result<(), EngineError> {
        self(visit, ctx)
    }
}

/// Runs a [`NodeAction`] on every node until the tree stops growing
///
/// Nodes created by the action below the node being processed are picked
/// up in the same walk; nodes created elsewhere are picked up by a re-scan.
/// Each node is processed exactly once per phase.
pub struct NodePhase<A>(pub A);

impl<A> NodePhase<A> {
    /// Wrap a per-node action
    #[inline]
    #[must_use]
    pub fn new(action: A) -> Self {
        Self(action)
    }
}

impl<A> fmt::Debug for NodePhase<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NodePhase")
    }
}

impl<A: NodeAction> PhaseAction for NodePhase<A> {
    fn run(&self, root: &ObjectRef, ctx: &PhaseContext<'_>) -> Result<(), EngineError> {
        let mut seen = HashSet::new();
        let mut rounds = 0;
        loop {
            let visited = visit_unseen(root, &mut seen, |visit| self.0.apply(visit, ctx))?;
            if visited == 0 {
                break;
            }
            rounds += 1;
            if rounds > ctx.config.max_stabilization_rounds {
                return Err(EngineError::Unstable {
                    phase: ctx.phase.clone(),
                    rounds,
                });
            }
            trace!(phase = %ctx.phase, round = rounds, visited, "phase round");
        }
        Ok(())
    }
}

/// Ordered phases with their bound actions
pub struct PhaseDriver {
    registry: Arc<SchemaRegistry>,
    config: EngineConfig,
    actions: HashMap<PhaseId, Arc<dyn PhaseAction>>,
}

impl fmt::Debug for PhaseDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bound: Vec<_> = self.actions.keys().map(PhaseId::name).collect();
        bound.sort_unstable();
        f.debug_struct("PhaseDriver")
            .field("phases", &self.registry.phases())
            .field("bound", &bound)
            .field("config", &self.config)
            .finish()
    }
}

impl PhaseDriver {
    /// Driver with the built-in actions bound
    #[must_use]
    pub fn new(registry: Arc<SchemaRegistry>, config: EngineConfig) -> Self {
        let actions = crate::actions::built_in()
            .into_iter()
            .collect::<HashMap<_, _>>();
        Self {
            registry,
            config,
            actions,
        }
    }

    /// Registry the driver runs over
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Engine configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Bind (or rebind) the action of a declared phase
    ///
    /// # Errors
    /// [`EngineError::UndeclaredPhase`] if the registry does not know the phase
    pub fn bind(&mut self, phase: PhaseId, action: Arc<dyn PhaseAction>) -> Result<(), EngineError> {
        if !self.registry.phases().contains(&phase) {
            return Err(EngineError::UndeclaredPhase(phase));
        }
        self.actions.insert(phase, action);
        Ok(())
    }

    /// Check that every declared phase has an action
    ///
    /// # Errors
    /// [`EngineError::UnboundPhase`] naming the first phase without one
    pub fn check_bindings(&self) -> Result<(), EngineError> {
        match self
            .registry
            .phases()
            .iter()
            .find(|p| !self.actions.contains_key(*p))
        {
            Some(phase) => Err(EngineError::UnboundPhase(phase.clone())),
            None => Ok(()),
        }
    }

    /// Run every phase over `root`
    ///
    /// Results recorded by an earlier run are discarded first, except on
    /// nodes with manual validation enabled. Callbacks still queued once
    /// the last phase ends are logged and dropped.
    ///
    /// # Errors
    /// The first fatal error, or a validation failure when enforcing.
    pub fn run(&self, root: &ObjectRef, mode: RunMode) -> Result<(), EngineError> {
        self.check_bindings()?;
        for node in collect(root) {
            if !node.manual_validation() {
                node.clear_validation();
            }
        }
        for phase in self.registry.phases() {
            self.run_phase(root, phase, mode)?;
        }
        discard_leftovers(root);
        Ok(())
    }

    /// Run a single phase over `root`
    ///
    /// # Errors
    /// [`EngineError::UnboundPhase`] if nothing is bound to `phase`, or any
    /// error raised while running it.
    pub fn run_phase(&self, root: &ObjectRef, phase: &PhaseId, mode: RunMode) -> Result<(), EngineError> {
        let action = self
            .actions
            .get(phase)
            .ok_or_else(|| EngineError::UnboundPhase(phase.clone()))?;
        let ctx = PhaseContext {
            phase,
            registry: &self.registry,
            config: &self.config,
            mode,
        };

        debug!(phase = %phase, "phase start");
        let drained = drain_deferred(root, &ctx)?;
        action.run(root, &ctx)?;
        debug!(phase = %phase, deferred = drained, "phase end");
        Ok(())
    }
}

/// Drop callbacks whose phase is undeclared or already ran
fn discard_leftovers(root: &ObjectRef) -> usize {
    let mut discarded = 0;
    for node in collect(root) {
        for deferred in node.take_all_deferred() {
            warn!(
                phase = %deferred.phase,
                seq = deferred.seq,
                node = ?node,
                "deferred callback never ran; discarding"
            );
            discarded += 1;
        }
    }
    discarded
}

/// Run every callback bound to the current phase, oldest first
///
/// Callbacks may register further callbacks for the same phase; those run
/// in a later round of the same drain.
fn drain_deferred(root: &ObjectRef, ctx: &PhaseContext<'_>) -> Result<usize, EngineError> {
    let mut drained = 0;
    let mut rounds = 0;
    loop {
        let mut pending: Vec<_> = collect(root)
            .into_iter()
            .flat_map(|node| {
                node.take_deferred(ctx.phase)
                    .into_iter()
                    .map(move |deferred| (node.clone(), deferred))
            })
            .collect();
        if pending.is_empty() {
            return Ok(drained);
        }
        rounds += 1;
        if rounds > ctx.config.max_stabilization_rounds {
            return Err(EngineError::Unstable {
                phase: ctx.phase.clone(),
                rounds,
            });
        }

        pending.sort_by_key(|(_, deferred)| deferred.seq);
        for (node, deferred) in pending {
            trace!(phase = %ctx.phase, seq = deferred.seq, node = ?node, "deferred callback");
            (deferred.callback)(&node).map_err(|e| EngineError::hook(ctx.phase, e))?;
            drained += 1;
        }
    }
}
