//! Registration and type-level hooks

use crate::driver::PhaseContext;
use crate::error::EngineError;
use crate::visitor::Visit;
use arbor_model::{Named, NodeHook, TypeDescriptor};
use tracing::trace;

/// CREATE: traces each node with its path; the tree is left as is
///
/// # Errors
/// Never fails; the signature matches the other node actions.
pub fn register(visit: &Visit<'_>, ctx: &PhaseContext<'_>) -> Result<(), EngineError> {
    trace!(phase = %ctx.phase, path = %visit.path.label(), node = ?visit.node, "registered");
    Ok(())
}

/// APPLY: post-apply hooks, root ancestor type first
///
/// # Errors
/// [`EngineError::Hook`] for the first failing hook
pub fn run_post_apply(visit: &Visit<'_>, ctx: &PhaseContext<'_>) -> Result<(), EngineError> {
    run_hooks(visit, ctx, |t| &t.post_apply)
}

/// POST_TREE: post-tree hooks, root ancestor type first
///
/// # Errors
/// [`EngineError::Hook`] for the first failing hook
pub fn run_post_tree(visit: &Visit<'_>, ctx: &PhaseContext<'_>) -> Result<(), EngineError> {
    run_hooks(visit, ctx, |t| &t.post_tree)
}

fn run_hooks(
    visit: &Visit<'_>,
    ctx: &PhaseContext<'_>,
    select: fn(&TypeDescriptor) -> &Vec<Named<NodeHook>>,
) -> Result<(), EngineError> {
    let schema = visit.node.schema();
    for hook in schema.hierarchy().iter().flat_map(|t| select(t)) {
        trace!(phase = %ctx.phase, hook = %hook.name, node = ?visit.node, "running hook");
        (hook.func)(visit.node).map_err(|e| EngineError::hook(ctx.phase, e))?;
    }
    Ok(())
}
