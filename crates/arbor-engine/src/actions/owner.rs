//! Owner resolution

use crate::driver::PhaseContext;
use crate::error::EngineError;
use crate::visitor::Visit;
use arbor_model::{FieldKind, ObjectRef};
use tracing::trace;

/// OWNER: fill unset owner fields, then run owner hooks once
///
/// Direct owner fields take the immediate container; only the first
/// direct field compatible with the container is assigned. Transitive
/// owner fields take the nearest compatible ancestor.
///
/// # Errors
/// [`EngineError::Model`] if an owner cannot be stored,
/// [`EngineError::Hook`] for a failing owner hook.
pub fn resolve_owners(visit: &Visit<'_>, ctx: &PhaseContext<'_>) -> Result<(), EngineError> {
    let node = visit.node;
    let mut direct_matched = false;

    for field in node.schema().fields() {
        let FieldKind::Owner { transitive } = field.kind() else {
            continue;
        };
        let Some(owner_type) = field.descriptor.element.model() else {
            continue;
        };

        let candidate = if transitive {
            visit.nearest_ancestor(owner_type)
        } else if direct_matched {
            None
        } else {
            let container = visit.container().filter(|c| c.is_a(owner_type));
            direct_matched = container.is_some();
            container
        };

        if let Some(owner) = candidate {
            if node.owner(field.name()).is_none() {
                trace!(node = ?node, field = field.name(), owner = ?owner, "owner resolved");
                node.set_attribute(field.name(), owner.clone())?;
            }
        }
    }

    if node.mark_owner_hooks_done() {
        run_owner_hooks(visit, ctx)?;
    }
    Ok(())
}

fn run_owner_hooks(visit: &Visit<'_>, ctx: &PhaseContext<'_>) -> Result<(), EngineError> {
    let node = visit.node;
    let schema = node.schema();
    for hook in schema.hierarchy().iter().flat_map(|t| t.owner_hooks.iter()) {
        let Some(owner) = owner_of_type(visit, &hook.owner_type) else {
            continue;
        };
        trace!(hook = %hook.name, node = ?node, owner = ?owner, "owner hook");
        (hook.callback)(node, &owner).map_err(|e| EngineError::hook(ctx.phase, e))?;
    }
    Ok(())
}

/// Resolved owner field of the type, else the nearest such ancestor
fn owner_of_type(visit: &Visit<'_>, owner_type: &str) -> Option<ObjectRef> {
    let node = visit.node;
    node.schema()
        .fields()
        .iter()
        .filter(|f| matches!(f.kind(), FieldKind::Owner { .. }))
        .filter_map(|f| node.owner(f.name()))
        .find(|o| o.is_a(owner_type))
        .or_else(|| visit.nearest_ancestor(owner_type).cloned())
}
