//! Default filling

use super::owner::resolve_owners;
use crate::driver::PhaseContext;
use crate::engine::instantiate;
use crate::error::EngineError;
use crate::visitor::Visit;
use arbor_merge::{copy_value, Templates};
use arbor_model::{DefaultValue, ObjectRef, Value};
use tracing::trace;

/// DEFAULT: give falsy fields their declared default
///
/// Created nested objects are built with the node's captured templates
/// active. Their owners are resolved on creation since the owner phase has
/// already run; every later phase processes them like any other node.
///
/// # Errors
/// Model, merge or provider failures.
pub fn fill_defaults(visit: &Visit<'_>, ctx: &PhaseContext<'_>) -> Result<(), EngineError> {
    let node = visit.node;
    let schema = node.schema();
    for field in schema.fields() {
        let Some(default) = &field.descriptor.default else {
            continue;
        };
        if node.get_attribute(field.name()).is_truthy() {
            continue;
        }

        let value = match default {
            DefaultValue::Literal(literal) => copy_value(literal)?,
            DefaultValue::FromField(source) => copy_value(&node.get_attribute(source))?,
            DefaultValue::Provider(provider) => {
                (provider.func)(node).map_err(|e| EngineError::hook(ctx.phase, e))?
            }
            DefaultValue::Create => match field.descriptor.element.model() {
                Some(model) => Value::Object(Templates::with_snapshot(node, || {
                    instantiate(ctx.registry, model, None)
                })?),
                None => continue,
            },
        };
        if value.is_null() {
            continue;
        }

        trace!(node = ?node, field = field.name(), "default applied");
        node.set_attribute(field.name(), value.clone())?;
        if let (DefaultValue::Create, Value::Object(created)) = (default, &value) {
            adopt(visit, field.name(), created, ctx)?;
        }
    }
    Ok(())
}

fn adopt(
    visit: &Visit<'_>,
    field: &str,
    created: &ObjectRef,
    ctx: &PhaseContext<'_>,
) -> Result<(), EngineError> {
    let mut ancestors = visit.ancestors.to_vec();
    ancestors.push(visit.node.clone());
    let path = visit.path.field(field);
    resolve_owners(
        &Visit {
            path: &path,
            node: created,
            field: Some(field),
            ancestors: &ancestors,
        },
        ctx,
    )
}
