//! Copy/merge engine
//!
//! [`copy_into`] walks the target's fields root-ancestor level first and
//! applies each field's resolved [`MergeStrategy`]. Values taken from the
//! source are deep-copied so target and source never share nested objects.

use crate::error::MergeError;
use arbor_model::{
    CollectionStrategy, MapStrategy, MergeStrategy, ObjectRef, ResolvedField, SingleStrategy,
    Value, ValueMap,
};
use std::sync::Arc;
use tracing::trace;

/// Merge `source` into `target` field by field
///
/// Owner, key and ignored fields are never touched. Fields the source type
/// does not declare are skipped.
///
/// # Errors
/// - [`MergeError::Incompatible`] if neither type derives from the other
/// - [`MergeError::Model`] if a copied value is rejected by the target field
pub fn copy_into(target: &ObjectRef, source: &ObjectRef) -> Result<(), MergeError> {
    if target.ptr_eq(source) {
        return Ok(());
    }
    if !target.is_a(source.type_name()) && !source.is_a(target.type_name()) {
        return Err(MergeError::incompatible(source.type_name(), target.type_name()));
    }

    let schema = Arc::clone(target.schema());
    for field in schema.fields() {
        let Some(strategy) = field.strategy else {
            continue;
        };
        if source.schema().field(field.name()).is_none() {
            continue;
        }
        let incoming = source.get_attribute(field.name());
        trace!(
            target_type = target.type_name(),
            field = field.name(),
            ?strategy,
            "merging field"
        );
        match strategy {
            MergeStrategy::Single(s) => merge_single(target, field, s, &incoming)?,
            MergeStrategy::Collection(s) => merge_collection(target, field, s, &incoming)?,
            MergeStrategy::Map(s) => merge_map(target, field, s, &incoming)?,
        }
    }
    Ok(())
}

/// Independent copy of a model object and everything it structurally holds
///
/// The key is preserved; owners are left unresolved.
///
/// # Errors
/// [`MergeError::Model`] when the copy cannot be instantiated, e.g. a keyed
/// template without a key.
pub fn deep_copy(obj: &ObjectRef) -> Result<ObjectRef, MergeError> {
    let copy = ObjectRef::new(Arc::clone(obj.schema()), obj.key_if_any().map(str::to_string))?;
    for field in obj.schema().fields() {
        if !field.kind().is_structural() {
            continue;
        }
        let value = obj.get_attribute(field.name());
        copy.set_attribute(field.name(), copy_value(&value)?)?;
    }
    copy.set_manual_validation(obj.manual_validation());
    Ok(copy)
}

/// Copy a value; nested models are deep-copied, containers element-wise
///
/// # Errors
/// As [`deep_copy`].
pub fn copy_value(value: &Value) -> Result<Value, MergeError> {
    Ok(match value {
        Value::Object(obj) => Value::Object(deep_copy(obj)?),
        Value::List(items) => Value::List(copy_list(items)?),
        Value::Map(entries) => Value::Map(copy_map(entries)?),
        other => other.clone(),
    })
}

fn copy_list(items: &[Value]) -> Result<Vec<Value>, MergeError> {
    items.iter().map(copy_value).collect()
}

fn copy_map(entries: &ValueMap) -> Result<ValueMap, MergeError> {
    entries
        .iter()
        .map(|(k, v)| Ok((k.clone(), copy_value(v)?)))
        .collect()
}

fn merge_single(
    target: &ObjectRef,
    field: &ResolvedField,
    strategy: SingleStrategy,
    incoming: &Value,
) -> Result<(), MergeError> {
    let name = field.name();
    match strategy {
        SingleStrategy::Replace => {
            if !incoming.is_null() {
                target.set_attribute(name, copy_value(incoming)?)?;
            }
        }
        SingleStrategy::AlwaysReplace => {
            target.set_attribute(name, copy_value(incoming)?)?;
        }
        SingleStrategy::SetIfNull => {
            if !incoming.is_null() && target.get_attribute(name).is_null() {
                target.set_attribute(name, copy_value(incoming)?)?;
            }
        }
        SingleStrategy::Merge => match (target.get_attribute(name), incoming) {
            (_, Value::Null) => {}
            (Value::Object(existing), Value::Object(from)) => copy_into(&existing, from)?,
            _ => target.set_attribute(name, copy_value(incoming)?)?,
        },
    }
    Ok(())
}

fn merge_collection(
    target: &ObjectRef,
    field: &ResolvedField,
    strategy: CollectionStrategy,
    incoming: &Value,
) -> Result<(), MergeError> {
    let name = field.name();
    let from = incoming.as_list().unwrap_or_default();
    match strategy {
        CollectionStrategy::Add => {
            if from.is_empty() {
                return Ok(());
            }
            let mut items = match target.get_attribute(name) {
                Value::List(items) => items,
                _ => Vec::new(),
            };
            items.extend(copy_list(from)?);
            target.set_attribute(name, Value::List(items))?;
        }
        CollectionStrategy::Replace => {
            if !from.is_empty() {
                target.set_attribute(name, Value::List(copy_list(from)?))?;
            }
        }
        CollectionStrategy::AlwaysReplace => {
            target.set_attribute(name, Value::List(copy_list(from)?))?;
        }
    }
    Ok(())
}

fn merge_map(
    target: &ObjectRef,
    field: &ResolvedField,
    strategy: MapStrategy,
    incoming: &Value,
) -> Result<(), MergeError> {
    let name = field.name();
    let empty = ValueMap::new();
    let from = incoming.as_map().unwrap_or(&empty);
    let current = || match target.get_attribute(name) {
        Value::Map(entries) => entries,
        _ => ValueMap::new(),
    };

    match strategy {
        MapStrategy::FullReplace => {
            if !from.is_empty() {
                target.set_attribute(name, Value::Map(copy_map(from)?))?;
            }
        }
        MapStrategy::AlwaysReplace => {
            target.set_attribute(name, Value::Map(copy_map(from)?))?;
        }
        MapStrategy::MergeKeys => {
            let mut entries = current();
            for (key, value) in from {
                entries.insert(key.clone(), copy_value(value)?);
            }
            target.set_attribute(name, Value::Map(entries))?;
        }
        MapStrategy::MergeValues if field.descriptor.element.model().is_some() => {
            let mut entries = current();
            for (key, value) in from {
                let existing = entries.get(key).and_then(Value::as_object).cloned();
                match (existing, value) {
                    (Some(existing), Value::Object(src)) => copy_into(&existing, src)?,
                    _ => {
                        entries.insert(key.clone(), copy_value(value)?);
                    }
                }
            }
            target.set_attribute(name, Value::Map(entries))?;
        }
        MapStrategy::MergeValues => {
            return merge_map(target, field, MapStrategy::MergeKeys, incoming);
        }
        MapStrategy::AddMissing => {
            let mut entries = current();
            for (key, value) in from {
                if !entries.contains_key(key) {
                    entries.insert(key.clone(), copy_value(value)?);
                }
            }
            target.set_attribute(name, Value::Map(entries))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_model::{ElementType, FieldDescriptor, MergeDefaults, SchemaRegistry, TypeDescriptor};
    use pretty_assertions::assert_eq;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builder()
            .with_type(
                TypeDescriptor::new("Service")
                    .field(FieldDescriptor::single("name", ElementType::Str))
                    .field(
                        FieldDescriptor::single("region", ElementType::Str)
                            .with_merge(MergeStrategy::Single(SingleStrategy::SetIfNull)),
                    )
                    .field(
                        FieldDescriptor::single("note", ElementType::Str)
                            .with_merge(MergeStrategy::Single(SingleStrategy::AlwaysReplace)),
                    )
                    .field(FieldDescriptor::single("limits", ElementType::Model("Limits".into())))
                    .field(FieldDescriptor::collection("tags", ElementType::Str))
                    .field(
                        FieldDescriptor::collection("extra", ElementType::Str)
                            .with_merge(MergeStrategy::Collection(CollectionStrategy::AlwaysReplace)),
                    )
                    .field(
                        FieldDescriptor::map("backends", ElementType::Model("Backend".into()))
                            .with_merge(MergeStrategy::Map(MapStrategy::MergeValues)),
                    )
                    .field(FieldDescriptor::map("labels", ElementType::Str))
                    .field(
                        FieldDescriptor::map("annotations", ElementType::Str)
                            .with_merge(MergeStrategy::Map(MapStrategy::AlwaysReplace)),
                    )
                    .field(
                        FieldDescriptor::map("env", ElementType::Str)
                            .with_merge(MergeStrategy::Map(MapStrategy::MergeKeys)),
                    )
                    .field(
                        FieldDescriptor::map("quotas", ElementType::Int)
                            .with_merge(MergeStrategy::Map(MapStrategy::MergeValues)),
                    )
                    .field(FieldDescriptor::ignored("scratch", ElementType::Str)),
            )
            .with_type(
                TypeDescriptor::new("Limits")
                    .field(FieldDescriptor::single("cpu", ElementType::Int))
                    .field(FieldDescriptor::single("memory", ElementType::Int)),
            )
            .with_type(
                TypeDescriptor::new("Backend")
                    .field(FieldDescriptor::key("host"))
                    .field(FieldDescriptor::single("weight", ElementType::Int))
                    .field(FieldDescriptor::single("zone", ElementType::Str)),
            )
            .with_type(TypeDescriptor::new("Unrelated"))
            .with_type(
                TypeDescriptor::new("Appending")
                    .merge_defaults(MergeDefaults {
                        collection: Some(CollectionStrategy::Add),
                        ..MergeDefaults::default()
                    })
                    .field(FieldDescriptor::collection("items", ElementType::Int)),
            )
            .build()
            .unwrap()
    }

    fn new(reg: &SchemaRegistry, type_name: &str) -> ObjectRef {
        ObjectRef::new(reg.get(type_name).unwrap(), None).unwrap()
    }

    fn backend(reg: &SchemaRegistry, host: &str) -> ObjectRef {
        ObjectRef::new(reg.get("Backend").unwrap(), Some(host.to_string())).unwrap()
    }

    fn strs(value: &Value) -> Vec<String> {
        value
            .as_list()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn replace_skips_null_source() {
        let reg = registry();
        let target = new(&reg, "Service");
        let source = new(&reg, "Service");
        target.set_attribute("name", "kept").unwrap();
        copy_into(&target, &source).unwrap();
        assert_eq!(target.get_attribute("name"), Value::from("kept"));

        source.set_attribute("name", "new").unwrap();
        copy_into(&target, &source).unwrap();
        assert_eq!(target.get_attribute("name"), Value::from("new"));
    }

    #[test]
    fn always_replace_copies_null() {
        let reg = registry();
        let target = new(&reg, "Service");
        target.set_attribute("note", "old").unwrap();
        copy_into(&target, &new(&reg, "Service")).unwrap();
        assert_eq!(target.get_attribute("note"), Value::Null);
    }

    #[test]
    fn set_if_null_keeps_existing() {
        let reg = registry();
        let target = new(&reg, "Service");
        let source = new(&reg, "Service");
        source.set_attribute("region", "eu").unwrap();
        target.set_attribute("region", "us").unwrap();
        copy_into(&target, &source).unwrap();
        assert_eq!(target.get_attribute("region"), Value::from("us"));

        let empty = new(&reg, "Service");
        copy_into(&empty, &source).unwrap();
        assert_eq!(empty.get_attribute("region"), Value::from("eu"));
    }

    #[test]
    fn nested_models_merge_field_by_field() {
        let reg = registry();
        let target = new(&reg, "Service");
        let existing = new(&reg, "Limits");
        existing.set_attribute("cpu", 2).unwrap();
        target.set_attribute("limits", existing.clone()).unwrap();

        let source = new(&reg, "Service");
        let incoming = new(&reg, "Limits");
        incoming.set_attribute("memory", 512).unwrap();
        source.set_attribute("limits", incoming).unwrap();

        copy_into(&target, &source).unwrap();
        let merged = target.get_attribute("limits");
        let merged = merged.as_object().unwrap();
        assert!(merged.ptr_eq(&existing));
        assert_eq!(merged.get_attribute("cpu"), Value::from(2));
        assert_eq!(merged.get_attribute("memory"), Value::from(512));
    }

    #[test]
    fn nested_model_into_null_is_deep_copied() {
        let reg = registry();
        let source = new(&reg, "Service");
        let limits = new(&reg, "Limits");
        limits.set_attribute("cpu", 4).unwrap();
        source.set_attribute("limits", limits.clone()).unwrap();

        let target = new(&reg, "Service");
        copy_into(&target, &source).unwrap();
        let copied = target.get_attribute("limits");
        let copied = copied.as_object().unwrap();
        assert!(!copied.ptr_eq(&limits));
        assert!(copied.container().unwrap().ptr_eq(&target));

        copied.set_attribute("cpu", 8).unwrap();
        assert_eq!(limits.get_attribute("cpu"), Value::from(4));
    }

    #[test]
    fn collection_replace_with_empty_source_is_noop() {
        let reg = registry();
        let target = new(&reg, "Service");
        target.add_element("tags", "a").unwrap();
        copy_into(&target, &new(&reg, "Service")).unwrap();
        assert_eq!(strs(&target.get_attribute("tags")), vec!["a"]);
    }

    #[test]
    fn collection_always_replace_clears() {
        let reg = registry();
        let target = new(&reg, "Service");
        target.add_element("extra", "a").unwrap();
        copy_into(&target, &new(&reg, "Service")).unwrap();
        assert!(strs(&target.get_attribute("extra")).is_empty());
    }

    #[test]
    fn collection_add_appends_in_order() {
        let reg = registry();
        let target = new(&reg, "Appending");
        target.add_element("items", 3).unwrap();
        let source = new(&reg, "Appending");
        source.add_element("items", 1).unwrap();
        source.add_element("items", 2).unwrap();
        copy_into(&target, &source).unwrap();
        assert_eq!(
            target.get_attribute("items"),
            Value::List(vec![3.into(), 1.into(), 2.into()])
        );
    }

    #[test]
    fn map_merge_values_recurses_into_existing() {
        let reg = registry();
        let target = new(&reg, "Service");
        let tgt_child = backend(&reg, "k1");
        tgt_child.set_attribute("weight", 1).unwrap();
        target.put_keyed("backends", tgt_child.clone()).unwrap();

        let source = new(&reg, "Service");
        let src_child = backend(&reg, "k1");
        src_child.set_attribute("zone", "a").unwrap();
        source.put_keyed("backends", src_child).unwrap();
        source.put_keyed("backends", backend(&reg, "k2")).unwrap();

        copy_into(&target, &source).unwrap();
        let map = target.get_attribute("backends");
        let map = map.as_map().unwrap();
        let k1 = map["k1"].as_object().unwrap();
        assert!(k1.ptr_eq(&tgt_child));
        assert_eq!(k1.get_attribute("weight"), Value::from(1));
        assert_eq!(k1.get_attribute("zone"), Value::from("a"));
        assert_eq!(map["k2"].as_object().unwrap().key(), Some("k2"));
    }

    #[test]
    fn map_full_replace_swaps_whole_map() {
        let reg = registry();
        let target = new(&reg, "Service");
        target.put_entry("labels", "team", "core").unwrap();
        target.put_entry("labels", "tier", "1").unwrap();
        let source = new(&reg, "Service");
        source.put_entry("labels", "team", "edge").unwrap();

        copy_into(&target, &source).unwrap();
        let labels = target.get_attribute("labels");
        let labels = labels.as_map().unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels["team"], Value::from("edge"));
    }

    #[test]
    fn map_full_replace_with_empty_source_is_noop() {
        let reg = registry();
        let target = new(&reg, "Service");
        target.put_entry("labels", "team", "core").unwrap();
        copy_into(&target, &new(&reg, "Service")).unwrap();
        let labels = target.get_attribute("labels");
        let labels = labels.as_map().unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels["team"], Value::from("core"));
    }

    #[test]
    fn map_always_replace_clears() {
        let reg = registry();
        let target = new(&reg, "Service");
        target.put_entry("annotations", "owner", "ops").unwrap();
        copy_into(&target, &new(&reg, "Service")).unwrap();
        assert!(target.get_attribute("annotations").as_map().unwrap().is_empty());

        let source = new(&reg, "Service");
        source.put_entry("annotations", "build", "42").unwrap();
        target.put_entry("annotations", "owner", "ops").unwrap();
        copy_into(&target, &source).unwrap();
        let annotations = target.get_attribute("annotations");
        let annotations = annotations.as_map().unwrap();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations["build"], Value::from("42"));
    }

    #[test]
    fn map_merge_keys_overwrites_existing_key() {
        let reg = registry();
        let target = new(&reg, "Service");
        target.put_entry("env", "LOG", "info").unwrap();
        target.put_entry("env", "HOME", "/srv").unwrap();
        let source = new(&reg, "Service");
        source.put_entry("env", "LOG", "debug").unwrap();
        source.put_entry("env", "PATH", "/bin").unwrap();

        copy_into(&target, &source).unwrap();
        let env = target.get_attribute("env");
        let env = env.as_map().unwrap();
        assert_eq!(env.len(), 3);
        assert_eq!(env["LOG"], Value::from("debug"));
        assert_eq!(env["HOME"], Value::from("/srv"));
        assert_eq!(env["PATH"], Value::from("/bin"));
    }

    #[test]
    fn map_merge_values_on_scalars_acts_like_merge_keys() {
        let reg = registry();
        let target = new(&reg, "Service");
        target.put_entry("quotas", "cpu", 2).unwrap();
        target.put_entry("quotas", "disk", 10).unwrap();
        let source = new(&reg, "Service");
        source.put_entry("quotas", "cpu", 4).unwrap();
        source.put_entry("quotas", "memory", 512).unwrap();

        copy_into(&target, &source).unwrap();
        let quotas = target.get_attribute("quotas");
        let quotas = quotas.as_map().unwrap();
        assert_eq!(quotas.len(), 3);
        assert_eq!(quotas["cpu"], Value::from(4));
        assert_eq!(quotas["disk"], Value::from(10));
        assert_eq!(quotas["memory"], Value::from(512));
    }

    #[test]
    fn ignored_fields_are_not_copied() {
        let reg = registry();
        let source = new(&reg, "Service");
        source.set_attribute("scratch", "tmp").unwrap();
        let target = new(&reg, "Service");
        copy_into(&target, &source).unwrap();
        assert_eq!(target.get_attribute("scratch"), Value::Null);
    }

    #[test]
    fn unrelated_types_are_fatal() {
        let reg = registry();
        let result = copy_into(&new(&reg, "Service"), &new(&reg, "Unrelated"));
        assert!(matches!(result, Err(MergeError::Incompatible { .. })));
    }

    #[test]
    fn deep_copy_preserves_key() {
        let reg = registry();
        let original = backend(&reg, "db");
        original.set_attribute("weight", 7).unwrap();
        let copy = deep_copy(&original).unwrap();
        assert!(!copy.ptr_eq(&original));
        assert_eq!(copy.key(), Some("db"));
        assert_eq!(copy.get_attribute("weight"), Value::from(7));
    }
}
