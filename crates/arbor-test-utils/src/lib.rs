//! Testing utilities for the Arbor workspace
//!
//! Shared fixture schemas and tracing setup.

#![allow(missing_docs)]

use arbor_model::{
    CheckFailure, ClassValidator, CollectionStrategy, DefaultValue, ElementType, FieldDescriptor,
    FieldValidation, HookError, MapStrategy, MergeStrategy, Named, ObjectRef, SchemaRegistry, Severity,
    TypeDescriptor, Value,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Install a test subscriber honouring `RUST_LOG`; repeated calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

/// `A` holds `B`s, each `B` holds one `C`
///
/// `B.a` is a direct owner of type `A`; `C.a` is a transitive owner of
/// type `A` and `C.b` a direct owner of type `B`.
pub fn owner_registry() -> Arc<SchemaRegistry> {
    let registry = SchemaRegistry::builder()
        .with_type(
            TypeDescriptor::new("A")
                .field(FieldDescriptor::single("label", ElementType::Str))
                .field(FieldDescriptor::collection("bs", ElementType::Model("B".into()))),
        )
        .with_type(
            TypeDescriptor::new("B")
                .field(FieldDescriptor::owner("a", "A"))
                .field(FieldDescriptor::single("c", ElementType::Model("C".into()))),
        )
        .with_type(
            TypeDescriptor::new("C")
                .field(FieldDescriptor::transitive_owner("a", "A"))
                .field(FieldDescriptor::owner("b", "B")),
        )
        .build()
        .unwrap();
    Arc::new(registry)
}

/// `A` with `n` `B`s, each holding a fresh `C`
pub fn owner_tree(registry: &SchemaRegistry, n: usize) -> ObjectRef {
    let a = ObjectRef::new(registry.get("A").unwrap(), None).unwrap();
    for _ in 0..n {
        let b = ObjectRef::new(registry.get("B").unwrap(), None).unwrap();
        let c = ObjectRef::new(registry.get("C").unwrap(), None).unwrap();
        b.set_attribute("c", c).unwrap();
        a.add_element("bs", b).unwrap();
    }
    a
}

fn positive(value: &Value) -> bool {
    value.as_int().is_some_and(|i| i > 0)
}

fn image_is_pinned(service: &ObjectRef) -> Result<(), CheckFailure> {
    match service.get_attribute("image").as_str() {
        Some(image) if !image.contains(':') => Err(format!("image '{image}' has no tag").into()),
        _ => Ok(()),
    }
}

fn has_services(cluster: &ObjectRef) -> Result<(), CheckFailure> {
    if cluster.get_attribute("services").is_truthy() {
        Ok(())
    } else {
        Err("cluster declares no services".into())
    }
}

fn port_in_range(service: &ObjectRef) -> Result<(), CheckFailure> {
    match service.get_attribute("port").as_int() {
        Some(port) => u16::try_from(port)
            .map(|_| ())
            .map_err(|e| CheckFailure::caused_by(format!("port {port} is out of range"), e)),
        None => Ok(()),
    }
}

fn service_fqdn(service: &ObjectRef) -> Result<(), HookError> {
    let Some(cluster) = service.owner("cluster") else {
        return Ok(());
    };
    let name = service.key_if_any().unwrap_or_default().to_string();
    let fqdn = match cluster.get_attribute("domain").as_str() {
        Some(domain) => format!("{name}.{domain}"),
        None => name,
    };
    service
        .set_attribute("fqdn", fqdn)
        .map_err(|e| HookError::new("fqdn", e.to_string()))
}

fn count_services(cluster: &ObjectRef) -> Result<(), HookError> {
    let count = cluster
        .get_attribute("services")
        .as_map()
        .map_or(0, |services| services.len());
    cluster
        .set_attribute("service_count", i64::try_from(count).unwrap_or(i64::MAX))
        .map_err(|e| HookError::new("count_services", e.to_string()))
}

fn attach_probe(probe: &ObjectRef, service: &ObjectRef) -> Result<(), HookError> {
    let target = service.key_if_any().unwrap_or_default().to_string();
    probe
        .set_attribute("target", target)
        .map_err(|e| HookError::new("attach_probe", e.to_string()))
}

fn default_port(service: &ObjectRef) -> Result<Value, HookError> {
    match service.get_attribute("protocol").as_str() {
        Some("https") => Ok(Value::from(443)),
        _ => Ok(Value::from(80)),
    }
}

/// Cluster / Service / Probe schema exercising every engine feature
///
/// - `Cluster`: `domain` (required), `services` map of `Service`
///   (merge values), `service_count` set by a post-tree hook, WARN class
///   validator `has_services`
/// - `Workload`: base of `Service`, key `name`, `labels` map (add missing)
/// - `Service`: `image` required, `replicas` (default 1, positive),
///   `protocol`, `port` (provider default), `ports` list (add),
///   `alias` (defaults from `image`), `legacy` (deprecated),
///   `health` (created `Probe`), `cluster` owner, `fqdn` set on apply,
///   early WARN validator `image_tag`, validator `port_range` carrying
///   the conversion error as cause
/// - `Probe`: `path` (default "/healthz"), `service` owner, `cluster`
///   transitive owner, `target` set by an owner hook
pub fn cluster_registry() -> Arc<SchemaRegistry> {
    let registry = SchemaRegistry::builder()
        .with_type(
            TypeDescriptor::new("Cluster")
                .field(FieldDescriptor::single("domain", ElementType::Str).required())
                .field(
                    FieldDescriptor::map("services", ElementType::Model("Service".into()))
                        .with_merge(MergeStrategy::Map(MapStrategy::MergeValues)),
                )
                .field(FieldDescriptor::ignored("service_count", ElementType::Int))
                .validator(ClassValidator::new("has_services", has_services).with_level(Severity::Warn))
                .post_tree("count_services", count_services),
        )
        .with_type(
            TypeDescriptor::new("Workload")
                .field(FieldDescriptor::key("name"))
                .field(
                    FieldDescriptor::map("labels", ElementType::Str)
                        .with_merge(MergeStrategy::Map(MapStrategy::AddMissing)),
                ),
        )
        .with_type(
            TypeDescriptor::new("Service")
                .extends("Workload")
                .field(FieldDescriptor::single("image", ElementType::Str).required())
                .field(
                    FieldDescriptor::single("replicas", ElementType::Int)
                        .with_default(DefaultValue::Literal(Value::from(1)))
                        .validated(
                            FieldValidation::predicate("positive", positive)
                                .with_message("{field} must be positive, got {value}"),
                        ),
                )
                .field(FieldDescriptor::single("protocol", ElementType::Str))
                .field(
                    FieldDescriptor::single("port", ElementType::Int)
                        .with_default(DefaultValue::Provider(Named::new("default_port", default_port))),
                )
                .field(
                    FieldDescriptor::collection("ports", ElementType::Int)
                        .with_merge(MergeStrategy::Collection(CollectionStrategy::Add)),
                )
                .field(
                    FieldDescriptor::single("alias", ElementType::Str)
                        .with_default(DefaultValue::FromField("image".into())),
                )
                .field(FieldDescriptor::single("legacy", ElementType::Str).deprecated("use labels"))
                .field(
                    FieldDescriptor::single("health", ElementType::Model("Probe".into()))
                        .with_default(DefaultValue::Create),
                )
                .field(FieldDescriptor::owner("cluster", "Cluster"))
                .field(FieldDescriptor::ignored("fqdn", ElementType::Str))
                .early_validator(ClassValidator::new("image_tag", image_is_pinned).with_level(Severity::Warn))
                .validator(ClassValidator::new("port_range", port_in_range))
                .post_apply("fqdn", service_fqdn),
        )
        .with_type(
            TypeDescriptor::new("Probe")
                .field(
                    FieldDescriptor::single("path", ElementType::Str)
                        .with_default(DefaultValue::Literal(Value::from("/healthz"))),
                )
                .field(FieldDescriptor::owner("service", "Service"))
                .field(FieldDescriptor::transitive_owner("cluster", "Cluster"))
                .field(FieldDescriptor::ignored("target", ElementType::Str))
                .owner_hook("attach_probe", "Service", attach_probe),
        )
        .build()
        .unwrap();
    Arc::new(registry)
}

/// Cluster named by `domain` with one service per `(name, image)`
pub fn cluster(registry: &SchemaRegistry, domain: &str, services: &[(&str, &str)]) -> ObjectRef {
    let cluster = ObjectRef::new(registry.get("Cluster").unwrap(), None).unwrap();
    cluster.set_attribute("domain", domain).unwrap();
    for (name, image) in services {
        let service = ObjectRef::new(registry.get("Service").unwrap(), Some((*name).to_string())).unwrap();
        service.set_attribute("image", *image).unwrap();
        cluster.put_keyed("services", service).unwrap();
    }
    cluster
}
