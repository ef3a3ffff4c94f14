//! End-to-end builds over the cluster fixture

use arbor_engine::{Engine, EngineConfig, EngineError, NodePhase, PhaseContext, ValidationPolicy, Visit};
use arbor_merge::Templates;
use arbor_model::{
    Breadcrumb, ElementType, FieldDescriptor, HookError, ObjectRef, PhaseDecl, PhaseId,
    SchemaRegistry, Severity, TypeDescriptor, Value,
};
use arbor_test_utils::{cluster, cluster_registry, init_tracing};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn service(cluster: &ObjectRef, name: &str) -> ObjectRef {
    cluster
        .get_attribute("services")
        .as_map()
        .and_then(|services| services.get(name))
        .and_then(Value::as_object)
        .cloned()
        .unwrap()
}

#[test]
fn finish_fills_defaults_owners_and_hooks() {
    init_tracing();
    let registry = cluster_registry();
    let engine = Engine::new(Arc::clone(&registry));
    let root = cluster(&registry, "example.org", &[("web", "nginx:1.25"), ("api", "api:2")]);

    let finished = engine.finish(&root).unwrap();
    assert!(finished.ptr_eq(&root));

    let web = service(&root, "web");
    assert_eq!(web.get_attribute("replicas"), Value::from(1));
    assert_eq!(web.get_attribute("port"), Value::from(80));
    assert_eq!(web.get_attribute("alias"), Value::from("nginx:1.25"));
    assert!(web.owner("cluster").unwrap().ptr_eq(&root));
    assert_eq!(web.get_attribute("fqdn"), Value::from("web.example.org"));

    let health = web.get_attribute("health");
    let probe = health.as_object().unwrap();
    assert_eq!(probe.get_attribute("path"), Value::from("/healthz"));
    assert!(probe.owner("service").unwrap().ptr_eq(&web));
    assert!(probe.owner("cluster").unwrap().ptr_eq(&root));
    assert_eq!(probe.get_attribute("target"), Value::from("web"));
    assert_eq!(probe.breadcrumb().to_string(), "/services[web]/health");

    assert_eq!(root.get_attribute("service_count"), Value::from(2));
}

#[test]
fn explicit_values_beat_defaults() {
    let registry = cluster_registry();
    let engine = Engine::new(Arc::clone(&registry));
    let root = cluster(&registry, "example.org", &[("web", "nginx:1.25")]);
    let web = service(&root, "web");
    web.set_attribute("replicas", 3).unwrap();
    web.set_attribute("protocol", "https").unwrap();
    web.set_attribute("alias", "frontend").unwrap();

    engine.finish(&root).unwrap();
    assert_eq!(web.get_attribute("replicas"), Value::from(3));
    assert_eq!(web.get_attribute("port"), Value::from(443));
    assert_eq!(web.get_attribute("alias"), Value::from("frontend"));
}

#[test]
fn warn_fails_only_at_warn_threshold() {
    let registry = cluster_registry();
    let engine = Engine::new(Arc::clone(&registry));
    // untagged image triggers the early WARN validator
    let root = cluster(&registry, "example.org", &[("web", "nginx:1.25"), ("api", "api")]);

    assert!(engine.finish_with(&root, Severity::Error).is_ok());

    let err = engine.finish_with(&root, Severity::Warn).unwrap_err();
    let failure = err.as_validation().unwrap();
    assert_eq!(failure.threshold(), Severity::Warn);
    let api_path = Breadcrumb::root().keyed("services", "api");
    let issues = failure.report().at(&api_path).unwrap();
    assert_eq!(issues.len(), 1);
    let issue = issues.iter().next().unwrap();
    assert_eq!(issue.member, "image_tag");
    assert_eq!(issue.message, "image 'api' has no tag");
}

#[test]
fn missing_required_field_fails_the_build() {
    let registry = cluster_registry();
    let engine = Engine::new(Arc::clone(&registry));
    let root = cluster(&registry, "example.org", &[("web", "")]);

    let err = engine.finish(&root).unwrap_err();
    assert!(err.is_recoverable());
    let failure = err.as_validation().unwrap();
    assert_eq!(failure.report().len(), 1);
    assert_eq!(
        err.to_string(),
        "validation failed with 1 issue(s) at or above ERROR\n/services[web]\n  ERROR image: image is required\n"
    );

    // once fixed, the same tree finishes
    service(&root, "web").set_attribute("image", "nginx:1.25").unwrap();
    assert!(engine.finish(&root).is_ok());
}

#[test]
fn validator_cause_is_exposed_as_error_source() {
    let registry = cluster_registry();
    let engine = Engine::new(Arc::clone(&registry));
    let root = cluster(&registry, "example.org", &[("web", "nginx:1.25")]);
    service(&root, "web").set_attribute("port", 70_000).unwrap();

    let err = engine.finish(&root).unwrap_err();
    let failure = err.as_validation().unwrap();
    let issue = failure.report().issues().next().unwrap();
    assert_eq!(issue.member, "port_range");
    assert_eq!(issue.message, "port 70000 is out of range");
    assert!(issue.cause.is_some());

    let source = std::error::Error::source(&err).unwrap();
    assert_eq!(source.to_string(), issue.cause.as_ref().unwrap().to_string());
}

#[test]
fn collect_all_reports_every_failing_field() {
    let registry = cluster_registry();
    let root = cluster(&registry, "example.org", &[("web", "")]);
    service(&root, "web").set_attribute("replicas", -1).unwrap();

    let fail_fast = Engine::new(Arc::clone(&registry)).inspect(&root).unwrap();
    assert_eq!(fail_fast.filter(Severity::Error).len(), 1);

    let config = EngineConfig::default().with_validation_policy(ValidationPolicy::CollectAll);
    let collect_all = Engine::with_config(Arc::clone(&registry), config).inspect(&root).unwrap();
    let errors = collect_all.filter(Severity::Error);
    let members: Vec<_> = errors.issues().map(|i| i.member.as_str()).collect();
    assert_eq!(members, vec!["image", "replicas"]);
    assert!(errors.to_string().contains("replicas must be positive, got -1"));
}

#[test]
fn deprecated_fields_are_reported_not_fatal() {
    let registry = cluster_registry();
    let engine = Engine::new(Arc::clone(&registry));
    let root = cluster(&registry, "example.org", &[("web", "nginx:1.25")]);
    service(&root, "web").set_attribute("legacy", "v1").unwrap();

    let report = engine.inspect(&root).unwrap();
    assert_eq!(report.max_severity(), Severity::Deprecation);
    let issue = report.issues().next().unwrap();
    assert_eq!(issue.message, "deprecated: use labels");
    assert!(engine.finish(&root).is_ok());
}

#[test]
fn manual_validation_skips_own_checks_only() {
    let registry = cluster_registry();
    let engine = Engine::new(Arc::clone(&registry));
    let root = cluster(&registry, "", &[("web", "")]);
    root.set_manual_validation(true);

    let report = engine.inspect(&root).unwrap();
    assert!(report.at(&Breadcrumb::root()).is_none());
    assert!(report
        .at(&Breadcrumb::root().keyed("services", "web"))
        .is_some());

    service(&root, "web").set_manual_validation(true);
    assert!(engine.finish(&root).is_ok());
}

#[test]
fn created_defaults_use_templates_captured_at_creation() {
    let registry = cluster_registry();
    let engine = Engine::new(Arc::clone(&registry));
    let service_tpl = engine.template("Service").unwrap();
    service_tpl.set_attribute("image", "registry/base:1").unwrap();
    service_tpl.add_element("ports", 9090).unwrap();
    let probe_tpl = engine.template("Probe").unwrap();
    probe_tpl.set_attribute("path", "/ready").unwrap();

    let web = Templates::with_templates([("Service", &service_tpl), ("Probe", &probe_tpl)], || {
        engine.create("Service", Some("web"))
    })
    .unwrap()
    .unwrap();
    assert_eq!(web.get_attribute("image"), Value::from("registry/base:1"));
    web.set_attribute("image", "registry/web:3").unwrap();

    let root = cluster(&registry, "example.org", &[]);
    root.put_keyed("services", web.clone()).unwrap();
    engine.finish(&root).unwrap();

    assert_eq!(web.get_attribute("image"), Value::from("registry/web:3"));
    assert_eq!(web.get_attribute("ports"), Value::List(vec![Value::from(9090)]));
    let health = web.get_attribute("health");
    assert_eq!(
        health.as_object().unwrap().get_attribute("path"),
        Value::from("/ready")
    );
    assert!(Templates::active("Probe").is_none());
}

#[test]
fn templates_active_at_finish_do_not_reach_created_defaults() {
    let registry = cluster_registry();
    let engine = Engine::new(Arc::clone(&registry));
    let root = cluster(&registry, "example.org", &[("web", "nginx:1.25")]);
    let late = engine.template("Probe").unwrap();
    late.set_attribute("path", "/late").unwrap();

    Templates::with_template("Probe", &late, || engine.finish(&root))
        .unwrap()
        .unwrap();
    let health = service(&root, "web").get_attribute("health");
    assert_eq!(
        health.as_object().unwrap().get_attribute("path"),
        Value::from("/healthz")
    );
}

#[test]
fn deferred_callbacks_run_in_their_phase() {
    let registry = cluster_registry();
    let engine = Engine::new(Arc::clone(&registry));
    let root = cluster(&registry, "example.org", &[("web", "nginx:1.25")]);
    let web = service(&root, "web");
    web.apply_later(PhaseId::APPLY, |svc| {
        // owners are resolved by now
        let domain = svc
            .owner("cluster")
            .map(|c| c.get_attribute("domain"))
            .unwrap_or(Value::Null);
        svc.put_entry("labels", "domain", domain)
            .map_err(|e| HookError::new("label_domain", e.to_string()))
    });

    engine.finish(&root).unwrap();
    let labels = web.get_attribute("labels");
    assert_eq!(
        labels.as_map().and_then(|m| m.get("domain")),
        Some(&Value::from("example.org"))
    );
}

fn audit_registry() -> Arc<SchemaRegistry> {
    fn reject(_: &ObjectRef) -> Result<(), HookError> {
        Err(HookError::new("reject", "not today"))
    }
    let registry = SchemaRegistry::builder()
        .with_type(
            TypeDescriptor::new("Node")
                .field(FieldDescriptor::single("label", ElementType::Str))
                .field(FieldDescriptor::collection("kids", ElementType::Model("Node".into()))),
        )
        .with_type(TypeDescriptor::new("Rejected").post_tree("reject", reject))
        .with_phase(
            PhaseDecl::new("audit")
                .after(PhaseId::APPLY)
                .before(PhaseId::VALIDATE),
        )
        .build()
        .unwrap();
    Arc::new(registry)
}

#[test]
fn custom_phase_runs_between_declared_neighbours() {
    let registry = audit_registry();
    assert_eq!(
        registry.phases().iter().map(PhaseId::name).collect::<Vec<_>>(),
        vec!["create", "owner", "default", "early_validate", "apply", "audit", "validate", "verify", "post_tree"]
    );

    let mut engine = Engine::new(Arc::clone(&registry));
    let root = engine.create("Node", None).unwrap();
    root.add_element("kids", engine.create("Node", None).unwrap()).unwrap();

    assert!(matches!(
        engine.finish(&root),
        Err(EngineError::UnboundPhase(phase)) if phase.name() == "audit"
    ));

    let audited = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&audited);
    engine
        .bind_phase(
            "audit",
            NodePhase::new(move |visit: &Visit<'_>, _: &PhaseContext<'_>| -> Result<(), EngineError> {
                counter.fetch_add(1, Ordering::SeqCst);
                visit.node.set_attribute("label", visit.path.to_string())?;
                Ok(())
            }),
        )
        .unwrap();
    engine.finish(&root).unwrap();
    assert_eq!(audited.load(Ordering::SeqCst), 2);
    let kids = root.get_attribute("kids");
    let kid = kids.as_list().unwrap()[0].as_object().unwrap().clone();
    assert_eq!(kid.get_attribute("label"), Value::from("/kids[0]"));
}

#[test]
fn failing_hook_is_fatal() {
    let registry = audit_registry();
    let mut engine = Engine::new(Arc::clone(&registry));
    engine
        .bind_phase(
            "audit",
            NodePhase::new(|_: &Visit<'_>, _: &PhaseContext<'_>| -> Result<(), EngineError> { Ok(()) }),
        )
        .unwrap();
    let rejected = engine.create("Rejected", None).unwrap();
    let err = engine.finish(&rejected).unwrap_err();
    assert!(!err.is_recoverable());
    assert_eq!(err.to_string(), "post_tree hook failed: reject: not today");
}

#[test]
fn config_document_drives_threshold() {
    let registry = cluster_registry();
    let config = EngineConfig::from_toml_str("fail_threshold = \"warn\"\n").unwrap();
    let engine = Engine::with_config(Arc::clone(&registry), config);
    let root = cluster(&registry, "example.org", &[("api", "api")]);
    assert!(engine.finish(&root).unwrap_err().is_recoverable());
}
