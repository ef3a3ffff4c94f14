//! Validator
//!
//! Per-object checks, run level by level from the root ancestor type:
//! - deprecated fields holding a value yield a DEPRECATION issue
//! - marked fields (or every field in `AllFields` mode) are checked for
//!   truthiness or against a custom predicate
//! - class validators run afterwards, in name order
//!
//! [`validate_tree`] validates children before their container and stores
//! each node's result on the node.

use crate::config::ValidationPolicy;
use crate::report::ValidationReport;
use crate::visitor::{children, collect};
use arbor_model::{
    Breadcrumb, Check, ClassValidator, FieldKind, FieldValidation, ObjectRef, ResolvedField,
    Severity, ValidationIssue, ValidationMode, ValidationResult, Value,
};
use tracing::warn;

/// Validation entry point on the instance proxy
pub trait Validate {
    /// Run this object's own checks (children excluded)
    fn validate(&self, policy: ValidationPolicy) -> ValidationResult;
}

impl Validate for ObjectRef {
    fn validate(&self, policy: ValidationPolicy) -> ValidationResult {
        validate_node(self, policy)
    }
}

/// This object's own checks
///
/// Uses the breadcrumb recorded by the last traversal.
#[must_use]
pub fn validate_node(node: &ObjectRef, policy: ValidationPolicy) -> ValidationResult {
    let path = node.breadcrumb();
    let mut result = ValidationResult::new(path.clone());
    let schema = node.schema();

    for field in schema.fields() {
        if let Some(note) = &field.descriptor.deprecated {
            if node.get_attribute(field.name()).is_truthy() {
                result.add(ValidationIssue::new(
                    path.clone(),
                    field.name(),
                    format!("deprecated: {note}"),
                    Severity::Deprecation,
                ));
            }
        }
    }

    'levels: for (level, descriptor) in schema.hierarchy().iter().enumerate() {
        for field in schema.fields_at(level) {
            let Some(validation) = checked(field, descriptor.validation_mode) else {
                continue;
            };
            let value = node.get_attribute(field.name());
            if passes(&validation.check, &value) {
                continue;
            }
            result.add(ValidationIssue::new(
                path.clone(),
                field.name(),
                message(field, &validation, &value),
                validation.level,
            ));
            if policy == ValidationPolicy::FailFast {
                break 'levels;
            }
        }
    }

    let mut validators: Vec<&ClassValidator> = schema
        .hierarchy()
        .iter()
        .flat_map(|t| t.validators.iter())
        .collect();
    run_class_validators(node, &path, &mut validators, &mut result);

    result
}

/// Run class validators in name order, recording failures
pub(crate) fn run_class_validators(
    node: &ObjectRef,
    path: &Breadcrumb,
    validators: &mut [&ClassValidator],
    result: &mut ValidationResult,
) {
    validators.sort_by(|a, b| a.name.cmp(&b.name));
    for validator in validators.iter() {
        if let Err(failure) = (validator.check)(node) {
            let issue = ValidationIssue::new(
                path.clone(),
                validator.name.as_str(),
                failure.message,
                validator.level,
            );
            result.add(match failure.cause {
                Some(cause) => issue.with_cause(cause),
                None => issue,
            });
        }
    }
}

/// Validate a whole tree, children before their container
///
/// Each node's own result is merged into the result stored on the node.
/// Nodes with manual validation enabled skip their own checks but their
/// children are still validated. Returns the aggregate of this run.
pub fn validate_tree(root: &ObjectRef, policy: ValidationPolicy) -> ValidationReport {
    let mut report = ValidationReport::new();
    validate_subtree(root, &Breadcrumb::root(), policy, &mut report);
    report
}

/// Aggregate the results stored on the nodes of a tree
///
/// Nodes with manual validation enabled are left out.
#[must_use]
pub fn collect_report(root: &ObjectRef) -> ValidationReport {
    let mut report = ValidationReport::new();
    for node in collect(root) {
        if node.manual_validation() {
            continue;
        }
        if let Some(result) = node.validation_result() {
            report.add(&result);
        }
    }
    report
}

fn validate_subtree(
    node: &ObjectRef,
    path: &Breadcrumb,
    policy: ValidationPolicy,
    report: &mut ValidationReport,
) {
    node.set_breadcrumb(path.clone());
    for child in children(node, path) {
        validate_subtree(&child.node, &child.path, policy, report);
    }
    if node.manual_validation() {
        return;
    }
    let result = validate_node(node, policy);
    for issue in result.iter().filter(|i| i.level >= Severity::Warn) {
        warn!(path = %issue.path.label(), member = %issue.member, level = %issue.level, "{}", issue.message);
    }
    node.record_validation(&result);
    report.add(&result);
}

fn checked(field: &ResolvedField, mode: ValidationMode) -> Option<FieldValidation> {
    if matches!(field.kind(), FieldKind::Owner { .. } | FieldKind::Key | FieldKind::Ignored) {
        return None;
    }
    match (&field.descriptor.validation, mode) {
        (Some(validation), _) => Some(validation.clone()),
        (None, ValidationMode::AllFields) if !field.descriptor.skip_validation => {
            Some(FieldValidation::truthy())
        }
        _ => None,
    }
}

fn passes(check: &Check, value: &Value) -> bool {
    match check {
        Check::Truthy => value.is_truthy(),
        Check::Predicate(predicate) => (predicate.func)(value),
    }
}

fn message(field: &ResolvedField, validation: &FieldValidation, value: &Value) -> String {
    match (&validation.message, &validation.check) {
        (Some(template), _) => template
            .replace("{field}", field.name())
            .replace("{value}", &value.to_string()),
        (None, Check::Truthy) => format!("{} is required", field.name()),
        (None, Check::Predicate(predicate)) => format!(
            "{} failed check '{}' with value {}",
            field.name(),
            predicate.name,
            value
        ),
    }
}
