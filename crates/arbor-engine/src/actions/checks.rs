//! Validation phases

use crate::driver::{PhaseAction, PhaseContext, RunMode};
use crate::error::EngineError;
use crate::report::ValidationFailure;
use crate::validator::{collect_report, run_class_validators, validate_tree};
use crate::visitor::visit;
use arbor_model::{ClassValidator, ObjectRef, Severity, ValidationResult};
use tracing::debug;

/// EARLY_VALIDATE: early class validators, recorded on each node
#[derive(Debug, Clone, Copy, Default)]
pub struct EarlyValidate;

impl PhaseAction for EarlyValidate {
    fn run(&self, root: &ObjectRef, _ctx: &PhaseContext<'_>) -> Result<(), EngineError> {
        visit::<_, EngineError>(root, |v| {
            if v.node.manual_validation() {
                return Ok(());
            }
            let schema = v.node.schema();
            let mut validators: Vec<&ClassValidator> = schema
                .hierarchy()
                .iter()
                .flat_map(|t| t.early_validators.iter())
                .collect();
            if validators.is_empty() {
                return Ok(());
            }
            let mut result = ValidationResult::new(v.path.clone());
            run_class_validators(v.node, v.path, &mut validators, &mut result);
            v.node.record_validation(&result);
            Ok(())
        })
    }
}

/// VALIDATE: whole-tree validation, children first
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateTree;

impl PhaseAction for ValidateTree {
    fn run(&self, root: &ObjectRef, ctx: &PhaseContext<'_>) -> Result<(), EngineError> {
        let report = validate_tree(root, ctx.config.validation_policy);
        debug!(issues = report.len(), max = %report.max_severity(), "tree validated");
        Ok(())
    }
}

/// VERIFY: fail once the worst recorded issue meets the threshold
#[derive(Debug, Clone, Copy, Default)]
pub struct Verify;

impl PhaseAction for Verify {
    fn run(&self, root: &ObjectRef, ctx: &PhaseContext<'_>) -> Result<(), EngineError> {
        let RunMode::Enforce { threshold } = ctx.mode else {
            return Ok(());
        };
        let report = collect_report(root);
        let worst = report.max_severity();
        if threshold > Severity::None && worst > Severity::None && worst >= threshold {
            return Err(ValidationFailure::new(&report, threshold).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::driver::{PhaseDriver, RunMode};
    use crate::error::EngineError;
    use arbor_model::{
        CheckFailure, ClassValidator, ObjectRef, PhaseId, SchemaRegistry, Severity, TypeDescriptor,
    };
    use std::sync::Arc;

    fn never(_: &ObjectRef) -> Result<(), CheckFailure> {
        Err(CheckFailure::new("never valid"))
    }

    fn setup() -> (PhaseDriver, ObjectRef) {
        let registry = SchemaRegistry::builder()
            .with_type(TypeDescriptor::new("Gate").early_validator(ClassValidator::new("never", never)))
            .build()
            .unwrap();
        let driver = PhaseDriver::new(Arc::new(registry), EngineConfig::default());
        let gate = ObjectRef::new(driver.registry().get("Gate").unwrap(), None).unwrap();
        (driver, gate)
    }

    #[test]
    fn early_issues_are_verified() {
        let (driver, gate) = setup();
        driver
            .run_phase(&gate, &PhaseId::EARLY_VALIDATE, RunMode::Inspect)
            .unwrap();
        assert_eq!(gate.validation_result().unwrap().max_severity(), Severity::Error);

        let enforce = RunMode::Enforce { threshold: Severity::Error };
        assert!(matches!(
            driver.run_phase(&gate, &PhaseId::VERIFY, enforce),
            Err(EngineError::Validation(_))
        ));
        assert!(driver.run_phase(&gate, &PhaseId::VERIFY, RunMode::Inspect).is_ok());
        let disabled = RunMode::Enforce { threshold: Severity::None };
        assert!(driver.run_phase(&gate, &PhaseId::VERIFY, disabled).is_ok());
    }

    #[test]
    fn manual_nodes_skip_early_validators() {
        let (driver, gate) = setup();
        gate.set_manual_validation(true);
        driver
            .run_phase(&gate, &PhaseId::EARLY_VALIDATE, RunMode::Inspect)
            .unwrap();
        assert!(gate.validation_result().is_none());
    }
}
