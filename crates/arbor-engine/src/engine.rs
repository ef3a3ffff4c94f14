//! Engine facade
//!
//! Entry points used by construction code: create objects with the active
//! templates applied, build templates, and finish trees.

use crate::config::EngineConfig;
use crate::driver::{PhaseAction, PhaseDriver, RunMode};
use crate::error::EngineError;
use crate::report::ValidationReport;
use crate::validator::{collect_report, validate_node};
use arbor_merge::{seed_from_templates, Templates};
use arbor_model::{ObjectRef, PhaseId, SchemaRegistry, Severity, ValidationResult};
use std::sync::Arc;
use tracing::{debug, info};

/// Builds and finishes model trees over one registry
#[derive(Debug)]
pub struct Engine {
    driver: PhaseDriver,
}

impl Engine {
    /// Engine with the default configuration
    #[must_use]
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    /// Engine with an explicit configuration
    #[must_use]
    pub fn with_config(registry: Arc<SchemaRegistry>, config: EngineConfig) -> Self {
        Self {
            driver: PhaseDriver::new(registry, config),
        }
    }

    /// Schema registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        self.driver.registry()
    }

    /// Engine configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        self.driver.config()
    }

    /// Bind the action of a custom (or built-in) phase
    ///
    /// # Errors
    /// [`EngineError::UndeclaredPhase`] if the registry does not declare it
    pub fn bind_phase(
        &mut self,
        phase: impl Into<PhaseId>,
        action: impl PhaseAction + 'static,
    ) -> Result<(), EngineError> {
        self.driver.bind(phase.into(), Arc::new(action))
    }

    /// New object of `type_name`, seeded from the active templates
    ///
    /// # Errors
    /// Unknown type, key contract violation, or a failing template copy.
    pub fn create(&self, type_name: &str, key: Option<&str>) -> Result<ObjectRef, EngineError> {
        instantiate(self.registry(), type_name, key)
    }

    /// New empty template of `type_name`
    ///
    /// # Errors
    /// [`EngineError::Schema`] for an unknown type
    pub fn template(&self, type_name: &str) -> Result<ObjectRef, EngineError> {
        let schema = self.registry().resolve(type_name)?;
        Ok(ObjectRef::new_template(schema))
    }

    /// Run every phase over `root`, failing at the configured threshold
    ///
    /// # Errors
    /// Any fatal error, or [`EngineError::Validation`] once the worst
    /// recorded issue reaches the threshold.
    pub fn finish(&self, root: &ObjectRef) -> Result<ObjectRef, EngineError> {
        self.finish_with(root, self.config().fail_threshold)
    }

    /// Run every phase over `root`, failing at `threshold`
    ///
    /// `Severity::None` never fails on validation.
    ///
    /// # Errors
    /// See [`Engine::finish`].
    pub fn finish_with(&self, root: &ObjectRef, threshold: Severity) -> Result<ObjectRef, EngineError> {
        ensure_executable(root)?;
        self.driver.run(root, RunMode::Enforce { threshold })?;
        info!(root = ?root, threshold = %threshold, "build finished");
        Ok(root.clone())
    }

    /// Run every phase over `root` and return the issues without raising
    ///
    /// # Errors
    /// Fatal errors only.
    pub fn inspect(&self, root: &ObjectRef) -> Result<ValidationReport, EngineError> {
        ensure_executable(root)?;
        self.driver.run(root, RunMode::Inspect)?;
        let report = collect_report(root);
        info!(root = ?root, issues = report.len(), "build inspected");
        Ok(report)
    }

    /// Validate a single object with the configured policy
    #[must_use]
    pub fn validate(&self, node: &ObjectRef) -> ValidationResult {
        validate_node(node, self.config().validation_policy)
    }
}

/// Instantiate an object and seed it from the thread's active templates
///
/// The snapshot of active templates is captured on the object so that
/// nested objects created later see the same templates.
pub(crate) fn instantiate(
    registry: &SchemaRegistry,
    type_name: &str,
    key: Option<&str>,
) -> Result<ObjectRef, EngineError> {
    let schema = registry.resolve(type_name)?;
    let obj = ObjectRef::new(schema, key.map(str::to_string))?;
    let snapshot = Templates::snapshot();
    let seeded = seed_from_templates(&obj, &snapshot)?;
    obj.capture_templates(snapshot);
    debug!(node = ?obj, templates = seeded, "object created");
    Ok(obj)
}

fn ensure_executable(root: &ObjectRef) -> Result<(), EngineError> {
    if root.is_template() {
        return Err(EngineError::TemplateNotExecutable(root.type_name().to_string()));
    }
    Ok(())
}
