//! Whole-tree validation aggregate
//!
//! [`ValidationReport`] groups per-object results by breadcrumb path.
//! [`ValidationFailure`] is the error raised when a report reaches the
//! configured threshold.

use arbor_model::{Breadcrumb, Severity, ValidationIssue, ValidationResult};
use std::collections::BTreeMap;
use std::fmt;

/// Validation results of a whole tree, keyed by breadcrumb path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    results: BTreeMap<Breadcrumb, ValidationResult>,
}

impl ValidationReport {
    /// Create empty report
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a per-object result; empty results are ignored
    pub fn add(&mut self, result: &ValidationResult) {
        if result.is_empty() {
            return;
        }
        self.results
            .entry(result.path().clone())
            .or_insert_with(|| ValidationResult::new(result.path().clone()))
            .merge(result);
    }

    /// Merge another report
    pub fn merge(&mut self, other: &Self) {
        for result in other.results.values() {
            self.add(result);
        }
    }

    /// Results grouped by path, in path order
    #[inline]
    #[must_use]
    pub fn by_path(&self) -> &BTreeMap<Breadcrumb, ValidationResult> {
        &self.results
    }

    /// Result recorded for one path
    #[inline]
    #[must_use]
    pub fn at(&self, path: &Breadcrumb) -> Option<&ValidationResult> {
        self.results.get(path)
    }

    /// All issues, by path then descending severity then member
    pub fn issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.results.values().flat_map(ValidationResult::iter)
    }

    /// Highest severity in the report
    #[must_use]
    pub fn max_severity(&self) -> Severity {
        self.results
            .values()
            .map(ValidationResult::max_severity)
            .max()
            .unwrap_or(Severity::None)
    }

    /// Issues at or above `min`; paths left without issues are dropped
    #[must_use]
    pub fn filter(&self, min: Severity) -> Self {
        let results = self
            .results
            .iter()
            .map(|(path, result)| (path.clone(), result.filter(min)))
            .filter(|(_, result)| !result.is_empty())
            .collect();
        Self { results }
    }

    /// Total number of issues
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.values().map(ValidationResult::len).sum()
    }

    /// Check if no issues were recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (path, result) in &self.results {
            writeln!(f, "{}", path.label())?;
            for issue in result.iter() {
                writeln!(f, "  {issue}")?;
            }
        }
        Ok(())
    }
}

/// Raised when a tree's worst issue meets the failure threshold
#[derive(Debug, Clone)]
pub struct ValidationFailure {
    report: ValidationReport,
    threshold: Severity,
}

impl ValidationFailure {
    /// Failure carrying the issues at or above `threshold`
    #[must_use]
    pub fn new(report: &ValidationReport, threshold: Severity) -> Self {
        Self {
            report: report.filter(threshold),
            threshold,
        }
    }

    /// Offending issues
    #[inline]
    #[must_use]
    pub fn report(&self) -> &ValidationReport {
        &self.report
    }

    /// Threshold that was met
    #[inline]
    #[must_use]
    pub fn threshold(&self) -> Severity {
        self.threshold
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "validation failed with {} issue(s) at or above {}",
            self.report.len(),
            self.threshold
        )?;
        write!(f, "{}", self.report)
    }
}

impl std::error::Error for ValidationFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.report
            .issues()
            .find_map(|issue| issue.cause.as_deref())
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}
