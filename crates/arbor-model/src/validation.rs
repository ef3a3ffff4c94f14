//! Validation data types
//!
//! - [`Severity`]: totally ordered issue level
//! - [`ValidationIssue`]: one finding against one member of one object
//! - [`ValidationResult`]: sorted, deduplicated issues of a single object

use crate::path::Breadcrumb;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Issue severity, ordered `None < Info < Warn < Deprecation < Error`
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// No issue
    #[default]
    None,

    /// Informational
    Info,

    /// Suspicious but acceptable
    Warn,

    /// Use of a deprecated member
    Deprecation,

    /// Invalid configuration
    Error,
}

impl Severity {
    /// Upper-case label used in rendered reports
    #[inline]
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Deprecation => "DEPRECATION",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Underlying error attached to an issue
pub type IssueCause = Arc<dyn std::error::Error + Send + Sync>;

/// Failure reported by a class validator
#[derive(Debug, Clone)]
pub struct CheckFailure {
    /// Human-readable description
    pub message: String,

    /// Underlying error, if any
    pub cause: Option<IssueCause>,
}

impl CheckFailure {
    /// Failure without cause
    #[inline]
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    /// Failure described by `message` and caused by `cause`
    #[must_use]
    pub fn caused_by<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }
}

impl From<String> for CheckFailure {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for CheckFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Single validation finding
///
/// Equality and ordering ignore the attached cause. Issues sort by path,
/// then descending severity, then member name, then message.
#[derive(Clone)]
pub struct ValidationIssue {
    /// Location of the offending object
    pub path: Breadcrumb,

    /// Offending field or validator name
    pub member: String,

    /// Human-readable description
    pub message: String,

    /// Severity
    pub level: Severity,

    /// Underlying error, if any
    pub cause: Option<IssueCause>,
}

impl ValidationIssue {
    /// Create issue without cause
    #[inline]
    #[must_use]
    pub fn new(
        path: Breadcrumb,
        member: impl Into<String>,
        message: impl Into<String>,
        level: Severity,
    ) -> Self {
        Self {
            path,
            member: member.into(),
            message: message.into(),
            level,
            cause: None,
        }
    }

    /// Attach an underlying cause
    #[inline]
    #[must_use]
    pub fn with_cause(mut self, cause: IssueCause) -> Self {
        self.cause = Some(cause);
        self
    }

    fn sort_key(&self) -> (&Breadcrumb, std::cmp::Reverse<Severity>, &str, &str) {
        (
            &self.path,
            std::cmp::Reverse(self.level),
            &self.member,
            &self.message,
        )
    }
}

impl fmt::Debug for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationIssue")
            .field("path", &self.path.to_string())
            .field("member", &self.member)
            .field("message", &self.message)
            .field("level", &self.level)
            .field("cause", &self.cause.as_ref().map(ToString::to_string))
            .finish()
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.level, self.member, self.message)
    }
}

impl PartialEq for ValidationIssue {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for ValidationIssue {}

impl PartialOrd for ValidationIssue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ValidationIssue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Sorted, deduplicated issues of one object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    path: Breadcrumb,
    issues: BTreeSet<ValidationIssue>,
}

impl ValidationResult {
    /// Create empty result for an object
    #[inline]
    #[must_use]
    pub fn new(path: Breadcrumb) -> Self {
        Self {
            path,
            issues: BTreeSet::new(),
        }
    }

    /// Location of the object
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Breadcrumb {
        &self.path
    }

    /// Record an issue; duplicates are dropped
    #[inline]
    pub fn add(&mut self, issue: ValidationIssue) {
        self.issues.insert(issue);
    }

    /// Merge all issues of another result
    #[inline]
    pub fn merge(&mut self, other: &Self) {
        self.issues.extend(other.issues.iter().cloned());
    }

    /// Highest severity present, `None` when empty
    #[must_use]
    pub fn max_severity(&self) -> Severity {
        self.issues
            .iter()
            .map(|i| i.level)
            .max()
            .unwrap_or(Severity::None)
    }

    /// Issues at or above `min`
    #[must_use]
    pub fn filter(&self, min: Severity) -> Self {
        Self {
            path: self.path.clone(),
            issues: self
                .issues
                .iter()
                .filter(|i| i.level >= min)
                .cloned()
                .collect(),
        }
    }

    /// Iterate issues in sort order
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter()
    }

    /// Number of issues
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// Check if no issues were recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}
