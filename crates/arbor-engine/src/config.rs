//! Engine configuration

use arbor_model::Severity;
use serde::{Deserialize, Serialize};

/// How many failing field checks one object may report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Stop an object's field checks at its first failure
    #[default]
    FailFast,

    /// Check every field and report all failures
    CollectAll,
}

/// Errors loading a configuration document
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Malformed TOML
    #[error("invalid toml config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Malformed JSON
    #[error("invalid json config: {0}")]
    Json(#[from] serde_json::Error),

    /// Well-formed but unusable values
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum severity that makes verification fail
    pub fail_threshold: Severity,

    /// Per-object field check policy
    pub validation_policy: ValidationPolicy,

    /// Re-scans a phase may take to reach nodes it created itself
    pub max_stabilization_rounds: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fail_threshold: Severity::Error,
            validation_policy: ValidationPolicy::FailFast,
            max_stabilization_rounds: 64,
        }
    }
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With failure threshold
    #[inline]
    #[must_use]
    pub fn with_fail_threshold(mut self, threshold: Severity) -> Self {
        self.fail_threshold = threshold;
        self
    }

    /// With validation policy
    #[inline]
    #[must_use]
    pub fn with_validation_policy(mut self, policy: ValidationPolicy) -> Self {
        self.validation_policy = policy;
        self
    }

    /// With stabilisation bound
    #[inline]
    #[must_use]
    pub fn with_max_stabilization_rounds(mut self, rounds: usize) -> Self {
        self.max_stabilization_rounds = rounds;
        self
    }

    /// Load from a TOML document; missing keys keep their defaults
    ///
    /// # Errors
    /// [`ConfigError`] for malformed or unusable documents
    pub fn from_toml_str(doc: &str) -> Result<Self, ConfigError> {
        toml::from_str::<Self>(doc)?.validated()
    }

    /// Load from a JSON document; missing keys keep their defaults
    ///
    /// # Errors
    /// [`ConfigError`] for malformed or unusable documents
    pub fn from_json_str(doc: &str) -> Result<Self, ConfigError> {
        serde_json::from_str::<Self>(doc)?.validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.max_stabilization_rounds == 0 {
            return Err(ConfigError::Invalid(
                "max_stabilization_rounds must be at least 1".to_string(),
            ));
        }
        Ok(self)
    }
}
