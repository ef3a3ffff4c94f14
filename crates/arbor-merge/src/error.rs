//! Merge and template errors

use arbor_model::ModelError;

/// Errors raised while seeding or merging model objects
///
/// All variants abort the build in progress.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    /// Source and target types are unrelated
    #[error("cannot merge '{from}' into unrelated type '{into}'")]
    Incompatible {
        /// Source type
        from: String,
        /// Target type
        into: String,
    },

    /// Object activated as a template is a regular instance
    #[error("'{type_name}' object is not a template")]
    NotATemplate {
        /// Type of the offending object
        type_name: String,
    },

    /// Template activated for a type it does not belong to
    #[error("template of type '{actual}' cannot stand in for '{expected}'")]
    TemplateType {
        /// Type the template was activated for
        expected: String,
        /// Template's own type
        actual: String,
    },

    /// Value rejected by the target field
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl MergeError {
    /// Create incompatible-types error
    #[inline]
    #[must_use]
    pub fn incompatible(from: impl Into<String>, into: impl Into<String>) -> Self {
        Self::Incompatible {
            from: from.into(),
            into: into.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let err = MergeError::incompatible("Dog", "Car");
        assert_eq!(err.to_string(), "cannot merge 'Dog' into unrelated type 'Car'");

        let err = MergeError::from(ModelError::UnknownField {
            type_name: "Car".into(),
            field: "wings".into(),
        });
        assert!(matches!(err, MergeError::Model(_)));
    }
}
