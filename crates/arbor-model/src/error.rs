//! Error types for schema registration and model access
//!
//! - [`SchemaError`]: configuration mistakes found while building the registry
//! - [`ModelError`]: contract violations when reading or writing model objects
//! - [`HookError`]: failures reported by user-supplied hooks and callbacks

/// Errors found while building a [`SchemaRegistry`](crate::SchemaRegistry)
///
/// All of these are fatal setup errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Type registered twice
    #[error("type '{0}' registered more than once")]
    DuplicateType(String),

    /// Reference to a type that was never registered
    #[error("unknown type '{name}' referenced from {referenced_by}")]
    UnknownType {
        /// Missing type name
        name: String,
        /// Where the reference appeared
        referenced_by: String,
    },

    /// Parent chain loops back on itself
    #[error("inheritance cycle through type '{0}'")]
    InheritanceCycle(String),

    /// Same field name declared on several levels of one hierarchy
    #[error("field '{field}' of type '{type_name}' is declared more than once in its hierarchy")]
    DuplicateField {
        /// Type whose hierarchy collides
        type_name: String,
        /// Colliding field name
        field: String,
    },

    /// More than one key field in a hierarchy
    #[error("type '{type_name}' declares more than one key field: {fields:?}")]
    AmbiguousKey {
        /// Offending type
        type_name: String,
        /// All key fields found
        fields: Vec<String>,
    },

    /// Key field with a non-string element type
    #[error("key field '{field}' of type '{type_name}' must hold a string")]
    InvalidKeyField {
        /// Offending type
        type_name: String,
        /// Key field name
        field: String,
    },

    /// Owner field whose element type is not a model type
    #[error("owner field '{field}' of type '{type_name}' must reference a model type")]
    InvalidOwnerField {
        /// Offending type
        type_name: String,
        /// Owner field name
        field: String,
    },

    /// Field-level merge strategy does not fit the field kind
    #[error("field '{field}' of type '{type_name}' is a {kind} field but declares a {strategy} strategy")]
    StrategyKindMismatch {
        /// Offending type
        type_name: String,
        /// Field name
        field: String,
        /// Field kind
        kind: &'static str,
        /// Declared strategy family
        strategy: &'static str,
    },

    /// Map of unkeyed models without a key mapping
    #[error("map field '{field}' of type '{type_name}' holds unkeyed '{element}' values and declares no key mapping")]
    MissingKeyMapping {
        /// Offending type
        type_name: String,
        /// Map field name
        field: String,
        /// Element type name
        element: String,
    },

    /// Default declaration that cannot be honoured
    #[error("field '{field}' of type '{type_name}' has an invalid default: {reason}")]
    InvalidDefault {
        /// Offending type
        type_name: String,
        /// Field name
        field: String,
        /// Explanation
        reason: String,
    },

    /// Phase registered twice
    #[error("phase '{0}' registered more than once")]
    DuplicatePhase(String),

    /// Ordering relation names an unknown phase
    #[error("phase '{phase}' is ordered relative to unknown phase '{unknown}'")]
    UnknownPhase {
        /// Declaring phase
        phase: String,
        /// Missing phase
        unknown: String,
    },

    /// Phase ordering relations form a cycle
    #[error("phase ordering cycle through '{0}'")]
    PhaseCycle(String),
}

/// Errors raised by instance proxy operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Field does not exist in the object's hierarchy
    #[error("type '{type_name}' has no field '{field}'")]
    UnknownField {
        /// Object type
        type_name: String,
        /// Requested field
        field: String,
    },

    /// Operation does not apply to the field kind
    #[error("field '{field}' of type '{type_name}' is a {kind} field, cannot {operation}")]
    WrongFieldKind {
        /// Object type
        type_name: String,
        /// Field name
        field: String,
        /// Actual kind
        kind: &'static str,
        /// Attempted operation
        operation: &'static str,
    },

    /// Value not assignable to the declared element type
    #[error("field '{field}' of type '{type_name}' expects {expected}, got {actual}")]
    TypeMismatch {
        /// Object type
        type_name: String,
        /// Field name
        field: String,
        /// Declared element type
        expected: String,
        /// Offending value description
        actual: String,
    },

    /// Keyed type instantiated without a key, or unkeyed type given one
    #[error("type '{type_name}' {reason}")]
    KeyContract {
        /// Object type
        type_name: String,
        /// Explanation
        reason: &'static str,
    },

    /// Key fields are immutable after construction
    #[error("key field '{field}' of type '{type_name}' is immutable")]
    ImmutableKey {
        /// Object type
        type_name: String,
        /// Key field
        field: String,
    },

    /// Map insertion could not derive a key
    #[error("cannot derive a map key for field '{field}' of type '{type_name}'")]
    NoMapKey {
        /// Object type
        type_name: String,
        /// Map field
        field: String,
    },

    /// Object already lives in another container
    #[error("object of type '{child}' is already contained elsewhere; cannot store it in '{field}'")]
    AlreadyContained {
        /// Child type
        child: String,
        /// Target field
        field: String,
    },

    /// Storing the object would make the tree cyclic
    #[error("storing '{child}' in field '{field}' would create a cycle")]
    CycleDetected {
        /// Child type
        child: String,
        /// Target field
        field: String,
    },
}

/// Failure reported by a user hook, callback or provider
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{hook}: {message}")]
pub struct HookError {
    /// Hook name
    pub hook: String,
    /// Failure description
    pub message: String,
}

impl HookError {
    /// Create hook error
    #[inline]
    #[must_use]
    pub fn new(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            hook: hook.into(),
            message: message.into(),
        }
    }
}
