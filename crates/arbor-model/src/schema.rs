//! Schema descriptors
//!
//! Static per-type metadata consumed by the registry: field kinds, element
//! types, merge strategy overrides, validation markers, defaults and
//! lifecycle hooks. Behavioural extension points are named function
//! references ([`Named`]) so diagnostics can refer to them.

use crate::error::HookError;
use crate::object::ObjectRef;
use crate::validation::{CheckFailure, Severity};
use crate::value::Value;
use std::fmt;

/// Structural role of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Single value or nested model
    Single,

    /// Ordered sequence
    Collection,

    /// String-keyed map
    Map,

    /// Back-reference to an ancestor, never a structural edge
    Owner {
        /// Resolve to the nearest compatible ancestor instead of the container
        transitive: bool,
    },

    /// Immutable key of a keyed type
    Key,

    /// Transient field skipped by copy, merge and validation
    Ignored,
}

impl FieldKind {
    /// Kind label for diagnostics
    #[inline]
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Collection => "collection",
            Self::Map => "map",
            Self::Owner { .. } => "owner",
            Self::Key => "key",
            Self::Ignored => "ignored",
        }
    }

    /// Whether the field can hold structural children
    #[inline]
    #[must_use]
    pub fn is_structural(self) -> bool {
        matches!(self, Self::Single | Self::Collection | Self::Map)
    }
}

/// Declared type of a field value (or of collection/map elements)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// Anything
    Any,

    /// Boolean
    Bool,

    /// Integer
    Int,

    /// Float (integers accepted)
    Float,

    /// String
    Str,

    /// Model object of the named type or one of its subtypes
    Model(String),
}

impl ElementType {
    /// Model type name, if this is a model element
    #[inline]
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        match self {
            Self::Model(name) => Some(name),
            _ => None,
        }
    }

    /// Check a single element against this type; null is always accepted
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (Self::Any, _) => true,
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Int, Value::Int(_)) => true,
            (Self::Float, Value::Float(_) | Value::Int(_)) => true,
            (Self::Str, Value::Str(_)) => true,
            (Self::Model(name), Value::Object(obj)) => obj.is_a(name),
            _ => false,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Str => f.write_str("string"),
            Self::Model(name) => write!(f, "model '{name}'"),
        }
    }
}

/// Merge strategies for single-valued fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SingleStrategy {
    /// Copy source value when it is non-null
    Replace,

    /// Copy source value, null included
    AlwaysReplace,

    /// Copy only when the target is null
    SetIfNull,

    /// Recursively merge nested models
    Merge,
}

/// Merge strategies for collection fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionStrategy {
    /// Append source elements
    Add,

    /// Replace target when source is non-empty
    Replace,

    /// Always clear target, then append source elements
    AlwaysReplace,
}

/// Merge strategies for map fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapStrategy {
    /// Replace target when source is non-empty
    FullReplace,

    /// Always clear target, then copy source entries
    AlwaysReplace,

    /// Insert or overwrite every source entry
    MergeKeys,

    /// Recursively merge nested model values per key
    MergeValues,

    /// Insert only missing keys
    AddMissing,
}

/// Merge strategy resolved for one field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeStrategy {
    /// Single-valued field strategy
    Single(SingleStrategy),

    /// Collection field strategy
    Collection(CollectionStrategy),

    /// Map field strategy
    Map(MapStrategy),
}

impl MergeStrategy {
    /// Strategy family label for diagnostics
    #[inline]
    #[must_use]
    pub fn family(self) -> &'static str {
        match self {
            Self::Single(_) => "single",
            Self::Collection(_) => "collection",
            Self::Map(_) => "map",
        }
    }

    /// Whether the strategy family fits the field kind
    #[inline]
    #[must_use]
    pub fn fits(self, kind: FieldKind) -> bool {
        matches!(
            (self, kind),
            (Self::Single(_), FieldKind::Single)
                | (Self::Collection(_), FieldKind::Collection)
                | (Self::Map(_), FieldKind::Map)
        )
    }
}

/// Type-level strategy overrides, one slot per field kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeDefaults {
    /// Override for single-valued fields
    pub single: Option<SingleStrategy>,

    /// Override for collection fields
    pub collection: Option<CollectionStrategy>,

    /// Override for map fields
    pub map: Option<MapStrategy>,
}

impl MergeDefaults {
    /// Override applicable to a field kind, if declared
    #[must_use]
    pub fn for_kind(&self, kind: FieldKind) -> Option<MergeStrategy> {
        match kind {
            FieldKind::Single => self.single.map(MergeStrategy::Single),
            FieldKind::Collection => self.collection.map(MergeStrategy::Collection),
            FieldKind::Map => self.map.map(MergeStrategy::Map),
            _ => None,
        }
    }
}

/// Named function reference
#[derive(Clone)]
pub struct Named<F> {
    /// Name used in diagnostics and for ordering
    pub name: String,

    /// Function
    pub func: F,
}

impl<F> Named<F> {
    /// Wrap a function under a name
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> fmt::Debug for Named<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Named({})", self.name)
    }
}

/// Custom field predicate; `true` means valid
pub type FieldPredicate = fn(&Value) -> bool;

/// Computes a default value for a node
pub type ValueProvider = fn(&ObjectRef) -> Result<Value, HookError>;

/// Lifecycle hook run on a node
pub type NodeHook = fn(&ObjectRef) -> Result<(), HookError>;

/// Class-level check; `Err` carries the issue message and optional cause
pub type ObjectCheck = fn(&ObjectRef) -> Result<(), CheckFailure>;

/// Called with `(node, owner)` once owners are resolved
pub type OwnerCallback = fn(&ObjectRef, &ObjectRef) -> Result<(), HookError>;

/// Derives a map key for a model value
pub type KeyMapping = fn(&ObjectRef) -> Option<String>;

/// Predicate applied to a checked field
#[derive(Debug, Clone)]
pub enum Check {
    /// Value must be truthy
    Truthy,

    /// Custom predicate
    Predicate(Named<FieldPredicate>),
}

/// Validation marker on a field
#[derive(Debug, Clone)]
pub struct FieldValidation {
    /// Predicate to apply
    pub check: Check,

    /// Custom message; `{field}` and `{value}` are substituted
    pub message: Option<String>,

    /// Severity of a failure
    pub level: Severity,
}

impl FieldValidation {
    /// Truthiness check at error level
    #[inline]
    #[must_use]
    pub fn truthy() -> Self {
        Self {
            check: Check::Truthy,
            message: None,
            level: Severity::Error,
        }
    }

    /// Custom predicate at error level
    #[inline]
    #[must_use]
    pub fn predicate(name: impl Into<String>, predicate: FieldPredicate) -> Self {
        Self {
            check: Check::Predicate(Named::new(name, predicate)),
            message: None,
            level: Severity::Error,
        }
    }

    /// Set custom message
    #[inline]
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Set severity
    #[inline]
    #[must_use]
    pub fn with_level(mut self, level: Severity) -> Self {
        self.level = level;
        self
    }
}

/// Which fields of a hierarchy level are validated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValidationMode {
    /// Only fields carrying a validation marker
    #[default]
    MarkedOnly,

    /// Every non-ignored field unless explicitly excluded
    AllFields,
}

/// Default value filled in during the DEFAULT phase
#[derive(Debug, Clone)]
pub enum DefaultValue {
    /// Fixed value
    Literal(Value),

    /// Copy of another field of the same object
    FromField(String),

    /// Computed from the node
    Provider(Named<ValueProvider>),

    /// New empty instance of the field's model type
    Create,
}

/// Class-level validator
#[derive(Debug, Clone)]
pub struct ClassValidator {
    /// Validator name; validators run in name order
    pub name: String,

    /// Check function
    pub check: ObjectCheck,

    /// Severity of a failure
    pub level: Severity,
}

impl ClassValidator {
    /// Error-level validator
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, check: ObjectCheck) -> Self {
        Self {
            name: name.into(),
            check,
            level: Severity::Error,
        }
    }

    /// Set severity
    #[inline]
    #[must_use]
    pub fn with_level(mut self, level: Severity) -> Self {
        self.level = level;
        self
    }
}

/// Callback invoked once a node's owners are resolved
#[derive(Debug, Clone)]
pub struct OwnerHook {
    /// Hook name
    pub name: String,

    /// Required owner type
    pub owner_type: String,

    /// Callback
    pub callback: OwnerCallback,
}

/// Field declaration
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Field name
    pub name: String,

    /// Structural role
    pub kind: FieldKind,

    /// Value or element type
    pub element: ElementType,

    /// Field-level merge strategy override
    pub merge: Option<MergeStrategy>,

    /// Validation marker
    pub validation: Option<FieldValidation>,

    /// Excluded from `AllFields` validation
    pub skip_validation: bool,

    /// Default value
    pub default: Option<DefaultValue>,

    /// Deprecation note; setting the field yields a DEPRECATION issue
    pub deprecated: Option<String>,

    /// Key mapping for map fields of models
    pub key_mapping: Option<Named<KeyMapping>>,
}

impl FieldDescriptor {
    fn new(name: impl Into<String>, kind: FieldKind, element: ElementType) -> Self {
        Self {
            name: name.into(),
            kind,
            element,
            merge: None,
            validation: None,
            skip_validation: false,
            default: None,
            deprecated: None,
            key_mapping: None,
        }
    }

    /// Single-valued field
    #[must_use]
    pub fn single(name: impl Into<String>, element: ElementType) -> Self {
        Self::new(name, FieldKind::Single, element)
    }

    /// Collection field
    #[must_use]
    pub fn collection(name: impl Into<String>, element: ElementType) -> Self {
        Self::new(name, FieldKind::Collection, element)
    }

    /// Map field
    #[must_use]
    pub fn map(name: impl Into<String>, element: ElementType) -> Self {
        Self::new(name, FieldKind::Map, element)
    }

    /// Owner field resolved to the immediate container
    #[must_use]
    pub fn owner(name: impl Into<String>, owner_type: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Owner { transitive: false },
            ElementType::Model(owner_type.into()),
        )
    }

    /// Owner field resolved to the nearest compatible ancestor
    #[must_use]
    pub fn transitive_owner(name: impl Into<String>, owner_type: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Owner { transitive: true },
            ElementType::Model(owner_type.into()),
        )
    }

    /// Key field
    #[must_use]
    pub fn key(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Key, ElementType::Str)
    }

    /// Transient field
    #[must_use]
    pub fn ignored(name: impl Into<String>, element: ElementType) -> Self {
        Self::new(name, FieldKind::Ignored, element)
    }

    /// Override merge strategy
    #[inline]
    #[must_use]
    pub fn with_merge(mut self, strategy: MergeStrategy) -> Self {
        self.merge = Some(strategy);
        self
    }

    /// Require a truthy value
    #[inline]
    #[must_use]
    pub fn required(self) -> Self {
        self.validated(FieldValidation::truthy())
    }

    /// Attach validation marker
    #[inline]
    #[must_use]
    pub fn validated(mut self, validation: FieldValidation) -> Self {
        self.validation = Some(validation);
        self
    }

    /// Exclude from `AllFields` validation
    #[inline]
    #[must_use]
    pub fn not_validated(mut self) -> Self {
        self.skip_validation = true;
        self
    }

    /// Attach default
    #[inline]
    #[must_use]
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Mark deprecated
    #[inline]
    #[must_use]
    pub fn deprecated(mut self, note: impl Into<String>) -> Self {
        self.deprecated = Some(note.into());
        self
    }

    /// Attach key mapping for map insertion
    #[inline]
    #[must_use]
    pub fn with_key_mapping(mut self, name: impl Into<String>, mapping: KeyMapping) -> Self {
        self.key_mapping = Some(Named::new(name, mapping));
        self
    }

    /// Kind-based default strategy
    ///
    /// Single fields holding a model merge; everything else replaces.
    #[must_use]
    pub fn default_strategy(&self) -> Option<MergeStrategy> {
        match self.kind {
            FieldKind::Single if self.element.model().is_some() => {
                Some(MergeStrategy::Single(SingleStrategy::Merge))
            }
            FieldKind::Single => Some(MergeStrategy::Single(SingleStrategy::Replace)),
            FieldKind::Collection => Some(MergeStrategy::Collection(CollectionStrategy::Replace)),
            FieldKind::Map => Some(MergeStrategy::Map(MapStrategy::FullReplace)),
            _ => None,
        }
    }
}

/// Type declaration
#[derive(Debug, Clone, Default)]
pub struct TypeDescriptor {
    /// Type name
    pub name: String,

    /// Parent type
    pub parent: Option<String>,

    /// Fields declared on this level, in declaration order
    pub fields: Vec<FieldDescriptor>,

    /// Validation mode of this level
    pub validation_mode: ValidationMode,

    /// Type-level merge overrides
    pub merge_defaults: MergeDefaults,

    /// Class-level validators run during VALIDATE
    pub validators: Vec<ClassValidator>,

    /// Class-level validators run during EARLY_VALIDATE
    pub early_validators: Vec<ClassValidator>,

    /// Hooks run during APPLY
    pub post_apply: Vec<Named<NodeHook>>,

    /// Hooks run during POST_TREE
    pub post_tree: Vec<Named<NodeHook>>,

    /// Owner callbacks
    pub owner_hooks: Vec<OwnerHook>,
}

impl TypeDescriptor {
    /// New root type
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set parent type
    #[inline]
    #[must_use]
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Declare field
    #[inline]
    #[must_use]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Set validation mode
    #[inline]
    #[must_use]
    pub fn validation_mode(mut self, mode: ValidationMode) -> Self {
        self.validation_mode = mode;
        self
    }

    /// Set type-level merge overrides
    #[inline]
    #[must_use]
    pub fn merge_defaults(mut self, defaults: MergeDefaults) -> Self {
        self.merge_defaults = defaults;
        self
    }

    /// Add class validator
    #[inline]
    #[must_use]
    pub fn validator(mut self, validator: ClassValidator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Add early validator
    #[inline]
    #[must_use]
    pub fn early_validator(mut self, validator: ClassValidator) -> Self {
        self.early_validators.push(validator);
        self
    }

    /// Add APPLY hook
    #[inline]
    #[must_use]
    pub fn post_apply(mut self, name: impl Into<String>, hook: NodeHook) -> Self {
        self.post_apply.push(Named::new(name, hook));
        self
    }

    /// Add POST_TREE hook
    #[inline]
    #[must_use]
    pub fn post_tree(mut self, name: impl Into<String>, hook: NodeHook) -> Self {
        self.post_tree.push(Named::new(name, hook));
        self
    }

    /// Add owner callback
    #[inline]
    #[must_use]
    pub fn owner_hook(
        mut self,
        name: impl Into<String>,
        owner_type: impl Into<String>,
        callback: OwnerCallback,
    ) -> Self {
        self.owner_hooks.push(OwnerHook {
            name: name.into(),
            owner_type: owner_type.into(),
            callback,
        });
        self
    }
}
