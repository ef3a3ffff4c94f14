//! Model objects and their instance proxy
//!
//! A model object is a node of a configuration tree. [`ObjectRef`] is the
//! shared handle (and instance proxy) through which every engine component
//! reads and writes it: raw attribute access, key access, breadcrumb path,
//! manual-validation flag, captured template snapshot and the deferred
//! callback queue.
//!
//! Structural references point downwards and are strong; owner and
//! container references point upwards and are weak, so a tree never keeps
//! itself alive.

use crate::error::{HookError, ModelError};
use crate::path::Breadcrumb;
use crate::phase::PhaseId;
use crate::registry::{ResolvedField, ResolvedType};
use crate::schema::FieldKind;
use crate::validation::ValidationResult;
use crate::value::{Value, ValueMap};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_DEFERRED_SEQ: AtomicU64 = AtomicU64::new(1);

/// Process-unique object identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Templates active on the creating thread, as `(type name, template)`
pub type TemplateSnapshot = Vec<(String, ObjectRef)>;

/// Callback deferred until a phase begins
pub type DeferredFn = Box<dyn FnOnce(&ObjectRef) -> Result<(), HookError> + Send + Sync>;

/// Queued "apply later" callback
pub struct Deferred {
    /// Global registration sequence number, used for FIFO draining
    pub seq: u64,

    /// Phase the callback is bound to
    pub phase: PhaseId,

    /// Callback body
    pub callback: DeferredFn,
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("seq", &self.seq)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct NodeState {
    values: IndexMap<String, Value>,
    owners: IndexMap<String, WeakObjectRef>,
    container: Option<WeakObjectRef>,
    breadcrumb: Breadcrumb,
    manual_validation: bool,
    templates: TemplateSnapshot,
    deferred: Vec<Deferred>,
    validation: Option<ValidationResult>,
    owner_hooks_done: bool,
}

struct Node {
    id: ObjectId,
    schema: Arc<ResolvedType>,
    key: Option<String>,
    template: bool,
    state: RwLock<NodeState>,
}

/// Shared handle to a model object
#[derive(Clone)]
pub struct ObjectRef(Arc<Node>);

/// Non-owning handle used for owner and container back-references
#[derive(Clone, Default)]
pub struct WeakObjectRef(Weak<Node>);

impl WeakObjectRef {
    /// Upgrade to a strong handle if the object is still alive
    #[inline]
    #[must_use]
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.0.upgrade().map(ObjectRef)
    }
}

impl fmt::Debug for WeakObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(obj) => write!(f, "Weak({obj:?})"),
            None => f.write_str("Weak(<dropped>)"),
        }
    }
}

impl ObjectRef {
    /// Instantiate a bare object
    ///
    /// # Errors
    /// [`ModelError::KeyContract`] if a keyed type gets no key or an unkeyed
    /// type gets one.
    pub fn new(schema: Arc<ResolvedType>, key: Option<String>) -> Result<Self, ModelError> {
        match (schema.is_keyed(), &key) {
            (true, None) => Err(ModelError::KeyContract {
                type_name: schema.name().to_string(),
                reason: "is keyed and requires a key",
            }),
            (false, Some(_)) => Err(ModelError::KeyContract {
                type_name: schema.name().to_string(),
                reason: "is not keyed and cannot take a key",
            }),
            _ => Ok(Self::with_parts(schema, key, false)),
        }
    }

    /// Instantiate a template; templates of keyed types carry no key
    #[must_use]
    pub fn new_template(schema: Arc<ResolvedType>) -> Self {
        Self::with_parts(schema, None, true)
    }

    fn with_parts(schema: Arc<ResolvedType>, key: Option<String>, template: bool) -> Self {
        let values = schema
            .fields()
            .iter()
            .filter_map(|field| {
                let empty = match field.kind() {
                    FieldKind::Single | FieldKind::Ignored => Value::Null,
                    FieldKind::Collection => Value::List(Vec::new()),
                    FieldKind::Map => Value::Map(ValueMap::new()),
                    FieldKind::Owner { .. } | FieldKind::Key => return None,
                };
                Some((field.name().to_string(), empty))
            })
            .collect();

        Self(Arc::new(Node {
            id: ObjectId::next(),
            schema,
            key,
            template,
            state: RwLock::new(NodeState {
                values,
                ..NodeState::default()
            }),
        }))
    }

    /// Object identity
    #[inline]
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    /// Resolved type of the object
    #[inline]
    #[must_use]
    pub fn schema(&self) -> &Arc<ResolvedType> {
        &self.0.schema
    }

    /// Runtime type name
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.0.schema.name()
    }

    /// Whether the object's type is `name` or one of its subtypes
    #[inline]
    #[must_use]
    pub fn is_a(&self, name: &str) -> bool {
        self.0.schema.is_a(name)
    }

    /// Whether this object is a template
    #[inline]
    #[must_use]
    pub fn is_template(&self) -> bool {
        self.0.template
    }

    /// Identity comparison
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Weak handle to this object
    #[inline]
    #[must_use]
    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef(Arc::downgrade(&self.0))
    }

    /// Immutable key of a keyed object; `None` only for templates
    ///
    /// # Panics
    /// If the type is not keyed. Asking an unkeyed type for its key is a
    /// programming error.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        assert!(
            self.0.schema.is_keyed(),
            "type '{}' is not keyed",
            self.type_name()
        );
        self.0.key.as_deref()
    }

    /// Key if present, without the keyed-type contract
    #[inline]
    #[must_use]
    pub fn key_if_any(&self) -> Option<&str> {
        self.0.key.as_deref()
    }

    fn field_or_err(&self, name: &str) -> Result<&ResolvedField, ModelError> {
        self.0
            .schema
            .field(name)
            .ok_or_else(|| ModelError::UnknownField {
                type_name: self.type_name().to_string(),
                field: name.to_string(),
            })
    }

    /// Raw field read; unset and unknown fields read as null
    ///
    /// Owner fields yield the owner object, the key field yields the key.
    #[must_use]
    pub fn get_attribute(&self, name: &str) -> Value {
        let Some(field) = self.0.schema.field(name) else {
            return Value::Null;
        };
        match field.kind() {
            FieldKind::Key => self.0.key.clone().map_or(Value::Null, Value::Str),
            FieldKind::Owner { .. } => self.owner(name).map_or(Value::Null, Value::Object),
            _ => self
                .0
                .state
                .read()
                .values
                .get(name)
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Raw field write
    ///
    /// Values are checked against the declared element type; nested objects
    /// become children of this object.
    ///
    /// # Errors
    /// - [`ModelError::UnknownField`] for undeclared fields
    /// - [`ModelError::ImmutableKey`] for the key field
    /// - [`ModelError::TypeMismatch`] for incompatible values
    /// - [`ModelError::AlreadyContained`] / [`ModelError::CycleDetected`] if
    ///   storing would break the tree shape
    pub fn set_attribute(&self, name: &str, value: impl Into<Value>) -> Result<(), ModelError> {
        let value = value.into();
        let field = self.field_or_err(name)?;
        match field.kind() {
            FieldKind::Key => Err(ModelError::ImmutableKey {
                type_name: self.type_name().to_string(),
                field: name.to_string(),
            }),
            FieldKind::Owner { .. } => self.set_owner(field, value),
            FieldKind::Ignored => {
                self.check_conforms(field, &value)?;
                self.0.state.write().values.insert(name.to_string(), value);
                Ok(())
            }
            FieldKind::Single | FieldKind::Collection | FieldKind::Map => {
                let value = normalize(field.kind(), value);
                self.check_conforms(field, &value)?;
                self.store(name, value)
            }
        }
    }

    /// Append an element to a collection field
    ///
    /// # Errors
    /// As [`set_attribute`](Self::set_attribute), plus
    /// [`ModelError::WrongFieldKind`] for non-collection fields.
    pub fn add_element(&self, name: &str, value: impl Into<Value>) -> Result<(), ModelError> {
        let field = self.field_or_err(name)?;
        self.require_kind(field, FieldKind::Collection, "add an element")?;
        let mut items = match self.get_attribute(name) {
            Value::List(items) => items,
            _ => Vec::new(),
        };
        items.push(value.into());
        self.set_attribute(name, Value::List(items))
    }

    /// Insert or overwrite a map entry
    ///
    /// # Errors
    /// As [`set_attribute`](Self::set_attribute), plus
    /// [`ModelError::WrongFieldKind`] for non-map fields.
    pub fn put_entry(
        &self,
        name: &str,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), ModelError> {
        let field = self.field_or_err(name)?;
        self.require_kind(field, FieldKind::Map, "put an entry")?;
        let mut entries = match self.get_attribute(name) {
            Value::Map(entries) => entries,
            _ => ValueMap::new(),
        };
        entries.insert(key.into(), value.into());
        self.set_attribute(name, Value::Map(entries))
    }

    /// Insert a model into a map field under its derived key
    ///
    /// The field's key mapping is used when declared, otherwise the
    /// element's own key.
    ///
    /// # Errors
    /// [`ModelError::NoMapKey`] if no key can be derived, plus the errors
    /// of [`put_entry`](Self::put_entry).
    pub fn put_keyed(&self, name: &str, obj: ObjectRef) -> Result<String, ModelError> {
        let field = self.field_or_err(name)?;
        let key = match &field.descriptor.key_mapping {
            Some(mapping) => (mapping.func)(&obj),
            None => obj.key_if_any().map(str::to_string),
        }
        .ok_or_else(|| ModelError::NoMapKey {
            type_name: self.type_name().to_string(),
            field: name.to_string(),
        })?;
        self.put_entry(name, key.clone(), obj)?;
        Ok(key)
    }

    /// Resolved owner stored in an owner field
    #[must_use]
    pub fn owner(&self, name: &str) -> Option<ObjectRef> {
        self.0
            .state
            .read()
            .owners
            .get(name)
            .and_then(WeakObjectRef::upgrade)
    }

    /// Structural container, if attached
    #[must_use]
    pub fn container(&self) -> Option<ObjectRef> {
        self.0
            .state
            .read()
            .container
            .as_ref()
            .and_then(WeakObjectRef::upgrade)
    }

    /// Last computed breadcrumb path
    #[must_use]
    pub fn breadcrumb(&self) -> Breadcrumb {
        self.0.state.read().breadcrumb.clone()
    }

    /// Record the breadcrumb path computed by a traversal
    pub fn set_breadcrumb(&self, path: Breadcrumb) {
        self.0.state.write().breadcrumb = path;
    }

    /// Whether the object opted out of automatic validation
    #[must_use]
    pub fn manual_validation(&self) -> bool {
        self.0.state.read().manual_validation
    }

    /// Opt in or out of automatic validation of this node's own checks
    pub fn set_manual_validation(&self, manual: bool) {
        self.0.state.write().manual_validation = manual;
    }

    /// Templates captured when the object was created
    #[must_use]
    pub fn captured_templates(&self) -> TemplateSnapshot {
        self.0.state.read().templates.clone()
    }

    /// Record the template snapshot; only the first capture sticks
    pub fn capture_templates(&self, templates: TemplateSnapshot) {
        let mut state = self.0.state.write();
        if state.templates.is_empty() {
            state.templates = templates;
        }
    }

    /// Defer a callback until `phase` begins
    pub fn apply_later<F>(&self, phase: PhaseId, callback: F)
    where
        F: FnOnce(&ObjectRef) -> Result<(), HookError> + Send + Sync + 'static,
    {
        let seq = NEXT_DEFERRED_SEQ.fetch_add(1, Ordering::Relaxed);
        self.0.state.write().deferred.push(Deferred {
            seq,
            phase,
            callback: Box::new(callback),
        });
    }

    /// Remove and return all callbacks bound to `phase`
    #[must_use]
    pub fn take_deferred(&self, phase: &PhaseId) -> Vec<Deferred> {
        let mut state = self.0.state.write();
        let (taken, kept) = std::mem::take(&mut state.deferred)
            .into_iter()
            .partition(|d| &d.phase == phase);
        state.deferred = kept;
        taken
    }

    /// Remove and return every queued callback, whatever its phase
    #[must_use]
    pub fn take_all_deferred(&self) -> Vec<Deferred> {
        std::mem::take(&mut self.0.state.write().deferred)
    }

    /// Validation result recorded by the last validation run
    #[must_use]
    pub fn validation_result(&self) -> Option<ValidationResult> {
        self.0.state.read().validation.clone()
    }

    /// Merge issues into the recorded result
    pub fn record_validation(&self, result: &ValidationResult) {
        let mut state = self.0.state.write();
        match &mut state.validation {
            Some(existing) => existing.merge(result),
            None => state.validation = Some(result.clone()),
        }
    }

    /// Forget the recorded result
    pub fn clear_validation(&self) {
        self.0.state.write().validation = None;
    }

    /// Mark owner hooks as run; `true` only on the first call
    pub fn mark_owner_hooks_done(&self) -> bool {
        let mut state = self.0.state.write();
        !std::mem::replace(&mut state.owner_hooks_done, true)
    }

    fn require_kind(
        &self,
        field: &ResolvedField,
        expected: FieldKind,
        operation: &'static str,
    ) -> Result<(), ModelError> {
        if field.kind() == expected {
            Ok(())
        } else {
            Err(ModelError::WrongFieldKind {
                type_name: self.type_name().to_string(),
                field: field.name().to_string(),
                kind: field.kind().label(),
                operation,
            })
        }
    }

    fn check_conforms(&self, field: &ResolvedField, value: &Value) -> Result<(), ModelError> {
        let element = &field.descriptor.element;
        let ok = match (field.kind(), value) {
            (FieldKind::Collection, Value::List(items)) => items.iter().all(|v| element.accepts(v)),
            (FieldKind::Collection, _) => false,
            (FieldKind::Map, Value::Map(entries)) => entries.values().all(|v| element.accepts(v)),
            (FieldKind::Map, _) => false,
            _ => element.accepts(value),
        };
        if ok {
            Ok(())
        } else {
            Err(ModelError::TypeMismatch {
                type_name: self.type_name().to_string(),
                field: field.name().to_string(),
                expected: format!("{} of {}", field.kind().label(), element),
                actual: value.describe(),
            })
        }
    }

    fn set_owner(&self, field: &ResolvedField, value: Value) -> Result<(), ModelError> {
        match value {
            Value::Null => {
                self.0.state.write().owners.shift_remove(field.name());
                Ok(())
            }
            Value::Object(owner)
                if field.descriptor.element.model().is_some_and(|m| owner.is_a(m)) =>
            {
                self.0
                    .state
                    .write()
                    .owners
                    .insert(field.name().to_string(), owner.downgrade());
                Ok(())
            }
            other => Err(ModelError::TypeMismatch {
                type_name: self.type_name().to_string(),
                field: field.name().to_string(),
                expected: format!("owner {}", field.descriptor.element),
                actual: other.describe(),
            }),
        }
    }

    /// Store a structural value, re-parenting the objects it holds
    fn store(&self, name: &str, value: Value) -> Result<(), ModelError> {
        let incoming = value.objects();
        let previous = self
            .0
            .state
            .read()
            .values
            .get(name)
            .map(Value::objects)
            .unwrap_or_default();

        for (i, child) in incoming.iter().enumerate() {
            if incoming[..i].iter().any(|c| c.ptr_eq(child)) {
                return Err(self.already_contained(child, name));
            }
            self.check_attachable(child, name, &previous)?;
        }

        self.0.state.write().values.insert(name.to_string(), value);

        for old in previous {
            if !incoming.iter().any(|c| c.ptr_eq(&old)) {
                old.0.state.write().container = None;
            }
        }
        for child in incoming {
            child.0.state.write().container = Some(self.downgrade());
        }
        Ok(())
    }

    fn check_attachable(
        &self,
        child: &ObjectRef,
        field: &str,
        previous: &[ObjectRef],
    ) -> Result<(), ModelError> {
        let cycle = || ModelError::CycleDetected {
            child: child.type_name().to_string(),
            field: field.to_string(),
        };
        if child.ptr_eq(self) {
            return Err(cycle());
        }
        let mut ancestor = self.container();
        while let Some(current) = ancestor {
            if current.ptr_eq(child) {
                return Err(cycle());
            }
            ancestor = current.container();
        }

        match child.container() {
            None => Ok(()),
            Some(holder) if holder.ptr_eq(self) && previous.iter().any(|p| p.ptr_eq(child)) => Ok(()),
            Some(_) => Err(self.already_contained(child, field)),
        }
    }

    fn already_contained(&self, child: &ObjectRef, field: &str) -> ModelError {
        ModelError::AlreadyContained {
            child: child.type_name().to_string(),
            field: field.to_string(),
        }
    }
}

/// Null collections and maps read as empty ones
fn normalize(kind: FieldKind, value: Value) -> Value {
    match (kind, value) {
        (FieldKind::Collection, Value::Null) => Value::List(Vec::new()),
        (FieldKind::Map, Value::Null) => Value::Map(ValueMap::new()),
        (_, value) => value,
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.type_name(), self.id())?;
        if let Some(key) = self.key_if_any() {
            write!(f, "[{key}]")?;
        }
        Ok(())
    }
}
