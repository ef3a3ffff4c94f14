//! Schema registry
//!
//! [`SchemaRegistryBuilder`] collects type and phase declarations and
//! validates them once; the resulting [`SchemaRegistry`] is immutable and
//! holds a [`ResolvedType`] per type with its full hierarchy, flattened
//! fields and memoized merge strategy per field.

use crate::error::SchemaError;
use crate::phase::{resolve_phase_order, PhaseDecl, PhaseId};
use crate::schema::{
    DefaultValue, ElementType, FieldDescriptor, FieldKind, MergeStrategy, TypeDescriptor,
};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Field as seen from a concrete type
#[derive(Debug, Clone)]
pub struct ResolvedField {
    /// Declaration
    pub descriptor: FieldDescriptor,

    /// Type on which the field is declared
    pub declared_in: String,

    /// Hierarchy level of the declaring type (0 = root ancestor)
    pub level: usize,

    /// Resolved merge strategy; `None` for owner, key and ignored fields
    pub strategy: Option<MergeStrategy>,
}

impl ResolvedField {
    /// Field name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Field kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> FieldKind {
        self.descriptor.kind
    }
}

/// Fully resolved type
#[derive(Debug)]
pub struct ResolvedType {
    name: String,
    hierarchy: Vec<Arc<TypeDescriptor>>,
    fields: Vec<ResolvedField>,
    index: HashMap<String, usize>,
    key_field: Option<String>,
}

impl ResolvedType {
    /// Type name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Descriptors from root ancestor to this type
    #[inline]
    #[must_use]
    pub fn hierarchy(&self) -> &[Arc<TypeDescriptor>] {
        &self.hierarchy
    }

    /// This type's own descriptor
    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &TypeDescriptor {
        // hierarchy always ends with the type itself
        &self.hierarchy[self.hierarchy.len() - 1]
    }

    /// All fields, root ancestor level first, declaration order within a level
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &[ResolvedField] {
        &self.fields
    }

    /// Fields declared on hierarchy level `level`
    pub fn fields_at(&self, level: usize) -> impl Iterator<Item = &ResolvedField> {
        self.fields.iter().filter(move |f| f.level == level)
    }

    /// Look up field by name
    #[inline]
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&ResolvedField> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    /// Name of the key field, if the type is keyed
    #[inline]
    #[must_use]
    pub fn key_field(&self) -> Option<&str> {
        self.key_field.as_deref()
    }

    /// Whether instances carry a key
    #[inline]
    #[must_use]
    pub fn is_keyed(&self) -> bool {
        self.key_field.is_some()
    }

    /// Whether this type is `name` or one of its subtypes
    #[must_use]
    pub fn is_a(&self, name: &str) -> bool {
        self.hierarchy.iter().any(|t| t.name == name)
    }
}

/// Immutable registry of resolved types and the phase order
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    types: HashMap<String, Arc<ResolvedType>>,
    phases: Vec<PhaseId>,
}

impl SchemaRegistry {
    /// Start building a registry
    #[inline]
    #[must_use]
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::new()
    }

    /// Resolved type by name
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ResolvedType>> {
        self.types.get(name).cloned()
    }

    /// Resolved type by name, failing for unknown names
    ///
    /// # Errors
    /// [`SchemaError::UnknownType`] if the type was never registered
    pub fn resolve(&self, name: &str) -> Result<Arc<ResolvedType>, SchemaError> {
        self.get(name).ok_or_else(|| SchemaError::UnknownType {
            name: name.to_string(),
            referenced_by: "lookup".to_string(),
        })
    }

    /// Phases in execution order
    #[inline]
    #[must_use]
    pub fn phases(&self) -> &[PhaseId] {
        &self.phases
    }

    /// Number of registered types
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Collects declarations for a [`SchemaRegistry`]
#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    types: Vec<TypeDescriptor>,
    phases: Vec<PhaseDecl>,
}

impl SchemaRegistryBuilder {
    /// Create empty builder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type
    #[inline]
    #[must_use]
    pub fn with_type(mut self, descriptor: TypeDescriptor) -> Self {
        self.types.push(descriptor);
        self
    }

    /// Register a custom phase
    #[inline]
    #[must_use]
    pub fn with_phase(mut self, phase: PhaseDecl) -> Self {
        self.phases.push(phase);
        self
    }

    /// Validate declarations and build the registry
    ///
    /// # Errors
    /// Any [`SchemaError`]; see its variants for the checks performed.
    pub fn build(self) -> Result<SchemaRegistry, SchemaError> {
        // declaration order, so the first bad declaration is the one reported
        let mut descriptors: IndexMap<String, Arc<TypeDescriptor>> = IndexMap::new();
        for descriptor in self.types {
            let name = descriptor.name.clone();
            if descriptors.insert(name.clone(), Arc::new(descriptor)).is_some() {
                return Err(SchemaError::DuplicateType(name));
            }
        }

        let mut types = IndexMap::new();
        for name in descriptors.keys() {
            let hierarchy = hierarchy_of(name, &descriptors)?;
            types.insert(name.clone(), hierarchy);
        }

        let mut resolved = IndexMap::new();
        for (name, hierarchy) in types {
            let resolved_type = resolve_type(name.clone(), hierarchy, &descriptors)?;
            resolved.insert(name, resolved_type);
        }

        // cross-type checks need every type resolved first
        for resolved_type in resolved.values() {
            check_fields(resolved_type, &resolved)?;
        }

        let phases = resolve_phase_order(&self.phases)?;

        Ok(SchemaRegistry {
            types: resolved
                .into_iter()
                .map(|(name, t)| (name, Arc::new(t)))
                .collect(),
            phases,
        })
    }
}

/// Root-first chain of descriptors ending with `name`
fn hierarchy_of(
    name: &str,
    descriptors: &IndexMap<String, Arc<TypeDescriptor>>,
) -> Result<Vec<Arc<TypeDescriptor>>, SchemaError> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(name.to_string());

    while let Some(type_name) = current {
        if !seen.insert(type_name.clone()) {
            return Err(SchemaError::InheritanceCycle(type_name));
        }
        let descriptor = descriptors
            .get(&type_name)
            .ok_or_else(|| SchemaError::UnknownType {
                name: type_name.clone(),
                referenced_by: format!("parent of '{}'", chain_tail(&chain, name)),
            })?;
        current = descriptor.parent.clone();
        chain.push(Arc::clone(descriptor));
    }

    chain.reverse();
    Ok(chain)
}

fn chain_tail(chain: &[Arc<TypeDescriptor>], fallback: &str) -> String {
    chain
        .last()
        .map_or_else(|| fallback.to_string(), |t| t.name.clone())
}

fn resolve_type(
    name: String,
    hierarchy: Vec<Arc<TypeDescriptor>>,
    descriptors: &IndexMap<String, Arc<TypeDescriptor>>,
) -> Result<ResolvedType, SchemaError> {
    let mut fields = Vec::new();
    let mut index = HashMap::new();
    let mut key_fields = Vec::new();

    for (level, descriptor) in hierarchy.iter().enumerate() {
        for field in &descriptor.fields {
            if index.insert(field.name.clone(), fields.len()).is_some() {
                return Err(SchemaError::DuplicateField {
                    type_name: name.clone(),
                    field: field.name.clone(),
                });
            }
            if field.kind == FieldKind::Key {
                key_fields.push(field.name.clone());
            }
            let strategy = resolve_strategy(&name, field, &hierarchy)?;
            fields.push(ResolvedField {
                descriptor: field.clone(),
                declared_in: descriptor.name.clone(),
                level,
                strategy,
            });
        }
    }

    if key_fields.len() > 1 {
        return Err(SchemaError::AmbiguousKey {
            type_name: name,
            fields: key_fields,
        });
    }

    for field in &fields {
        if let Some(model) = field.descriptor.element.model() {
            if !descriptors.contains_key(model) {
                return Err(SchemaError::UnknownType {
                    name: model.to_string(),
                    referenced_by: format!("field '{}' of '{}'", field.name(), name),
                });
            }
        }
    }

    Ok(ResolvedType {
        name,
        hierarchy,
        fields,
        index,
        key_field: key_fields.pop(),
    })
}

/// Field override, then nearest type-level override walking up from the
/// concrete type, then the kind default
fn resolve_strategy(
    type_name: &str,
    field: &FieldDescriptor,
    hierarchy: &[Arc<TypeDescriptor>],
) -> Result<Option<MergeStrategy>, SchemaError> {
    if !field.kind.is_structural() {
        return Ok(None);
    }
    if let Some(strategy) = field.merge {
        if !strategy.fits(field.kind) {
            return Err(SchemaError::StrategyKindMismatch {
                type_name: type_name.to_string(),
                field: field.name.clone(),
                kind: field.kind.label(),
                strategy: strategy.family(),
            });
        }
        return Ok(Some(strategy));
    }
    let inherited = hierarchy
        .iter()
        .rev()
        .find_map(|t| t.merge_defaults.for_kind(field.kind));
    Ok(inherited.or_else(|| field.default_strategy()))
}

fn check_fields(
    resolved_type: &ResolvedType,
    all: &IndexMap<String, ResolvedType>,
) -> Result<(), SchemaError> {
    let type_name = resolved_type.name();
    for field in resolved_type.fields() {
        let descriptor = &field.descriptor;
        match descriptor.kind {
            FieldKind::Key if descriptor.element != ElementType::Str => {
                return Err(SchemaError::InvalidKeyField {
                    type_name: type_name.to_string(),
                    field: descriptor.name.clone(),
                });
            }
            FieldKind::Owner { .. } if descriptor.element.model().is_none() => {
                return Err(SchemaError::InvalidOwnerField {
                    type_name: type_name.to_string(),
                    field: descriptor.name.clone(),
                });
            }
            FieldKind::Map => {
                if let Some(model) = descriptor.element.model() {
                    let keyed = all.get(model).is_some_and(ResolvedType::is_keyed);
                    if !keyed && descriptor.key_mapping.is_none() {
                        return Err(SchemaError::MissingKeyMapping {
                            type_name: type_name.to_string(),
                            field: descriptor.name.clone(),
                            element: model.to_string(),
                        });
                    }
                }
            }
            _ => {}
        }

        if let Some(default) = &descriptor.default {
            check_default(resolved_type, descriptor, default, all)?;
        }
    }
    Ok(())
}

fn check_default(
    resolved_type: &ResolvedType,
    descriptor: &FieldDescriptor,
    default: &DefaultValue,
    all: &IndexMap<String, ResolvedType>,
) -> Result<(), SchemaError> {
    let invalid = |reason: String| SchemaError::InvalidDefault {
        type_name: resolved_type.name().to_string(),
        field: descriptor.name.clone(),
        reason,
    };

    if !descriptor.kind.is_structural() {
        return Err(invalid(format!(
            "{} fields cannot declare defaults",
            descriptor.kind.label()
        )));
    }

    match default {
        DefaultValue::FromField(source) => {
            if resolved_type.field(source).is_none() {
                return Err(invalid(format!("source field '{source}' does not exist")));
            }
        }
        DefaultValue::Create => {
            let Some(model) = descriptor.element.model() else {
                return Err(invalid("only model fields can be created".to_string()));
            };
            if descriptor.kind != FieldKind::Single {
                return Err(invalid("only single fields can be created".to_string()));
            }
            if all.get(model).is_some_and(ResolvedType::is_keyed) {
                return Err(invalid(format!("'{model}' is keyed and needs an explicit key")));
            }
        }
        DefaultValue::Literal(_) | DefaultValue::Provider(_) => {}
    }
    Ok(())
}
