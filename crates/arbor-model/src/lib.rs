//! Arbor Model - schema registry and model objects
//!
//! Everything the engine needs to know about a model tree without running
//! any phase:
//! - [`SchemaRegistry`]: immutable per-type metadata, validated once
//! - [`ObjectRef`]: instance proxy over a single model object
//! - [`Value`]: dynamic field values
//! - [`ValidationResult`]: per-object validation outcome
//! - [`PhaseId`]: built-in and custom phase identities
//!
//! # Example
//!
//! ```rust
//! use arbor_model::{ElementType, FieldDescriptor, ObjectRef, SchemaRegistry, TypeDescriptor};
//!
//! let registry = SchemaRegistry::builder()
//!     .with_type(
//!         TypeDescriptor::new("Server")
//!             .field(FieldDescriptor::key("name"))
//!             .field(FieldDescriptor::single("port", ElementType::Int)),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let server = ObjectRef::new(registry.get("Server").unwrap(), Some("web".into())).unwrap();
//! server.set_attribute("port", 8080).unwrap();
//! assert_eq!(server.key(), Some("web"));
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod error;
pub mod object;
pub mod path;
pub mod phase;
pub mod registry;
pub mod schema;
pub mod validation;
pub mod value;

pub use error::{HookError, ModelError, SchemaError};
pub use object::{Deferred, DeferredFn, ObjectId, ObjectRef, TemplateSnapshot, WeakObjectRef};
pub use path::{Breadcrumb, Segment, SegmentIndex};
pub use phase::{resolve_phase_order, PhaseDecl, PhaseId};
pub use registry::{ResolvedField, ResolvedType, SchemaRegistry, SchemaRegistryBuilder};
pub use schema::{
    Check, ClassValidator, CollectionStrategy, DefaultValue, ElementType, FieldDescriptor,
    FieldKind, FieldPredicate, FieldValidation, KeyMapping, MapStrategy, MergeDefaults,
    MergeStrategy, Named, NodeHook, ObjectCheck, OwnerCallback, OwnerHook, SingleStrategy,
    TypeDescriptor, ValidationMode, ValueProvider,
};
pub use validation::{CheckFailure, IssueCause, Severity, ValidationIssue, ValidationResult};
pub use value::{Value, ValueMap};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
