//! Arbor Merge - templates and the copy/merge engine
//!
//! - [`Templates`]: thread-scoped, LIFO activation of prototype objects
//! - [`copy_into`]: per-field merge driven by resolved merge strategies
//! - [`deep_copy`]: independent copy of a model subtree
//!
//! # Example
//!
//! ```rust
//! use arbor_merge::{copy_into, Templates};
//! use arbor_model::{ElementType, FieldDescriptor, ObjectRef, SchemaRegistry, TypeDescriptor, Value};
//!
//! let registry = SchemaRegistry::builder()
//!     .with_type(TypeDescriptor::new("Server").field(FieldDescriptor::single("port", ElementType::Int)))
//!     .build()
//!     .unwrap();
//! let server = registry.get("Server").unwrap();
//!
//! let template = ObjectRef::new_template(server.clone());
//! template.set_attribute("port", 8080).unwrap();
//!
//! Templates::with_template("Server", &template, || {
//!     let active = Templates::active("Server").unwrap();
//!     let obj = ObjectRef::new(server.clone(), None).unwrap();
//!     copy_into(&obj, &active).unwrap();
//!     assert_eq!(obj.get_attribute("port"), Value::from(8080));
//! })
//! .unwrap();
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod copy;
pub mod error;
pub mod templates;

pub use copy::{copy_into, copy_value, deep_copy};
pub use error::MergeError;
pub use templates::{seed_from_templates, TemplateGuard, Templates};
