//! Arbor Engine - phase pipeline over model trees
//!
//! Takes a partially configured tree of [`ObjectRef`]s and runs the phase
//! sequence declared by its [`SchemaRegistry`]:
//! owner resolution, default filling, hooks, validation and verification.
//!
//! - [`Engine`]: facade for creating objects, templates and finishing trees
//! - [`PhaseDriver`]: ordered phases, deferred callbacks, worklist rounds
//! - [`visitor`]: structural depth-first traversal with breadcrumbs
//! - [`ValidationReport`]: whole-tree aggregate of per-object results
//!
//! # Example
//!
//! ```rust
//! use arbor_engine::Engine;
//! use arbor_model::{ElementType, FieldDescriptor, SchemaRegistry, TypeDescriptor};
//! use std::sync::Arc;
//!
//! let registry = SchemaRegistry::builder()
//!     .with_type(
//!         TypeDescriptor::new("Server")
//!             .field(FieldDescriptor::single("host", ElementType::Str).required()),
//!     )
//!     .build()
//!     .unwrap();
//! let engine = Engine::new(Arc::new(registry));
//!
//! let server = engine.create("Server", None).unwrap();
//! let err = engine.finish(&server).unwrap_err();
//! assert!(err.is_recoverable());
//!
//! server.set_attribute("host", "example.org").unwrap();
//! assert!(engine.finish(&server).is_ok());
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod actions;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod report;
pub mod validator;
pub mod visitor;

pub use config::{ConfigError, EngineConfig, ValidationPolicy};
pub use driver::{NodeAction, NodePhase, PhaseAction, PhaseContext, PhaseDriver, RunMode};
pub use engine::Engine;
pub use error::EngineError;
pub use report::{ValidationFailure, ValidationReport};
pub use validator::{collect_report, validate_node, validate_tree, Validate};
pub use visitor::{Child, Visit};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
