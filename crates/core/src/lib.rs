//! Core types for the save/load pipeline
//!
//! This crate defines the foundational types used throughout the system:
//! - FieldId / Value / Fields: the typed field model
//! - SaveDocument: a schema version plus an ordered field map
//! - SchemaDescriptor / SchemaRegistry: per-version layouts and the chain of steps between them
//! - MigrationStep: pure one-version transforms, plus stock steps
//! - Error: schema and migration step error types
//!
//! Nothing here touches disk or threads.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod error;
pub mod migration;
pub mod schema;
pub mod value;

pub use document::{SaveDocument, SchemaVersion};
pub use error::{MigrationStepError, SchemaError};
pub use migration::{AddField, FnStep, MigrationStep, RenameField, RetireField, TransformField};
pub use schema::{
    Conformance, FieldSpec, FieldType, SchemaDescriptor, SchemaRegistry, SchemaRegistryBuilder,
    TypeMismatch,
};
pub use value::{FieldId, Fields, Value, ValueKind};
