//! Error types for schema declaration and migration steps
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::document::SchemaVersion;
use crate::value::{FieldId, ValueKind};
use thiserror::Error;

/// Errors raised by the schema registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// No descriptor is registered for this version
    #[error("Unknown schema version {version} (current is {current})")]
    UnknownSchemaVersion {
        /// Requested version
        version: SchemaVersion,
        /// Highest registered version
        current: SchemaVersion,
    },

    /// An intermediate migration step is missing
    #[error("No migration path from version {from} to {to}: missing step for version {missing}")]
    NoMigrationPath {
        /// Version the chain starts from
        from: SchemaVersion,
        /// Version the chain must reach
        to: SchemaVersion,
        /// Source version of the missing step
        missing: SchemaVersion,
    },

    /// A retired field identifier was reused by a later descriptor
    #[error("Field {field} was retired in version {retired_in} and cannot be reused in version {version}")]
    FieldIdReused {
        /// Offending identifier
        field: FieldId,
        /// Version that retired it
        retired_in: SchemaVersion,
        /// Version that reused it
        version: SchemaVersion,
    },

    /// Two descriptors registered for the same version
    #[error("Duplicate descriptor for schema version {0}")]
    DuplicateVersion(SchemaVersion),

    /// Two steps registered for the same source version
    #[error("Duplicate migration step from version {0}")]
    DuplicateStep(SchemaVersion),

    /// A step does not advance by exactly one version
    #[error("Migration step from version {from} targets {to}; steps must advance exactly one version")]
    InvalidStepTarget {
        /// Source version
        from: SchemaVersion,
        /// Declared target
        to: SchemaVersion,
    },

    /// A step produces a version with no registered descriptor
    #[error("Migration step from version {from} targets unregistered version {to}")]
    UnregisteredStepTarget {
        /// Source version
        from: SchemaVersion,
        /// Declared target
        to: SchemaVersion,
    },

    /// A field's default value is not of the declared type
    #[error("Default for field {field} in version {version} is {actual}, expected {expected}")]
    DefaultTypeMismatch {
        /// Field identifier
        field: FieldId,
        /// Descriptor version
        version: SchemaVersion,
        /// Declared type name
        expected: String,
        /// Kind of the supplied default
        actual: ValueKind,
    },

    /// Registry built without any descriptor
    #[error("Schema registry has no registered versions")]
    Empty,
}

/// Diagnostic returned by a failing migration step
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct MigrationStepError {
    /// Human-readable diagnostic
    pub message: String,
    /// Field the step was working on, if any
    pub field: Option<FieldId>,
}

impl MigrationStepError {
    /// Create a diagnostic
    pub fn new(message: impl Into<String>) -> Self {
        MigrationStepError {
            message: message.into(),
            field: None,
        }
    }

    /// Create a diagnostic about a specific field
    pub fn for_field(field: FieldId, message: impl Into<String>) -> Self {
        MigrationStepError {
            message: message.into(),
            field: Some(field),
        }
    }
}
