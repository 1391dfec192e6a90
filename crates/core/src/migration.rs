//! Migration steps
//!
//! A migration step is a pure transform taking a document at version N to a
//! document at version N+1. Steps never mutate their input: they read a
//! borrowed field map and return a new one, so a chain can be replayed and
//! each step tested in isolation.
//!
//! # Stock steps
//!
//! - [`AddField`]: insert a default when the field is absent
//! - [`RenameField`]: move a value to a new identifier
//! - [`RetireField`]: drop a field whose identifier is retired
//! - [`TransformField`]: rewrite one field's value
//! - [`FnStep`]: arbitrary closure over the whole field map

use crate::document::{SaveDocument, SchemaVersion};
use crate::error::MigrationStepError;
use crate::value::{FieldId, Fields, Value};

/// One version increment of the migration chain
///
/// Implementations must be deterministic and must not fail on a well-formed
/// document at [`source_version`](MigrationStep::source_version).
pub trait MigrationStep: Send + Sync {
    /// Version this step reads
    fn source_version(&self) -> SchemaVersion;

    /// Version this step produces
    ///
    /// Saturates at `SchemaVersion::MAX`; the registry rejects such a step.
    fn target_version(&self) -> SchemaVersion {
        self.source_version().saturating_add(1)
    }

    /// Short description for diagnostics
    fn description(&self) -> &str {
        "migration step"
    }

    /// Produce the next version's field map
    fn transform(&self, fields: &Fields) -> Result<Fields, MigrationStepError>;

    /// Apply the step to a document
    ///
    /// A document already at or above the target version is returned
    /// unchanged. A document at any other version than the source version is
    /// rejected.
    fn apply(&self, document: &SaveDocument) -> Result<SaveDocument, MigrationStepError> {
        let version = document.schema_version();
        if version >= self.target_version() {
            return Ok(document.clone());
        }
        if version != self.source_version() {
            return Err(MigrationStepError::new(format!(
                "step expects version {}, document is at version {}",
                self.source_version(),
                version
            )));
        }
        let fields = self.transform(document.fields())?;
        Ok(SaveDocument::from_fields(self.target_version(), fields))
    }
}

/// Insert `default` under `field` when it is absent
#[derive(Debug, Clone)]
pub struct AddField {
    from: SchemaVersion,
    field: FieldId,
    default: Value,
}

impl AddField {
    /// Create the step
    pub fn new(from: SchemaVersion, field: impl Into<FieldId>, default: impl Into<Value>) -> Self {
        AddField {
            from,
            field: field.into(),
            default: default.into(),
        }
    }
}

impl MigrationStep for AddField {
    fn source_version(&self) -> SchemaVersion {
        self.from
    }

    fn description(&self) -> &str {
        "add field"
    }

    fn transform(&self, fields: &Fields) -> Result<Fields, MigrationStepError> {
        let mut next = fields.clone();
        next.entry(self.field).or_insert_with(|| self.default.clone());
        Ok(next)
    }
}

/// Move the value under `old` to `new`
///
/// The old identifier should be retired in the target descriptor. A document
/// without the old field passes through unchanged.
#[derive(Debug, Clone)]
pub struct RenameField {
    from: SchemaVersion,
    old: FieldId,
    new: FieldId,
}

impl RenameField {
    /// Create the step
    pub fn new(from: SchemaVersion, old: impl Into<FieldId>, new: impl Into<FieldId>) -> Self {
        RenameField {
            from,
            old: old.into(),
            new: new.into(),
        }
    }
}

impl MigrationStep for RenameField {
    fn source_version(&self) -> SchemaVersion {
        self.from
    }

    fn description(&self) -> &str {
        "rename field"
    }

    fn transform(&self, fields: &Fields) -> Result<Fields, MigrationStepError> {
        let mut next = fields.clone();
        if let Some(value) = next.remove(&self.old) {
            if next.contains_key(&self.new) {
                return Err(MigrationStepError::for_field(
                    self.new,
                    format!("cannot rename {} to {}: target already present", self.old, self.new),
                ));
            }
            next.insert(self.new, value);
        }
        Ok(next)
    }
}

/// Drop a field whose identifier is retired in the target version
#[derive(Debug, Clone)]
pub struct RetireField {
    from: SchemaVersion,
    field: FieldId,
}

impl RetireField {
    /// Create the step
    pub fn new(from: SchemaVersion, field: impl Into<FieldId>) -> Self {
        RetireField {
            from,
            field: field.into(),
        }
    }
}

impl MigrationStep for RetireField {
    fn source_version(&self) -> SchemaVersion {
        self.from
    }

    fn description(&self) -> &str {
        "retire field"
    }

    fn transform(&self, fields: &Fields) -> Result<Fields, MigrationStepError> {
        let mut next = fields.clone();
        next.remove(&self.field);
        Ok(next)
    }
}

type ValueTransform = dyn Fn(&Value) -> Result<Value, String> + Send + Sync;

/// Rewrite the value of one field
///
/// Absent fields are left absent; the target descriptor's default fills them.
pub struct TransformField {
    from: SchemaVersion,
    field: FieldId,
    description: String,
    f: Box<ValueTransform>,
}

impl TransformField {
    /// Create the step
    pub fn new<F>(
        from: SchemaVersion,
        field: impl Into<FieldId>,
        description: impl Into<String>,
        f: F,
    ) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        TransformField {
            from,
            field: field.into(),
            description: description.into(),
            f: Box::new(f),
        }
    }
}

impl MigrationStep for TransformField {
    fn source_version(&self) -> SchemaVersion {
        self.from
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn transform(&self, fields: &Fields) -> Result<Fields, MigrationStepError> {
        let mut next = fields.clone();
        if let Some(value) = fields.get(&self.field) {
            let rewritten =
                (self.f)(value).map_err(|msg| MigrationStepError::for_field(self.field, msg))?;
            next.insert(self.field, rewritten);
        }
        Ok(next)
    }
}

type FieldsTransform = dyn Fn(&Fields) -> Result<Fields, MigrationStepError> + Send + Sync;

/// Arbitrary pure transform over the whole field map
pub struct FnStep {
    from: SchemaVersion,
    description: String,
    f: Box<FieldsTransform>,
}

impl FnStep {
    /// Create the step
    pub fn new<F>(from: SchemaVersion, description: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Fields) -> Result<Fields, MigrationStepError> + Send + Sync + 'static,
    {
        FnStep {
            from,
            description: description.into(),
            f: Box::new(f),
        }
    }
}

impl MigrationStep for FnStep {
    fn source_version(&self) -> SchemaVersion {
        self.from
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn transform(&self, fields: &Fields) -> Result<Fields, MigrationStepError> {
        (self.f)(fields)
    }
}
