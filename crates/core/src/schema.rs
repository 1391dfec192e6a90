//! Schema descriptors and the schema registry
//!
//! A [`SchemaDescriptor`] declares, for one schema version, the type and
//! default value of every field. The [`SchemaRegistry`] holds one descriptor
//! per registered version plus one [`MigrationStep`] per version increment,
//! and answers three questions: what is the current version, what does
//! version V look like, and which steps lead from V to current.
//!
//! # Field identifier lifecycle
//!
//! Identifiers are never reused. Removing a field from the schema retires its
//! identifier: the descriptor that drops it calls [`SchemaDescriptor::retire`]
//! and no later descriptor may declare that identifier again.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::document::{SaveDocument, SchemaVersion};
use crate::error::SchemaError;
use crate::migration::MigrationStep;
use crate::value::{FieldId, Value, ValueKind};

/// Semantic type of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// Boolean
    Bool,
    /// Signed integer
    Int,
    /// Unsigned integer
    UInt,
    /// Float
    Float,
    /// UTF-8 string
    String,
    /// Raw bytes
    Bytes,
    /// Nested document (contents not constrained)
    Document,
    /// Homogeneous sequence of the element type
    Sequence(Box<FieldType>),
    /// Tagged variant: case discriminant to case payload type
    Variant(BTreeMap<u8, FieldType>),
}

impl FieldType {
    /// Sequence of `element`
    pub fn sequence_of(element: FieldType) -> Self {
        FieldType::Sequence(Box::new(element))
    }

    /// True if `value` conforms to this type
    ///
    /// Opaque values never conform: a value this build cannot decode cannot
    /// be checked against a declared type.
    pub fn admits(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::Bool, Value::Bool(_))
            | (FieldType::Int, Value::Int(_))
            | (FieldType::UInt, Value::UInt(_))
            | (FieldType::Float, Value::Float(_))
            | (FieldType::String, Value::String(_))
            | (FieldType::Bytes, Value::Bytes(_))
            | (FieldType::Document, Value::Document(_)) => true,
            (FieldType::Sequence(element), Value::Sequence(items)) => {
                items.iter().all(|item| element.admits(item))
            }
            (FieldType::Variant(cases), Value::Variant { case, value }) => cases
                .get(case)
                .map(|ty| ty.admits(value))
                .unwrap_or(false),
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Bool => f.write_str("bool"),
            FieldType::Int => f.write_str("int"),
            FieldType::UInt => f.write_str("uint"),
            FieldType::Float => f.write_str("float"),
            FieldType::String => f.write_str("string"),
            FieldType::Bytes => f.write_str("bytes"),
            FieldType::Document => f.write_str("document"),
            FieldType::Sequence(element) => write!(f, "sequence<{}>", element),
            FieldType::Variant(cases) => {
                f.write_str("variant{")?;
                for (i, (case, ty)) in cases.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", case, ty)?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Declaration of one field within a descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Diagnostic name (never persisted)
    pub name: String,
    /// Semantic type
    pub ty: FieldType,
    /// Value used when the field is absent after migration
    pub default: Value,
}

/// Per-version field layout
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDescriptor {
    version: SchemaVersion,
    fields: BTreeMap<FieldId, FieldSpec>,
    retired: BTreeSet<FieldId>,
}

impl SchemaDescriptor {
    /// Create an empty descriptor for `version`
    pub fn new(version: SchemaVersion) -> Self {
        SchemaDescriptor {
            version,
            fields: BTreeMap::new(),
            retired: BTreeSet::new(),
        }
    }

    /// Declare a field
    pub fn field(
        mut self,
        id: impl Into<FieldId>,
        name: impl Into<String>,
        ty: FieldType,
        default: impl Into<Value>,
    ) -> Self {
        self.fields.insert(
            id.into(),
            FieldSpec {
                name: name.into(),
                ty,
                default: default.into(),
            },
        );
        self
    }

    /// Retire a field identifier in this version
    ///
    /// The identifier is removed from the layout (if present) and reserved
    /// for every later version.
    pub fn retire(mut self, id: impl Into<FieldId>) -> Self {
        let id = id.into();
        self.fields.remove(&id);
        self.retired.insert(id);
        self
    }

    /// Version this descriptor describes
    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    /// Resolve a field identifier
    pub fn resolve(&self, id: FieldId) -> Option<&FieldSpec> {
        self.fields.get(&id)
    }

    /// All declared fields in identifier order
    pub fn fields(&self) -> impl Iterator<Item = (FieldId, &FieldSpec)> + '_ {
        self.fields.iter().map(|(id, spec)| (*id, spec))
    }

    /// Identifiers retired by this descriptor
    pub fn retired(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.retired.iter().copied()
    }

    /// Return a copy of `document` with every absent declared field set to
    /// its default and the version stamped to this descriptor's version
    ///
    /// Fields that are present are never overwritten; undeclared fields are
    /// carried through untouched.
    pub fn fill_defaults(&self, document: SaveDocument) -> SaveDocument {
        let mut fields = document.into_fields();
        for (id, spec) in &self.fields {
            fields.entry(*id).or_insert_with(|| spec.default.clone());
        }
        SaveDocument::from_fields(self.version, fields)
    }

    /// Check a document against this layout
    pub fn conformance(&self, document: &SaveDocument) -> Conformance {
        let mut report = Conformance::default();
        for (id, value) in document.fields() {
            match self.fields.get(id) {
                None => report.unknown.push(*id),
                Some(_) if matches!(value, Value::Opaque { .. }) => report.opaque.push(*id),
                Some(spec) if !spec.ty.admits(value) => {
                    report.mismatched.push(TypeMismatch {
                        field: *id,
                        expected: spec.ty.clone(),
                        actual: value.kind(),
                    })
                }
                Some(_) => {}
            }
        }
        for id in self.fields.keys() {
            if !document.contains(*id) {
                report.missing.push(*id);
            }
        }
        report
    }

    fn check_defaults(&self) -> Result<(), SchemaError> {
        for (id, spec) in &self.fields {
            if !spec.ty.admits(&spec.default) {
                return Err(SchemaError::DefaultTypeMismatch {
                    field: *id,
                    version: self.version,
                    expected: spec.ty.to_string(),
                    actual: spec.default.kind(),
                });
            }
        }
        Ok(())
    }
}

/// A declared field holding a value of the wrong type
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMismatch {
    /// Field identifier
    pub field: FieldId,
    /// Declared type
    pub expected: FieldType,
    /// Kind found
    pub actual: ValueKind,
}

/// Result of checking a document against a descriptor
///
/// Unknown fields are reported here and left in the document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conformance {
    /// Fields not declared by the descriptor
    pub unknown: Vec<FieldId>,
    /// Declared fields that are absent
    pub missing: Vec<FieldId>,
    /// Declared fields holding an undecodable value
    pub opaque: Vec<FieldId>,
    /// Declared fields holding a value of the wrong type
    pub mismatched: Vec<TypeMismatch>,
}

impl Conformance {
    /// True if every present field is declared and well-typed and nothing is missing
    pub fn is_exact(&self) -> bool {
        self.unknown.is_empty()
            && self.missing.is_empty()
            && self.opaque.is_empty()
            && self.mismatched.is_empty()
    }
}

/// Registry of schema versions and the migration steps between them
///
/// Built once with [`SchemaRegistry::builder`] and shared read-only.
pub struct SchemaRegistry {
    descriptors: BTreeMap<SchemaVersion, SchemaDescriptor>,
    steps: BTreeMap<SchemaVersion, Arc<dyn MigrationStep>>,
    current: SchemaVersion,
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("versions", &self.descriptors.keys().collect::<Vec<_>>())
            .field("steps_from", &self.steps.keys().collect::<Vec<_>>())
            .field("current", &self.current)
            .finish()
    }
}

impl SchemaRegistry {
    /// Start building a registry
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    /// Highest registered version
    pub fn current_version(&self) -> SchemaVersion {
        self.current
    }

    /// Descriptor for `version`
    pub fn descriptor_for(&self, version: SchemaVersion) -> Result<&SchemaDescriptor, SchemaError> {
        self.descriptors
            .get(&version)
            .ok_or(SchemaError::UnknownSchemaVersion {
                version,
                current: self.current,
            })
    }

    /// Descriptor for the current version
    pub fn current_descriptor(&self) -> &SchemaDescriptor {
        // current is always a key of descriptors (checked in build)
        &self.descriptors[&self.current]
    }

    /// Ordered steps leading from `from` to the current version
    ///
    /// Empty when `from` is already current. Fails with
    /// `UnknownSchemaVersion` if `from` is not registered (including versions
    /// newer than current) and with `NoMigrationPath` if any step in between
    /// is missing.
    pub fn migration_chain(
        &self,
        from: SchemaVersion,
    ) -> Result<Vec<Arc<dyn MigrationStep>>, SchemaError> {
        self.descriptor_for(from)?;
        (from..self.current)
            .map(|version| {
                self.steps
                    .get(&version)
                    .cloned()
                    .ok_or(SchemaError::NoMigrationPath {
                        from,
                        to: self.current,
                        missing: version,
                    })
            })
            .collect()
    }

    /// All registered versions in ascending order
    pub fn versions(&self) -> impl Iterator<Item = SchemaVersion> + '_ {
        self.descriptors.keys().copied()
    }
}

/// Builder for [`SchemaRegistry`]
#[derive(Default)]
pub struct SchemaRegistryBuilder {
    descriptors: Vec<SchemaDescriptor>,
    steps: Vec<Arc<dyn MigrationStep>>,
}

impl SchemaRegistryBuilder {
    /// Register a descriptor
    pub fn version(mut self, descriptor: SchemaDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Register a migration step
    pub fn step(mut self, step: impl MigrationStep + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Register a shared migration step
    pub fn shared_step(mut self, step: Arc<dyn MigrationStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Validate and build the registry
    ///
    /// Checks: at least one descriptor, no duplicate versions or steps, every
    /// step advances exactly one version to a registered descriptor, defaults
    /// match declared types, and no retired identifier reappears in a later
    /// version.
    pub fn build(self) -> Result<SchemaRegistry, SchemaError> {
        let mut descriptors = BTreeMap::new();
        for descriptor in self.descriptors {
            descriptor.check_defaults()?;
            let version = descriptor.version();
            if descriptors.insert(version, descriptor).is_some() {
                return Err(SchemaError::DuplicateVersion(version));
            }
        }

        let current = *descriptors.keys().next_back().ok_or(SchemaError::Empty)?;

        let mut retired: BTreeMap<FieldId, SchemaVersion> = BTreeMap::new();
        for (version, descriptor) in &descriptors {
            for (id, _) in descriptor.fields() {
                if let Some(retired_in) = retired.get(&id) {
                    return Err(SchemaError::FieldIdReused {
                        field: id,
                        retired_in: *retired_in,
                        version: *version,
                    });
                }
            }
            for id in descriptor.retired() {
                retired.entry(id).or_insert(*version);
            }
        }

        let mut steps = BTreeMap::new();
        for step in self.steps {
            let from = step.source_version();
            let to = step.target_version();
            if from.checked_add(1) != Some(to) {
                return Err(SchemaError::InvalidStepTarget { from, to });
            }
            if !descriptors.contains_key(&to) {
                return Err(SchemaError::UnregisteredStepTarget { from, to });
            }
            if steps.insert(from, step).is_some() {
                return Err(SchemaError::DuplicateStep(from));
            }
        }

        Ok(SchemaRegistry {
            descriptors,
            steps,
            current,
        })
    }
}
