//! The versioned persisted unit
//!
//! A `SaveDocument` is built fresh from live state on every save, handed to
//! the codec, and dropped. On load the codec builds one from bytes and each
//! migration step consumes it and produces a new document one version higher.
//! Nothing mutates a document after it has been handed downstream.

use crate::value::{FieldId, Fields, Value};

/// Schema version number
pub type SchemaVersion = u32;

/// A versioned document: a schema version plus an ordered field map
#[derive(Debug, Clone, PartialEq)]
pub struct SaveDocument {
    schema_version: SchemaVersion,
    fields: Fields,
}

impl SaveDocument {
    /// Create an empty document stamped with `schema_version`
    pub fn new(schema_version: SchemaVersion) -> Self {
        SaveDocument {
            schema_version,
            fields: Fields::new(),
        }
    }

    /// Create a document from an existing field map
    pub fn from_fields(schema_version: SchemaVersion, fields: Fields) -> Self {
        SaveDocument {
            schema_version,
            fields,
        }
    }

    /// Builder-style field insertion
    pub fn with_field(mut self, id: impl Into<FieldId>, value: impl Into<Value>) -> Self {
        self.fields.insert(id.into(), value.into());
        self
    }

    /// Schema version this document conforms to
    pub fn schema_version(&self) -> SchemaVersion {
        self.schema_version
    }

    /// Borrow the field map
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Take the field map, consuming the document
    pub fn into_fields(self) -> Fields {
        self.fields
    }

    /// Look up a field
    pub fn get(&self, id: impl Into<FieldId>) -> Option<&Value> {
        self.fields.get(&id.into())
    }

    /// True if the field is present
    pub fn contains(&self, id: impl Into<FieldId>) -> bool {
        self.fields.contains_key(&id.into())
    }

    /// Number of top-level fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the document has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field identifiers in numeric order
    pub fn field_ids(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.fields.keys().copied()
    }
}
