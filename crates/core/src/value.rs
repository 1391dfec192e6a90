//! Value types for save documents
//!
//! This module defines:
//! - `FieldId`: stable small integer naming a field across schema versions
//! - `Fields`: the ordered field map of a document
//! - `Value`: the typed value stored under a field
//! - `ValueKind`: the kind discriminant of a `Value`
//!
//! ## Type Rules
//!
//! - Different kinds are NEVER equal: `Int(1) != UInt(1)`
//! - `Bytes` are not `String`
//! - Floats compare bitwise, so a stored NaN reads back equal to itself
//! - `Opaque` holds a value written by a newer codec revision; it is carried
//!   along untouched and re-encoded byte-for-byte

use std::collections::BTreeMap;
use std::fmt;

/// Field identifier
///
/// Identifiers are assigned once and never reused. A field that is removed
/// from the schema leaves its identifier retired (see
/// [`SchemaDescriptor::retire`](crate::SchemaDescriptor::retire)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId(pub u32);

impl FieldId {
    /// Raw numeric identifier
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for FieldId {
    fn from(id: u32) -> Self {
        FieldId(id)
    }
}

/// Ordered field map
///
/// Iteration order is the numeric identifier order, independent of
/// insertion order.
pub type Fields = BTreeMap<FieldId, Value>;

/// Kind discriminant of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Boolean
    Bool,
    /// Signed 64-bit integer
    Int,
    /// Unsigned 64-bit integer
    UInt,
    /// 64-bit float
    Float,
    /// UTF-8 string
    String,
    /// Raw bytes
    Bytes,
    /// Nested document
    Document,
    /// Homogeneous sequence
    Sequence,
    /// Tagged variant
    Variant,
    /// Value of a kind unknown to this build
    Opaque,
}

impl ValueKind {
    /// Human-readable kind name
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::UInt => "uint",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::Bytes => "bytes",
            ValueKind::Document => "document",
            ValueKind::Sequence => "sequence",
            ValueKind::Variant => "variant",
            ValueKind::Opaque => "opaque",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed field value
#[derive(Debug, Clone)]
pub enum Value {
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit unsigned integer
    UInt(u64),
    /// 64-bit floating point
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Nested document
    Document(Fields),
    /// Sequence of values sharing one kind
    Sequence(Vec<Value>),
    /// Tagged variant: a case discriminant plus the case payload
    Variant {
        /// Case discriminant
        case: u8,
        /// Case payload
        value: Box<Value>,
    },
    /// Undecodable value preserved verbatim
    Opaque {
        /// Wire type tag as read
        tag: u8,
        /// Raw body bytes
        bytes: Vec<u8>,
    },
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Document(a), Value::Document(b)) => a == b,
            (Value::Sequence(a), Value::Sequence(b)) => a == b,
            (
                Value::Variant { case: ca, value: va },
                Value::Variant { case: cb, value: vb },
            ) => ca == cb && va == vb,
            (
                Value::Opaque { tag: ta, bytes: ba },
                Value::Opaque { tag: tb, bytes: bb },
            ) => ta == tb && ba == bb,
            _ => false,
        }
    }
}

impl Value {
    /// Kind discriminant
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::UInt(_) => ValueKind::UInt,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Document(_) => ValueKind::Document,
            Value::Sequence(_) => ValueKind::Sequence,
            Value::Variant { .. } => ValueKind::Variant,
            Value::Opaque { .. } => ValueKind::Opaque,
        }
    }

    /// Empty sequence
    pub fn empty_sequence() -> Self {
        Value::Sequence(Vec::new())
    }

    /// Build a tagged variant
    pub fn variant(case: u8, value: Value) -> Self {
        Value::Variant {
            case,
            value: Box::new(value),
        }
    }

    /// Get as bool if this is a Bool value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 if this is an Int value
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as u64 if this is a UInt value
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::UInt(u) => Some(*u),
            _ => None,
        }
    }

    /// Get as f64 if this is a Float value
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as &str if this is a String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as &[u8] if this is a Bytes value
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get as field map if this is a Document value
    pub fn as_document(&self) -> Option<&Fields> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    /// Get as slice if this is a Sequence value
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// True if this value, or anything nested in it, is opaque
    pub fn contains_opaque(&self) -> bool {
        match self {
            Value::Opaque { .. } => true,
            Value::Document(fields) => fields.values().any(Value::contains_opaque),
            Value::Sequence(items) => items.iter().any(Value::contains_opaque),
            Value::Variant { value, .. } => value.contains_opaque(),
            _ => false,
        }
    }
}

// ============================================================================
// From implementations for ergonomic API usage
// ============================================================================

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Value::UInt(u)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Fields> for Value {
    fn from(fields: Fields) -> Self {
        Value::Document(fields)
    }
}
