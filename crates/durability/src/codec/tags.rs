//! Wire type tags
//!
//! Every encoded value starts with one of these bytes. Tags are never
//! renumbered; a new value kind gets a new tag, and older readers preserve
//! values carrying a tag they do not know.

use savestate_core::Value;

/// Element tag of an empty sequence
pub const NONE: u8 = 0x00;
/// Boolean, 1-byte body
pub const BOOL: u8 = 0x01;
/// Signed integer, 8-byte little-endian body
pub const INT: u8 = 0x02;
/// Unsigned integer, 8-byte little-endian body
pub const UINT: u8 = 0x03;
/// IEEE-754 double, 8-byte little-endian body
pub const FLOAT: u8 = 0x04;
/// UTF-8 string
pub const STRING: u8 = 0x05;
/// Raw bytes
pub const BYTES: u8 = 0x06;
/// Nested document
pub const DOCUMENT: u8 = 0x07;
/// Homogeneous sequence
pub const SEQUENCE: u8 = 0x08;
/// Tagged variant
pub const VARIANT: u8 = 0x09;

/// All value tags understood by this codec revision
pub const ALL_TAGS: [u8; 9] = [BOOL, INT, UINT, FLOAT, STRING, BYTES, DOCUMENT, SEQUENCE, VARIANT];

/// True if this codec revision can decode `tag`
pub fn is_known(tag: u8) -> bool {
    ALL_TAGS.contains(&tag)
}

/// Wire tag for `value`
pub fn tag_of(value: &Value) -> u8 {
    match value {
        Value::Bool(_) => BOOL,
        Value::Int(_) => INT,
        Value::UInt(_) => UINT,
        Value::Float(_) => FLOAT,
        Value::String(_) => STRING,
        Value::Bytes(_) => BYTES,
        Value::Document(_) => DOCUMENT,
        Value::Sequence(_) => SEQUENCE,
        Value::Variant { .. } => VARIANT,
        Value::Opaque { tag, .. } => *tag,
    }
}

/// Tag name for diagnostics
pub fn tag_name(tag: u8) -> &'static str {
    match tag {
        NONE => "none",
        BOOL => "bool",
        INT => "int",
        UINT => "uint",
        FLOAT => "float",
        STRING => "string",
        BYTES => "bytes",
        DOCUMENT => "document",
        SEQUENCE => "sequence",
        VARIANT => "variant",
        _ => "unknown",
    }
}
