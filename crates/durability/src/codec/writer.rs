//! Payload encoder
//!
//! # Binary Format
//!
//! ```text
//! fields   := count(u32) field*            (ascending field id)
//! field    := id(u32) tagged
//! tagged   := tag(u8) len(u32) body[len]
//! body     := bool: 0|1 (1 byte)
//!           | int/uint/float: 8 bytes LE
//!           | string: UTF-8 bytes
//!           | bytes: raw
//!           | document: fields
//!           | sequence: elem_tag(u8) count(u32) tagged*
//!           | variant: case(u8) tagged
//! ```
//!
//! Every value carries its own length, so a reader can skip any value
//! without understanding it. Nesting is capped at the reader's
//! [`MAX_NESTING_DEPTH`] so nothing is written that cannot be read back.

use savestate_core::{FieldId, Fields, Value};

use super::reader::MAX_NESTING_DEPTH;
use super::tags;
use super::CodecError;

/// Encode a top-level field map
pub(crate) fn encode_fields(out: &mut Vec<u8>, fields: &Fields) -> Result<(), CodecError> {
    encode_fields_at(out, fields, 0)
}

fn encode_fields_at(out: &mut Vec<u8>, fields: &Fields, depth: usize) -> Result<(), CodecError> {
    let count = u32::try_from(fields.len()).map_err(|_| CodecError::PayloadTooLarge {
        field: None,
        len: fields.len() as u64,
    })?;
    out.extend_from_slice(&count.to_le_bytes());
    // BTreeMap iteration is ascending id order
    for (id, value) in fields {
        out.extend_from_slice(&id.get().to_le_bytes());
        encode_tagged(out, value, *id, depth)?;
    }
    Ok(())
}

/// Encode tag, length placeholder, body, then patch the length
fn encode_tagged(
    out: &mut Vec<u8>,
    value: &Value,
    field: FieldId,
    depth: usize,
) -> Result<(), CodecError> {
    out.push(tags::tag_of(value));
    let len_at = out.len();
    out.extend_from_slice(&[0u8; 4]);
    let body_start = out.len();

    encode_body(out, value, field, depth)?;

    let body_len = out.len() - body_start;
    let len = u32::try_from(body_len).map_err(|_| CodecError::PayloadTooLarge {
        field: Some(field),
        len: body_len as u64,
    })?;
    out[len_at..len_at + 4].copy_from_slice(&len.to_le_bytes());
    Ok(())
}

fn encode_body(
    out: &mut Vec<u8>,
    value: &Value,
    field: FieldId,
    depth: usize,
) -> Result<(), CodecError> {
    // Same bound the decoder applies to a body at this depth
    if depth >= MAX_NESTING_DEPTH {
        return Err(CodecError::NestingTooDeep {
            field,
            limit: MAX_NESTING_DEPTH,
        });
    }
    match value {
        Value::Bool(b) => out.push(u8::from(*b)),
        Value::Int(i) => out.extend_from_slice(&i.to_le_bytes()),
        Value::UInt(u) => out.extend_from_slice(&u.to_le_bytes()),
        Value::Float(f) => out.extend_from_slice(&f.to_bits().to_le_bytes()),
        Value::String(s) => out.extend_from_slice(s.as_bytes()),
        Value::Bytes(b) => out.extend_from_slice(b),
        Value::Document(fields) => encode_fields_at(out, fields, depth + 1)?,
        Value::Sequence(items) => {
            let elem_tag = items.first().map(tags::tag_of).unwrap_or(tags::NONE);
            if let Some(other) = items.iter().map(tags::tag_of).find(|t| *t != elem_tag) {
                return Err(CodecError::HeterogeneousSequence {
                    field,
                    expected: elem_tag,
                    found: other,
                });
            }
            let count = u32::try_from(items.len()).map_err(|_| CodecError::PayloadTooLarge {
                field: Some(field),
                len: items.len() as u64,
            })?;
            out.push(elem_tag);
            out.extend_from_slice(&count.to_le_bytes());
            for item in items {
                encode_tagged(out, item, field, depth + 1)?;
            }
        }
        Value::Variant { case, value } => {
            out.push(*case);
            encode_tagged(out, value, field, depth + 1)?;
        }
        Value::Opaque { tag, bytes } => {
            // A known tag here would be re-read as a different value
            if tags::is_known(*tag) || *tag == tags::NONE {
                return Err(CodecError::InvalidOpaque { field, tag: *tag });
            }
            out.extend_from_slice(bytes);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_one(value: Value) -> Vec<u8> {
        let mut fields = Fields::new();
        fields.insert(FieldId(1), value);
        let mut out = Vec::new();
        encode_fields(&mut out, &fields).unwrap();
        out
    }

    #[test]
    fn test_int_layout() {
        let out = encode_one(Value::Int(-2));
        // count(4) + id(4) + tag(1) + len(4) + body(8)
        assert_eq!(out.len(), 21);
        assert_eq!(&out[0..4], &1u32.to_le_bytes());
        assert_eq!(&out[4..8], &1u32.to_le_bytes());
        assert_eq!(out[8], tags::INT);
        assert_eq!(&out[9..13], &8u32.to_le_bytes());
        assert_eq!(&out[13..21], &(-2i64).to_le_bytes());
    }

    #[test]
    fn test_string_is_length_prefixed() {
        let out = encode_one(Value::from("héllo"));
        assert_eq!(out[8], tags::STRING);
        let len = u32::from_le_bytes(out[9..13].try_into().unwrap());
        assert_eq!(len as usize, "héllo".len());
        assert_eq!(&out[13..], "héllo".as_bytes());
    }

    #[test]
    fn test_fields_written_in_id_order() {
        let mut fields = Fields::new();
        fields.insert(FieldId(20), Value::Bool(true));
        fields.insert(FieldId(3), Value::Bool(false));
        let mut out = Vec::new();
        encode_fields(&mut out, &fields).unwrap();

        let first_id = u32::from_le_bytes(out[4..8].try_into().unwrap());
        assert_eq!(first_id, 3);
    }

    #[test]
    fn test_empty_sequence_uses_none_tag() {
        let out = encode_one(Value::empty_sequence());
        assert_eq!(out[8], tags::SEQUENCE);
        assert_eq!(out[13], tags::NONE);
        assert_eq!(&out[14..18], &0u32.to_le_bytes());
    }

    #[test]
    fn test_heterogeneous_sequence_rejected() {
        let mut fields = Fields::new();
        fields.insert(
            FieldId(5),
            Value::Sequence(vec![Value::Int(1), Value::from("two")]),
        );
        let err = encode_fields(&mut Vec::new(), &fields).unwrap_err();
        assert_eq!(
            err,
            CodecError::HeterogeneousSequence {
                field: FieldId(5),
                expected: tags::INT,
                found: tags::STRING
            }
        );
    }

    #[test]
    fn test_opaque_with_known_tag_rejected() {
        let mut fields = Fields::new();
        fields.insert(
            FieldId(1),
            Value::Opaque {
                tag: tags::INT,
                bytes: vec![0; 8],
            },
        );
        assert!(matches!(
            encode_fields(&mut Vec::new(), &fields),
            Err(CodecError::InvalidOpaque { .. })
        ));
    }

    #[test]
    fn test_variant_layout() {
        let out = encode_one(Value::variant(3, Value::Bool(true)));
        assert_eq!(out[8], tags::VARIANT);
        // body: case + tag + len + 1
        assert_eq!(&out[9..13], &7u32.to_le_bytes());
        assert_eq!(out[13], 3);
        assert_eq!(out[14], tags::BOOL);
    }
}
