//! Payload decoder
//!
//! The decoder never consults a schema. Each value is self-describing
//! (tag + length), which is what lets a newer build read any older payload
//! and an older build carry newer values along as opaque bytes.

use byteorder::{ByteOrder, LittleEndian};
use savestate_core::{FieldId, Fields, Value};
use tracing::debug;

use super::tags;
use super::{CodecError, UnknownTagPolicy};

/// Maximum nesting of documents, sequences and variants
pub const MAX_NESTING_DEPTH: usize = 64;

/// Smallest possible encoded field: id(4) + tag(1) + len(4)
const MIN_FIELD_SIZE: usize = 9;

/// Smallest possible encoded tagged value: tag(1) + len(4)
const MIN_TAGGED_SIZE: usize = 5;

/// Bounds-checked cursor over a byte slice
///
/// `base` is the absolute offset of `data[0]` within the payload, so error
/// offsets point into the whole payload rather than a nested body.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Reader {
            data,
            pos: 0,
            base: 0,
        }
    }

    fn nested(data: &'a [u8], base: usize) -> Self {
        Reader { data, pos: 0, base }
    }

    fn offset(&self) -> usize {
        self.base + self.pos
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &str, field: Option<FieldId>) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::MalformedPayload {
                offset: self.offset(),
                field,
                reason: format!("{}: need {} bytes, {} remain", what, n, self.remaining()),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self, what: &str, field: Option<FieldId>) -> Result<u8, CodecError> {
        Ok(self.take(1, what, field)?[0])
    }

    fn u32(&mut self, what: &str, field: Option<FieldId>) -> Result<u32, CodecError> {
        Ok(LittleEndian::read_u32(self.take(4, what, field)?))
    }

    fn finish(&self, what: &str, field: Option<FieldId>) -> Result<(), CodecError> {
        if self.remaining() != 0 {
            return Err(CodecError::MalformedPayload {
                offset: self.offset(),
                field,
                reason: format!("{}: {} unconsumed bytes", what, self.remaining()),
            });
        }
        Ok(())
    }
}

/// Decoder state shared across one payload
pub(crate) struct Decoder {
    pub(crate) policy: UnknownTagPolicy,
    pub(crate) opaque_count: usize,
}

impl Decoder {
    pub(crate) fn new(policy: UnknownTagPolicy) -> Self {
        Decoder {
            policy,
            opaque_count: 0,
        }
    }

    /// Decode a complete field map; every byte of `reader` must be consumed
    pub(crate) fn decode_payload(&mut self, reader: &mut Reader<'_>) -> Result<Fields, CodecError> {
        let fields = self.decode_fields(reader, 0, None)?;
        reader.finish("payload", None)?;
        Ok(fields)
    }

    fn decode_fields(
        &mut self,
        reader: &mut Reader<'_>,
        depth: usize,
        parent: Option<FieldId>,
    ) -> Result<Fields, CodecError> {
        let count = reader.u32("field count", parent)? as usize;
        if count > reader.remaining() / MIN_FIELD_SIZE {
            return Err(CodecError::MalformedPayload {
                offset: reader.offset(),
                field: parent,
                reason: format!(
                    "field count {} cannot fit in {} remaining bytes",
                    count,
                    reader.remaining()
                ),
            });
        }

        let mut fields = Fields::new();
        let mut last: Option<FieldId> = None;
        for _ in 0..count {
            let id = FieldId(reader.u32("field id", parent)?);
            if last.is_some_and(|prev| id <= prev) {
                return Err(CodecError::MalformedPayload {
                    offset: reader.offset() - 4,
                    field: Some(id),
                    reason: "field ids not strictly ascending".to_string(),
                });
            }
            last = Some(id);
            let value = self.decode_tagged(reader, depth, id)?;
            fields.insert(id, value);
        }
        Ok(fields)
    }

    fn decode_tagged(
        &mut self,
        reader: &mut Reader<'_>,
        depth: usize,
        field: FieldId,
    ) -> Result<Value, CodecError> {
        let tag = reader.u8("type tag", Some(field))?;
        let len = reader.u32("value length", Some(field))? as usize;
        let body_offset = reader.offset();
        let body = reader.take(len, "value body", Some(field))?;
        self.decode_body(tag, body, body_offset, depth, field)
    }

    fn decode_body(
        &mut self,
        tag: u8,
        body: &[u8],
        body_offset: usize,
        depth: usize,
        field: FieldId,
    ) -> Result<Value, CodecError> {
        if depth >= MAX_NESTING_DEPTH {
            return Err(CodecError::MalformedPayload {
                offset: body_offset,
                field: Some(field),
                reason: format!("nesting deeper than {}", MAX_NESTING_DEPTH),
            });
        }

        let fixed = |expected: usize| -> Result<(), CodecError> {
            if body.len() != expected {
                return Err(CodecError::MalformedPayload {
                    offset: body_offset,
                    field: Some(field),
                    reason: format!(
                        "{} body must be {} bytes, found {}",
                        tags::tag_name(tag),
                        expected,
                        body.len()
                    ),
                });
            }
            Ok(())
        };

        match tag {
            tags::BOOL => {
                fixed(1)?;
                match body[0] {
                    0 => Ok(Value::Bool(false)),
                    1 => Ok(Value::Bool(true)),
                    other => Err(CodecError::MalformedPayload {
                        offset: body_offset,
                        field: Some(field),
                        reason: format!("invalid bool byte {:#04x}", other),
                    }),
                }
            }
            tags::INT => {
                fixed(8)?;
                Ok(Value::Int(LittleEndian::read_i64(body)))
            }
            tags::UINT => {
                fixed(8)?;
                Ok(Value::UInt(LittleEndian::read_u64(body)))
            }
            tags::FLOAT => {
                fixed(8)?;
                Ok(Value::Float(f64::from_bits(LittleEndian::read_u64(body))))
            }
            tags::STRING => String::from_utf8(body.to_vec())
                .map(Value::String)
                .map_err(|_| CodecError::InvalidUtf8 {
                    field,
                    offset: body_offset,
                }),
            tags::BYTES => Ok(Value::Bytes(body.to_vec())),
            tags::DOCUMENT => {
                let mut nested = Reader::nested(body, body_offset);
                let fields = self.decode_fields(&mut nested, depth + 1, Some(field))?;
                nested.finish("document", Some(field))?;
                Ok(Value::Document(fields))
            }
            tags::SEQUENCE => {
                let mut nested = Reader::nested(body, body_offset);
                let elem_tag = nested.u8("element tag", Some(field))?;
                let count = nested.u32("element count", Some(field))? as usize;
                if count > nested.remaining() / MIN_TAGGED_SIZE {
                    return Err(CodecError::MalformedPayload {
                        offset: nested.offset(),
                        field: Some(field),
                        reason: format!(
                            "element count {} cannot fit in {} remaining bytes",
                            count,
                            nested.remaining()
                        ),
                    });
                }
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    let item_offset = nested.offset();
                    let item_tag = nested.u8("element type tag", Some(field))?;
                    if item_tag != elem_tag {
                        return Err(CodecError::MalformedPayload {
                            offset: item_offset,
                            field: Some(field),
                            reason: format!(
                                "sequence element is {}, sequence declares {}",
                                tags::tag_name(item_tag),
                                tags::tag_name(elem_tag)
                            ),
                        });
                    }
                    let len = nested.u32("element length", Some(field))? as usize;
                    let item_body_offset = nested.offset();
                    let item_body = nested.take(len, "element body", Some(field))?;
                    items.push(self.decode_body(
                        item_tag,
                        item_body,
                        item_body_offset,
                        depth + 1,
                        field,
                    )?);
                }
                nested.finish("sequence", Some(field))?;
                Ok(Value::Sequence(items))
            }
            tags::VARIANT => {
                let mut nested = Reader::nested(body, body_offset);
                let case = nested.u8("variant case", Some(field))?;
                let value = self.decode_tagged(&mut nested, depth + 1, field)?;
                nested.finish("variant", Some(field))?;
                Ok(Value::variant(case, value))
            }
            unknown => match self.policy {
                UnknownTagPolicy::Preserve => {
                    debug!(
                        target: "savestate::codec",
                        field = field.get(),
                        tag = unknown,
                        len = body.len(),
                        "Preserving value with unknown type tag"
                    );
                    self.opaque_count += 1;
                    Ok(Value::Opaque {
                        tag: unknown,
                        bytes: body.to_vec(),
                    })
                }
                UnknownTagPolicy::Reject => Err(CodecError::UnknownFieldType {
                    field,
                    tag: unknown,
                }),
            },
        }
    }
}
