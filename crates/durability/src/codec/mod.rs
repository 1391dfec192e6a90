//! Binary codec for save documents
//!
//! Encodes a [`SaveDocument`] to a compact, deterministic byte payload and
//! back. Encoding is canonical: fields are written in ascending identifier
//! order, numbers are fixed-width little-endian, and every value is
//! length-prefixed, so the same document always produces the same bytes.
//!
//! [`BinaryCodec::encode_blob`] and [`BinaryCodec::decode`] additionally
//! handle the persisted blob header (see [`crate::format::blob`]).

mod reader;
pub mod tags;
mod writer;

use savestate_core::{FieldId, SaveDocument};
use tracing::debug;

use crate::format::blob::{seal, BlobFormatError, PersistedBlob, BLOB_HEADER_SIZE};

pub use reader::MAX_NESTING_DEPTH;

/// What the decoder does with a type tag it does not know
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownTagPolicy {
    /// Keep the value as [`Value::Opaque`](savestate_core::Value::Opaque)
    #[default]
    Preserve,
    /// Fail with [`CodecError::UnknownFieldType`]
    Reject,
}

/// Binary codec
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec {
    policy: UnknownTagPolicy,
}

impl BinaryCodec {
    /// Create a codec with the given unknown-tag policy
    pub fn new(policy: UnknownTagPolicy) -> Self {
        BinaryCodec { policy }
    }

    /// Unknown-tag policy in effect
    pub fn policy(&self) -> UnknownTagPolicy {
        self.policy
    }

    /// Encode the document's fields to a payload
    ///
    /// The schema version is not part of the payload; it travels in the blob
    /// header.
    pub fn encode(&self, document: &SaveDocument) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        writer::encode_fields(&mut out, document.fields())?;
        Ok(out)
    }

    /// Encode the document and frame it with a blob header
    pub fn encode_blob(&self, document: &SaveDocument, magic: [u8; 4]) -> Result<Vec<u8>, CodecError> {
        let payload = self.encode(document)?;
        let blob = seal(magic, document.schema_version(), &payload);
        debug!(
            target: "savestate::codec",
            schema_version = document.schema_version(),
            fields = document.len(),
            payload_len = payload.len(),
            "Encoded document"
        );
        Ok(blob)
    }

    /// Decode a full blob (header + payload)
    ///
    /// The header is validated and the payload checksum verified before any
    /// payload byte is interpreted. The returned document carries the schema
    /// version from the header.
    pub fn decode(&self, bytes: &[u8], expected_magic: [u8; 4]) -> Result<SaveDocument, CodecError> {
        let blob = PersistedBlob::parse(bytes, expected_magic)?;
        self.decode_payload(blob.header.schema_version, blob.payload)
    }

    /// Decode a bare payload written at `schema_version`
    pub fn decode_payload(&self, schema_version: u32, payload: &[u8]) -> Result<SaveDocument, CodecError> {
        let mut decoder = reader::Decoder::new(self.policy);
        let fields = decoder.decode_payload(&mut reader::Reader::new(payload))?;
        debug!(
            target: "savestate::codec",
            schema_version,
            fields = fields.len(),
            opaque = decoder.opaque_count,
            "Decoded document"
        );
        Ok(SaveDocument::from_fields(schema_version, fields))
    }
}

/// Codec errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The byte stream ends before a declared length is satisfied, or a
    /// value body is structurally invalid
    #[error("Malformed payload at offset {offset}{}: {reason}", field_suffix(.field))]
    MalformedPayload {
        /// Absolute payload offset of the problem
        offset: usize,
        /// Field being decoded, if known
        field: Option<FieldId>,
        /// What went wrong
        reason: String,
    },

    /// Type tag not recognized by this codec revision (reject policy only)
    #[error("Unknown type tag {tag:#04x} in field {field}")]
    UnknownFieldType {
        /// Field holding the value
        field: FieldId,
        /// Tag found
        tag: u8,
    },

    /// Fewer bytes are available than the header declares
    #[error("Truncated input: header declares {declared} bytes, {available} available")]
    TruncatedInput {
        /// Bytes declared
        declared: u64,
        /// Bytes available
        available: u64,
    },

    /// Magic marker does not identify this format family
    #[error("Invalid magic bytes: expected {expected:?}, got {actual:?}")]
    BadMagic {
        /// Expected marker
        expected: [u8; 4],
        /// Marker found
        actual: [u8; 4],
    },

    /// Header CRC mismatch
    #[error("Corrupt header: {0}")]
    CorruptHeader(String),

    /// Payload checksum mismatch
    #[error("Payload checksum mismatch: stored={stored:#018x}, computed={computed:#018x}")]
    ChecksumMismatch {
        /// Stored checksum
        stored: u64,
        /// Computed checksum
        computed: u64,
    },

    /// Header format revision newer than this reader
    #[error("Unsupported format revision {revision}, max supported is {max_supported}")]
    UnsupportedFormatRevision {
        /// Revision found
        revision: u16,
        /// Highest revision understood
        max_supported: u16,
    },

    /// String body is not UTF-8
    #[error("Invalid UTF-8 in field {field} at offset {offset}")]
    InvalidUtf8 {
        /// Field holding the string
        field: FieldId,
        /// Offset of the string body
        offset: usize,
    },

    /// Sequence elements of different kinds (encode side)
    #[error("Sequence in field {field} mixes tag {expected:#04x} with {found:#04x}")]
    HeterogeneousSequence {
        /// Field holding the sequence
        field: FieldId,
        /// Tag of the first element
        expected: u8,
        /// Tag of the offending element
        found: u8,
    },

    /// Opaque value carrying a tag this codec knows (encode side)
    #[error("Opaque value in field {field} carries known tag {tag:#04x}")]
    InvalidOpaque {
        /// Field holding the value
        field: FieldId,
        /// Offending tag
        tag: u8,
    },

    /// A length does not fit the 32-bit wire prefix (encode side)
    #[error("Value too large to encode{}: {len}", field_suffix(.field))]
    PayloadTooLarge {
        /// Field holding the value, if any
        field: Option<FieldId>,
        /// Offending length
        len: u64,
    },

    /// Documents, sequences and variants nested past what a reader accepts (encode side)
    #[error("Value in field {field} nested deeper than {limit} levels")]
    NestingTooDeep {
        /// Field holding the value
        field: FieldId,
        /// Deepest level allowed
        limit: usize,
    },
}

fn field_suffix(field: &Option<FieldId>) -> String {
    match field {
        Some(id) => format!(" (field {})", id),
        None => String::new(),
    }
}

impl From<BlobFormatError> for CodecError {
    fn from(e: BlobFormatError) -> Self {
        match e {
            BlobFormatError::TooShort { available, .. } => CodecError::TruncatedInput {
                declared: BLOB_HEADER_SIZE as u64,
                available: available as u64,
            },
            BlobFormatError::PayloadTruncated {
                declared,
                available,
            } => CodecError::TruncatedInput {
                declared,
                available,
            },
            BlobFormatError::TrailingBytes { declared, actual } => CodecError::MalformedPayload {
                offset: BLOB_HEADER_SIZE + declared as usize,
                field: None,
                reason: format!("{} bytes past declared payload end", actual - declared),
            },
            e @ BlobFormatError::HeaderCrcMismatch { .. } => CodecError::CorruptHeader(e.to_string()),
            BlobFormatError::BadMagic { expected, actual } => {
                CodecError::BadMagic { expected, actual }
            }
            BlobFormatError::UnsupportedRevision {
                revision,
                max_supported,
            } => CodecError::UnsupportedFormatRevision {
                revision,
                max_supported,
            },
            BlobFormatError::ChecksumMismatch { stored, computed } => {
                CodecError::ChecksumMismatch { stored, computed }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use savestate_core::{Fields, Value};

    const MAGIC: [u8; 4] = *b"TEST";

    fn player_doc() -> SaveDocument {
        let mut stats = Fields::new();
        stats.insert(FieldId(1), Value::Float(0.75));
        stats.insert(FieldId(2), Value::UInt(12));

        SaveDocument::new(2)
            .with_field(1, 3i64)
            .with_field(2, 150i64)
            .with_field(
                3,
                Value::Sequence(vec![Value::from("sword"), Value::from("lantern")]),
            )
            .with_field(4, Value::Document(stats))
            .with_field(5, Value::variant(1, Value::from("north gate")))
            .with_field(6, Value::Bytes(vec![0, 1, 2, 255]))
            .with_field(7, true)
    }

    #[test]
    fn test_round_trip_blob() {
        let codec = BinaryCodec::default();
        let doc = player_doc();
        let blob = codec.encode_blob(&doc, MAGIC).unwrap();
        let decoded = codec.decode(&blob, MAGIC).unwrap();
        assert_eq!(decoded, doc);
        assert_eq!(decoded.schema_version(), 2);
    }

    #[test]
    fn test_encode_independent_of_insertion_order() {
        let codec = BinaryCodec::default();
        let a = SaveDocument::new(1).with_field(1, 1i64).with_field(2, 2i64);
        let b = SaveDocument::new(1).with_field(2, 2i64).with_field(1, 1i64);
        assert_eq!(codec.encode(&a).unwrap(), codec.encode(&b).unwrap());
    }

    #[test]
    fn test_opaque_round_trip_is_byte_identical() {
        let codec = BinaryCodec::default();
        let mut payload = codec
            .encode(&SaveDocument::new(1).with_field(1, 5i64))
            .unwrap();
        // Append a field with a tag from a future codec revision
        payload[0..4].copy_from_slice(&2u32.to_le_bytes());
        payload.extend_from_slice(&9u32.to_le_bytes());
        payload.push(0x30);
        payload.extend_from_slice(&3u32.to_le_bytes());
        payload.extend_from_slice(&[7, 8, 9]);

        let doc = codec.decode_payload(1, &payload).unwrap();
        assert!(doc.get(9).unwrap().contains_opaque());
        assert_eq!(codec.encode(&doc).unwrap(), payload);
    }

    #[test]
    fn test_reject_policy() {
        let mut payload = 1u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&9u32.to_le_bytes());
        payload.push(0x30);
        payload.extend_from_slice(&0u32.to_le_bytes());

        let err = BinaryCodec::new(UnknownTagPolicy::Reject)
            .decode_payload(1, &payload)
            .unwrap_err();
        assert_eq!(
            err,
            CodecError::UnknownFieldType {
                field: FieldId(9),
                tag: 0x30
            }
        );
    }

    #[test]
    fn test_truncated_blob() {
        let codec = BinaryCodec::default();
        let blob = codec.encode_blob(&player_doc(), MAGIC).unwrap();
        let err = codec.decode(&blob[..blob.len() - 10], MAGIC).unwrap_err();
        assert!(matches!(err, CodecError::TruncatedInput { .. }));

        let err = codec.decode(&blob[..8], MAGIC).unwrap_err();
        assert!(matches!(
            err,
            CodecError::TruncatedInput {
                declared: 32,
                available: 8
            }
        ));
    }

    #[test]
    fn test_bad_magic() {
        let codec = BinaryCodec::default();
        let blob = codec.encode_blob(&player_doc(), MAGIC).unwrap();
        assert!(matches!(
            codec.decode(&blob, *b"NOPE"),
            Err(CodecError::BadMagic { .. })
        ));
    }

    #[test]
    fn test_payload_corruption_is_checksum_error() {
        let codec = BinaryCodec::default();
        let mut blob = codec.encode_blob(&player_doc(), MAGIC).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x10;
        assert!(matches!(
            codec.decode(&blob, MAGIC),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_error_display_mentions_field() {
        let err = CodecError::MalformedPayload {
            offset: 12,
            field: Some(FieldId(3)),
            reason: "bad".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("offset 12"));
        assert!(msg.contains("#3"));
    }

    /// A value `levels` deep: `levels - 1` documents wrapped around an int
    fn nested_value(levels: usize) -> Value {
        let mut value = Value::Int(1);
        for _ in 1..levels {
            let mut fields = Fields::new();
            fields.insert(FieldId(1), value);
            value = Value::Document(fields);
        }
        value
    }

    #[test]
    fn test_deepest_readable_nesting_round_trips() {
        let codec = BinaryCodec::default();
        let doc = SaveDocument::new(1).with_field(1, nested_value(MAX_NESTING_DEPTH));
        let blob = codec.encode_blob(&doc, MAGIC).unwrap();
        assert_eq!(codec.decode(&blob, MAGIC).unwrap(), doc);
    }

    #[test]
    fn test_nesting_past_reader_limit_fails_to_encode() {
        let codec = BinaryCodec::default();
        let doc = SaveDocument::new(1).with_field(1, nested_value(MAX_NESTING_DEPTH + 1));
        assert_eq!(
            codec.encode(&doc),
            Err(CodecError::NestingTooDeep {
                field: FieldId(1),
                limit: MAX_NESTING_DEPTH
            })
        );

        let deep = SaveDocument::new(1).with_field(1, nested_value(70));
        assert!(matches!(
            codec.encode_blob(&deep, MAGIC),
            Err(CodecError::NestingTooDeep { .. })
        ));
    }

    #[test]
    fn test_sequences_and_variants_count_toward_nesting() {
        let codec = BinaryCodec::default();
        let mut value = Value::Int(1);
        for level in 1..=MAX_NESTING_DEPTH {
            value = if level % 2 == 0 {
                Value::Sequence(vec![value])
            } else {
                Value::variant(0, value)
            };
        }
        let doc = SaveDocument::new(1).with_field(1, value);
        assert!(matches!(
            codec.encode(&doc),
            Err(CodecError::NestingTooDeep { .. })
        ));
    }

    fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            any::<u64>().prop_map(Value::UInt),
            any::<f64>().prop_map(Value::Float),
            ".{0,24}".prop_map(Value::String),
            proptest::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
        ]
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        arb_scalar().prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                proptest::collection::btree_map(any::<u16>().prop_map(|i| FieldId(i as u32)), inner.clone(), 0..4)
                    .prop_map(Value::Document),
                // Homogeneous: repeat one generated element kind
                (inner.clone(), 0usize..4).prop_map(|(v, n)| Value::Sequence(vec![v; n])),
                (any::<u8>(), inner).prop_map(|(case, v)| Value::variant(case, v)),
            ]
        })
    }

    fn arb_document() -> impl Strategy<Value = SaveDocument> {
        (
            any::<u32>(),
            proptest::collection::btree_map(any::<u32>().prop_map(FieldId), arb_value(), 0..8),
        )
            .prop_map(|(version, fields)| SaveDocument::from_fields(version, fields))
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(doc in arb_document()) {
            let codec = BinaryCodec::default();
            let blob = codec.encode_blob(&doc, MAGIC).unwrap();
            prop_assert_eq!(codec.decode(&blob, MAGIC).unwrap(), doc);
        }

        #[test]
        fn prop_encode_is_deterministic(doc in arb_document()) {
            let codec = BinaryCodec::default();
            prop_assert_eq!(codec.encode(&doc).unwrap(), codec.encode(&doc).unwrap());
        }

        #[test]
        fn prop_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = BinaryCodec::default().decode_payload(1, &bytes);
        }
    }
}
