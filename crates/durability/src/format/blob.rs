//! Persisted blob format
//!
//! One file per save slot: a fixed 32-byte header followed by the encoded
//! payload.
//!
//! # File Structure
//!
//! ```text
//! +----------------------+ 0
//! | magic                | 4 bytes
//! | format_revision      | u16
//! | flags (reserved, 0)  | u16
//! | schema_version       | u32
//! | payload_len          | u64
//! | payload_checksum     | u64  (XXH3-64 over payload bytes only)
//! | header_crc           | u32  (CRC32 over bytes 0..28)
//! +----------------------+ 32
//! | payload              | payload_len bytes
//! +----------------------+
//! ```
//!
//! All integers are little-endian. The format revision describes this header
//! layout and is independent of the schema version of the payload.

use byteorder::{ByteOrder, LittleEndian};
use xxhash_rust::xxh3::xxh3_64;

/// Current header format revision
pub const FORMAT_REVISION: u16 = 1;

/// Header size in bytes
pub const BLOB_HEADER_SIZE: usize = 32;

/// Default magic marker: "SAVE"
pub const DEFAULT_MAGIC: [u8; 4] = *b"SAVE";

/// Offset of the header CRC (everything before it is covered)
const HEADER_CRC_OFFSET: usize = 28;

/// Blob header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobHeader {
    /// Format family marker
    pub magic: [u8; 4],
    /// Header layout revision
    pub format_revision: u16,
    /// Reserved, always zero in revision 1
    pub flags: u16,
    /// Schema version of the payload
    pub schema_version: u32,
    /// Payload length in bytes
    pub payload_len: u64,
    /// XXH3-64 of the payload bytes
    pub payload_checksum: u64,
}

impl BlobHeader {
    /// Build the header for `payload`
    pub fn for_payload(magic: [u8; 4], schema_version: u32, payload: &[u8]) -> Self {
        BlobHeader {
            magic,
            format_revision: FORMAT_REVISION,
            flags: 0,
            schema_version,
            payload_len: payload.len() as u64,
            payload_checksum: payload_checksum(payload),
        }
    }

    /// Serialize header to bytes, including the trailing header CRC
    pub fn to_bytes(&self) -> [u8; BLOB_HEADER_SIZE] {
        let mut bytes = [0u8; BLOB_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        LittleEndian::write_u16(&mut bytes[4..6], self.format_revision);
        LittleEndian::write_u16(&mut bytes[6..8], self.flags);
        LittleEndian::write_u32(&mut bytes[8..12], self.schema_version);
        LittleEndian::write_u64(&mut bytes[12..20], self.payload_len);
        LittleEndian::write_u64(&mut bytes[20..28], self.payload_checksum);
        let crc = crc32fast::hash(&bytes[..HEADER_CRC_OFFSET]);
        LittleEndian::write_u32(&mut bytes[28..32], crc);
        bytes
    }

    /// Parse and validate a header from the start of `data`
    ///
    /// Checks, in order: length, header CRC, magic, format revision.
    pub fn from_bytes(data: &[u8], expected_magic: [u8; 4]) -> Result<Self, BlobFormatError> {
        if data.len() < BLOB_HEADER_SIZE {
            return Err(BlobFormatError::TooShort {
                needed: BLOB_HEADER_SIZE,
                available: data.len(),
            });
        }

        let stored_crc = LittleEndian::read_u32(&data[HEADER_CRC_OFFSET..BLOB_HEADER_SIZE]);
        let computed_crc = crc32fast::hash(&data[..HEADER_CRC_OFFSET]);
        if stored_crc != computed_crc {
            return Err(BlobFormatError::HeaderCrcMismatch {
                stored: stored_crc,
                computed: computed_crc,
            });
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&data[0..4]);
        if magic != expected_magic {
            return Err(BlobFormatError::BadMagic {
                expected: expected_magic,
                actual: magic,
            });
        }

        let format_revision = LittleEndian::read_u16(&data[4..6]);
        if format_revision > FORMAT_REVISION {
            return Err(BlobFormatError::UnsupportedRevision {
                revision: format_revision,
                max_supported: FORMAT_REVISION,
            });
        }

        Ok(BlobHeader {
            magic,
            format_revision,
            flags: LittleEndian::read_u16(&data[6..8]),
            schema_version: LittleEndian::read_u32(&data[8..12]),
            payload_len: LittleEndian::read_u64(&data[12..20]),
            payload_checksum: LittleEndian::read_u64(&data[20..28]),
        })
    }
}

/// A validated view over a persisted blob
#[derive(Debug, Clone, Copy)]
pub struct PersistedBlob<'a> {
    /// Parsed header
    pub header: BlobHeader,
    /// Payload bytes (checksum verified)
    pub payload: &'a [u8],
}

impl<'a> PersistedBlob<'a> {
    /// Parse a full blob: header, then declared length, then payload checksum
    ///
    /// The payload is only exposed after its checksum validates. Trailing
    /// bytes past the declared payload length are rejected as well.
    pub fn parse(data: &'a [u8], expected_magic: [u8; 4]) -> Result<Self, BlobFormatError> {
        let header = BlobHeader::from_bytes(data, expected_magic)?;
        let body = &data[BLOB_HEADER_SIZE..];
        let declared = header.payload_len;

        if (body.len() as u64) < declared {
            return Err(BlobFormatError::PayloadTruncated {
                declared,
                available: body.len() as u64,
            });
        }
        if (body.len() as u64) > declared {
            return Err(BlobFormatError::TrailingBytes {
                declared,
                actual: body.len() as u64,
            });
        }

        let computed = payload_checksum(body);
        if computed != header.payload_checksum {
            return Err(BlobFormatError::ChecksumMismatch {
                stored: header.payload_checksum,
                computed,
            });
        }

        Ok(PersistedBlob {
            header,
            payload: body,
        })
    }
}

/// Frame `payload` with a header
pub fn seal(magic: [u8; 4], schema_version: u32, payload: &[u8]) -> Vec<u8> {
    let header = BlobHeader::for_payload(magic, schema_version, payload);
    let mut out = Vec::with_capacity(BLOB_HEADER_SIZE + payload.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(payload);
    out
}

/// Payload integrity checksum (XXH3-64)
pub fn payload_checksum(payload: &[u8]) -> u64 {
    xxh3_64(payload)
}

/// Errors that can occur when validating a blob
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlobFormatError {
    /// Fewer bytes than a header
    #[error("Blob too short: need {needed} header bytes, have {available}")]
    TooShort {
        /// Bytes required
        needed: usize,
        /// Bytes available
        available: usize,
    },
    /// Header CRC mismatch
    #[error("Header CRC mismatch: stored={stored:#010x}, computed={computed:#010x}")]
    HeaderCrcMismatch {
        /// Stored CRC
        stored: u32,
        /// Computed CRC
        computed: u32,
    },
    /// Magic marker mismatch
    #[error("Invalid magic bytes: expected {expected:?}, got {actual:?}")]
    BadMagic {
        /// Expected magic
        expected: [u8; 4],
        /// Magic found
        actual: [u8; 4],
    },
    /// Header revision newer than this reader
    #[error("Unsupported format revision {revision}, max supported is {max_supported}")]
    UnsupportedRevision {
        /// Revision found
        revision: u16,
        /// Highest revision understood
        max_supported: u16,
    },
    /// Payload shorter than declared
    #[error("Payload truncated: header declares {declared} bytes, {available} available")]
    PayloadTruncated {
        /// Declared length
        declared: u64,
        /// Available bytes
        available: u64,
    },
    /// Payload longer than declared
    #[error("Trailing bytes: header declares {declared} bytes, found {actual}")]
    TrailingBytes {
        /// Declared length
        declared: u64,
        /// Actual length
        actual: u64,
    },
    /// Payload checksum mismatch
    #[error("Payload checksum mismatch: stored={stored:#018x}, computed={computed:#018x}")]
    ChecksumMismatch {
        /// Stored checksum
        stored: u64,
        /// Computed checksum
        computed: u64,
    },
}
