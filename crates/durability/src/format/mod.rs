//! On-disk byte formats.
//!
//! This module centralizes the framing of persisted save files. Keeping the
//! header format separate from the payload codec lets the two evolve
//! independently: the header's format revision changes rarely, the payload's
//! schema version changes with every release that touches saved state.
//!
//! # Module Structure
//!
//! - `blob`: header layout, sealing and validation of a persisted blob

pub mod blob;

pub use blob::{
    payload_checksum, seal, BlobFormatError, BlobHeader, PersistedBlob, BLOB_HEADER_SIZE,
    DEFAULT_MAGIC, FORMAT_REVISION,
};
