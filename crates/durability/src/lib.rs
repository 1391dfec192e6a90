//! Durability layer for savestate
//!
//! This crate handles everything that touches bytes and disk:
//!
//! - Binary codec: deterministic, self-describing payload encoding
//! - Blob format: magic, format revision, schema version, checksums
//! - Atomic store: all-or-nothing file replacement (write-fsync-rename-fsync)
//! - Orphan cleanup for interrupted writes
//! - Crash injection points for tests

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec; // Payload encoder/decoder and type tags
pub mod config; // PersistConfig and validation
pub mod format; // Blob header layout and validation
pub mod persist; // AtomicStore
pub mod testing; // Crash injection points

pub use codec::{BinaryCodec, CodecError, UnknownTagPolicy};
pub use config::{ConfigError, PersistConfig};
pub use format::{BlobHeader, BLOB_HEADER_SIZE, DEFAULT_MAGIC, FORMAT_REVISION};
pub use persist::{AtomicStore, PersistError, WriteReceipt};
pub use testing::CrashPoint;
