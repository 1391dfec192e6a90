//! Atomic persistence
//!
//! [`AtomicStore`] replaces a file's contents all-or-nothing using the
//! write-fsync-rename pattern:
//!
//! 1. Write the bytes to a sibling temp file (`<name><temp_suffix>`)
//! 2. fsync the temp file
//! 3. Rename the temp file over the target
//! 4. fsync the parent directory
//!
//! A reader therefore observes either the previous complete contents or the
//! new complete contents, never a mix. Reads validate the blob header and
//! payload checksum before returning anything.

mod error;

pub use error::PersistError;

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::PersistConfig;
use crate::format::blob::{BlobHeader, PersistedBlob, BLOB_HEADER_SIZE};
use crate::testing::CrashPoint;

/// Outcome of a durable write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    /// Target path
    pub path: PathBuf,
    /// Bytes committed
    pub bytes_written: u64,
    /// Whether the parent directory was fsynced
    pub directory_synced: bool,
}

/// All-or-nothing file replacement
#[derive(Debug, Default)]
pub struct AtomicStore {
    config: PersistConfig,
    armed_crash: Mutex<Option<CrashPoint>>,
}

impl AtomicStore {
    /// Create a store
    pub fn new(config: PersistConfig) -> Self {
        AtomicStore {
            config,
            armed_crash: Mutex::new(None),
        }
    }

    /// Configuration in effect
    pub fn config(&self) -> &PersistConfig {
        &self.config
    }

    /// Stop the next write at `point`
    ///
    /// The crash fires once; later writes proceed normally.
    pub fn arm_crash(&self, point: CrashPoint) {
        *self.armed_crash.lock() = Some(point);
    }

    /// Clear an armed crash point
    pub fn disarm_crash(&self) {
        *self.armed_crash.lock() = None;
    }

    fn crash_if_armed(&self, point: CrashPoint, path: &Path) -> Result<(), PersistError> {
        let mut armed = self.armed_crash.lock();
        if *armed == Some(point) {
            *armed = None;
            warn!(target: "savestate::persist", path = %path.display(), ?point, "Simulated crash");
            return Err(PersistError::SimulatedCrash {
                path: path.to_path_buf(),
                point,
            });
        }
        Ok(())
    }

    /// Temp sibling used while writing `path`
    pub fn temp_path_for(&self, path: &Path) -> Option<PathBuf> {
        let mut name: OsString = path.file_name()?.to_os_string();
        name.push(&self.config.temp_suffix);
        Some(path.with_file_name(name))
    }

    /// Replace the contents of `path` with `bytes`
    ///
    /// On success the new contents are durable. On failure the previous
    /// contents (or absence) remain intact and the temp file is removed.
    pub fn write_durable(&self, path: &Path, bytes: &[u8]) -> Result<WriteReceipt, PersistError> {
        let temp_path = self
            .temp_path_for(path)
            .ok_or_else(|| PersistError::PathUnavailable {
                path: path.to_path_buf(),
                reason: "path has no file name".to_string(),
            })?;

        match self.write_and_commit(path, &temp_path, bytes) {
            Ok(receipt) => {
                debug!(
                    target: "savestate::persist",
                    path = %path.display(),
                    bytes = receipt.bytes_written,
                    "Durable write committed"
                );
                Ok(receipt)
            }
            // A crash leaves the disk as-is for the test to inspect
            Err(e @ PersistError::SimulatedCrash { .. }) => Err(e),
            Err(e) => {
                if temp_path.exists() {
                    if let Err(rm) = fs::remove_file(&temp_path) {
                        warn!(
                            target: "savestate::persist",
                            path = %temp_path.display(),
                            error = %rm,
                            "Failed to remove temp file"
                        );
                    }
                }
                warn!(target: "savestate::persist", path = %path.display(), error = %e, "Durable write failed");
                Err(e)
            }
        }
    }

    fn write_and_commit(
        &self,
        path: &Path,
        temp_path: &Path,
        bytes: &[u8],
    ) -> Result<WriteReceipt, PersistError> {
        // Step 1: Write to temporary file
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(temp_path)
            .map_err(|e| PersistError::from_write_io(path, e))?;
        file.write_all(bytes)
            .map_err(|e| PersistError::from_write_io(path, e))?;
        self.crash_if_armed(CrashPoint::AfterTempWrite, path)?;

        // Step 2: fsync the file
        file.sync_all()
            .map_err(|e| PersistError::from_write_io(path, e))?;
        drop(file);
        self.crash_if_armed(CrashPoint::AfterTempSync, path)?;

        // Step 3: Atomic rename
        fs::rename(temp_path, path).map_err(|e| PersistError::from_write_io(path, e))?;
        self.crash_if_armed(CrashPoint::AfterRename, path)?;

        // Step 4: fsync parent directory
        let directory_synced = if self.config.sync_directory {
            let parent = parent_dir(path);
            let dir = File::open(parent).map_err(|e| PersistError::from_write_io(path, e))?;
            dir.sync_all()
                .map_err(|e| PersistError::from_write_io(path, e))?;
            true
        } else {
            false
        };

        Ok(WriteReceipt {
            path: path.to_path_buf(),
            bytes_written: bytes.len() as u64,
            directory_synced,
        })
    }

    /// Read and validate the blob at `path`
    ///
    /// Returns the full blob (header included) once the header CRC, magic,
    /// revision, declared length and payload checksum have all been checked.
    pub fn read_durable(&self, path: &Path) -> Result<Vec<u8>, PersistError> {
        let mut file = File::open(path).map_err(|e| PersistError::from_read_io(path, e))?;
        let file_len = file
            .metadata()
            .map_err(|e| PersistError::from_read_io(path, e))?
            .len();
        let limit = self
            .config
            .max_payload_size
            .saturating_add(BLOB_HEADER_SIZE as u64);
        if file_len > limit {
            return Err(PersistError::CorruptFile {
                path: path.to_path_buf(),
                reason: format!("file of {} bytes exceeds limit of {}", file_len, limit),
            });
        }

        let mut data = Vec::with_capacity(file_len as usize);
        file.read_to_end(&mut data)
            .map_err(|e| PersistError::from_read_io(path, e))?;

        let header = BlobHeader::from_bytes(&data, self.config.magic)
            .map_err(|e| PersistError::from_format(path, e))?;
        if header.payload_len > self.config.max_payload_size {
            return Err(PersistError::CorruptFile {
                path: path.to_path_buf(),
                reason: format!(
                    "declared payload of {} bytes exceeds limit of {}",
                    header.payload_len, self.config.max_payload_size
                ),
            });
        }
        PersistedBlob::parse(&data, self.config.magic)
            .map_err(|e| PersistError::from_format(path, e))?;

        debug!(
            target: "savestate::persist",
            path = %path.display(),
            bytes = data.len(),
            schema_version = header.schema_version,
            "Durable read validated"
        );
        Ok(data)
    }

    /// Read only the header at `path`
    pub fn read_header(&self, path: &Path) -> Result<BlobHeader, PersistError> {
        let file = File::open(path).map_err(|e| PersistError::from_read_io(path, e))?;
        let mut data = Vec::with_capacity(BLOB_HEADER_SIZE);
        file.take(BLOB_HEADER_SIZE as u64)
            .read_to_end(&mut data)
            .map_err(|e| PersistError::from_read_io(path, e))?;
        BlobHeader::from_bytes(&data, self.config.magic)
            .map_err(|e| PersistError::from_format(path, e))
    }

    /// Remove temp files left in `dir` by interrupted writes
    ///
    /// Only `<stem>.<target_extension><temp_suffix>` files are orphans; a
    /// committed file or anything the host keeps alongside is left alone.
    /// Only call this while no write is in flight in `dir`. Returns the
    /// removed paths. A missing directory has nothing to clean.
    pub fn cleanup_orphans(
        &self,
        dir: &Path,
        target_extension: &str,
    ) -> Result<Vec<PathBuf>, PersistError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistError::from_read_io(dir, e)),
        };

        let mut removed = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PersistError::from_read_io(dir, e))?;
            let path = entry.path();
            let is_file = entry
                .file_type()
                .map_err(|e| PersistError::from_read_io(&path, e))?
                .is_file();
            let is_orphan = entry
                .file_name()
                .to_str()
                .is_some_and(|name| self.is_orphan_name(name, target_extension));
            if is_file && is_orphan {
                fs::remove_file(&path).map_err(|e| PersistError::from_write_io(&path, e))?;
                removed.push(path);
            }
        }

        if !removed.is_empty() {
            info!(
                target: "savestate::persist",
                dir = %dir.display(),
                count = removed.len(),
                "Removed orphaned temp files"
            );
        }
        Ok(removed)
    }

    /// Whether `name` is the temp file of some `<stem>.<target_extension>`
    fn is_orphan_name(&self, name: &str, target_extension: &str) -> bool {
        let Some(target) = name.strip_suffix(self.config.temp_suffix.as_str()) else {
            return false;
        };
        match target.rsplit_once('.') {
            Some((stem, ext)) => !stem.is_empty() && ext == target_extension,
            None => false,
        }
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}
