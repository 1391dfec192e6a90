//! Persistence errors

use std::io;
use std::path::{Path, PathBuf};

use crate::format::blob::BlobFormatError;
use crate::testing::CrashPoint;

/// Errors from the atomic store
///
/// Every variant names the path it concerns. Errors are plain data so they
/// can be cloned into completion notifications.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistError {
    /// Nothing is stored at the path
    #[error("No data at {}", .path.display())]
    NotFound {
        /// Requested path
        path: PathBuf,
    },

    /// Stored bytes fail integrity checks
    #[error("Corrupt file {}: {reason}", .path.display())]
    CorruptFile {
        /// Offending file
        path: PathBuf,
        /// What failed
        reason: String,
    },

    /// Stored blob was written by a newer format revision
    #[error("Unsupported format revision {revision} in {} (max {max_supported})", .path.display())]
    UnsupportedFormatRevision {
        /// Offending file
        path: PathBuf,
        /// Revision found
        revision: u16,
        /// Highest revision understood
        max_supported: u16,
    },

    /// Out of space while writing
    #[error("Disk full writing {}", .path.display())]
    DiskFull {
        /// Target path
        path: PathBuf,
    },

    /// Permission denied or read-only filesystem
    #[error("Permission denied for {}", .path.display())]
    PermissionDenied {
        /// Target path
        path: PathBuf,
    },

    /// Path unusable for another reason (missing directory, transient I/O)
    #[error("Path unavailable {}: {reason}", .path.display())]
    PathUnavailable {
        /// Target path
        path: PathBuf,
        /// Underlying error text
        reason: String,
    },

    /// Injected crash (tests only)
    #[error("Simulated crash at {point:?} writing {}", .path.display())]
    SimulatedCrash {
        /// Target path
        path: PathBuf,
        /// Where the write stopped
        point: CrashPoint,
    },
}

impl PersistError {
    /// Path this error concerns
    pub fn path(&self) -> &Path {
        match self {
            PersistError::NotFound { path }
            | PersistError::CorruptFile { path, .. }
            | PersistError::UnsupportedFormatRevision { path, .. }
            | PersistError::DiskFull { path }
            | PersistError::PermissionDenied { path }
            | PersistError::PathUnavailable { path, .. }
            | PersistError::SimulatedCrash { path, .. } => path,
        }
    }

    /// Whether retrying the same operation may succeed
    ///
    /// Only [`PersistError::PathUnavailable`] is transient. Disk full,
    /// permission and integrity failures will not resolve on their own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PersistError::PathUnavailable { .. })
    }

    /// Classify an I/O error raised while writing
    pub(crate) fn from_write_io(path: &Path, e: io::Error) -> Self {
        let path = path.to_path_buf();
        match e.kind() {
            io::ErrorKind::StorageFull => PersistError::DiskFull { path },
            io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem => {
                PersistError::PermissionDenied { path }
            }
            _ => PersistError::PathUnavailable {
                path,
                reason: e.to_string(),
            },
        }
    }

    /// Classify an I/O error raised while reading
    pub(crate) fn from_read_io(path: &Path, e: io::Error) -> Self {
        let path = path.to_path_buf();
        match e.kind() {
            io::ErrorKind::NotFound => PersistError::NotFound { path },
            io::ErrorKind::PermissionDenied => PersistError::PermissionDenied { path },
            _ => PersistError::PathUnavailable {
                path,
                reason: e.to_string(),
            },
        }
    }

    /// Classify a blob validation failure
    pub(crate) fn from_format(path: &Path, e: BlobFormatError) -> Self {
        let path = path.to_path_buf();
        match e {
            BlobFormatError::UnsupportedRevision {
                revision,
                max_supported,
            } => PersistError::UnsupportedFormatRevision {
                path,
                revision,
                max_supported,
            },
            other => PersistError::CorruptFile {
                path,
                reason: other.to_string(),
            },
        }
    }
}
