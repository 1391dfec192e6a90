//! Testing utilities for the persistence layer
//!
//! Crash injection points let tests stop a durable write part-way through and
//! then inspect what a restarted process would find on disk.
//!
//! # Example
//!
//! ```ignore
//! use savestate_durability::testing::CrashPoint;
//!
//! let store = AtomicStore::new(PersistConfig::default());
//! store.arm_crash(CrashPoint::AfterTempSync);
//! assert!(store.write_durable(&path, &bytes).is_err());
//! ```

/// Points inside [`AtomicStore::write_durable`](crate::persist::AtomicStore::write_durable)
/// where a simulated crash can be injected
///
/// A simulated crash returns
/// [`PersistError::SimulatedCrash`](crate::persist::PersistError::SimulatedCrash)
/// and, unlike a real I/O failure, leaves every file exactly as it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrashPoint {
    /// Temp file written, not yet fsynced
    AfterTempWrite,
    /// Temp file fsynced, not yet renamed over the target
    AfterTempSync,
    /// Renamed, parent directory not yet fsynced
    AfterRename,
}

impl CrashPoint {
    /// Get all crash points
    pub fn all() -> Vec<CrashPoint> {
        vec![
            CrashPoint::AfterTempWrite,
            CrashPoint::AfterTempSync,
            CrashPoint::AfterRename,
        ]
    }

    /// Get description of crash point
    pub fn description(&self) -> &'static str {
        match self {
            CrashPoint::AfterTempWrite => "After temp file write, before fsync",
            CrashPoint::AfterTempSync => "After temp file fsync, before rename",
            CrashPoint::AfterRename => "After rename, before directory fsync",
        }
    }

    /// Whether the new bytes are visible at the target path after this crash
    pub fn new_content_visible(&self) -> bool {
        matches!(self, CrashPoint::AfterRename)
    }
}
