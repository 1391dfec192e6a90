//! Storage path resolution
//!
//! Maps logical save slots to files. The pipeline never discovers or creates
//! the storage directory; the host hands one in.

use std::path::{Path, PathBuf};

use crate::error::PipelineError;

/// Default save file extension
pub const DEFAULT_SLOT_EXTENSION: &str = "sav";

/// Provides a stable, writable directory and the file for each slot
pub trait StoragePathProvider: Send + Sync {
    /// Directory holding every slot file
    fn storage_dir(&self) -> &Path;

    /// File backing `slot`
    fn slot_path(&self, slot: &str) -> Result<PathBuf, PipelineError>;

    /// Extension (without the dot) shared by every slot file
    fn slot_extension(&self) -> &str;
}

/// One file per slot: `<root>/<slot>.<ext>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotDirectory {
    root: PathBuf,
    extension: String,
}

impl SlotDirectory {
    /// Slots under `root` with the default extension
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SlotDirectory {
            root: root.into(),
            extension: DEFAULT_SLOT_EXTENSION.to_string(),
        }
    }

    /// Use `extension` (without the dot)
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Extension in use
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

/// Check a slot name can be used as a file stem
pub fn validate_slot_name(slot: &str) -> Result<(), PipelineError> {
    let reject = |reason: &str| {
        Err(PipelineError::InvalidSlot {
            slot: slot.to_string(),
            reason: reason.to_string(),
        })
    };
    if slot.is_empty() {
        return reject("empty");
    }
    if slot.contains(['/', '\\']) {
        return reject("contains a path separator");
    }
    if slot == "." || slot == ".." {
        return reject("reserved name");
    }
    if slot.chars().any(char::is_control) {
        return reject("contains a control character");
    }
    Ok(())
}

impl StoragePathProvider for SlotDirectory {
    fn storage_dir(&self) -> &Path {
        &self.root
    }

    fn slot_path(&self, slot: &str) -> Result<PathBuf, PipelineError> {
        validate_slot_name(slot)?;
        Ok(self.root.join(format!("{}.{}", slot, self.extension)))
    }

    fn slot_extension(&self) -> &str {
        &self.extension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_path() {
        let dir = SlotDirectory::new("/saves");
        assert_eq!(
            dir.slot_path("slot1").unwrap(),
            PathBuf::from("/saves/slot1.sav")
        );
        assert_eq!(dir.storage_dir(), Path::new("/saves"));

        let dir = dir.with_extension("dat");
        assert_eq!(
            dir.slot_path("autosave").unwrap(),
            PathBuf::from("/saves/autosave.dat")
        );
    }

    #[test]
    fn test_invalid_slot_names() {
        let dir = SlotDirectory::new("/saves");
        for bad in ["", "a/b", "a\\b", "..", ".", "x\ny"] {
            assert!(
                matches!(dir.slot_path(bad), Err(PipelineError::InvalidSlot { .. })),
                "{bad:?} should be rejected"
            );
        }
    }
}
