//! Persistence configuration
//!
//! Controls how the atomic store frames and commits blobs.

use crate::format::blob::DEFAULT_MAGIC;

/// Default upper bound on an accepted payload (256 MiB)
pub const DEFAULT_MAX_PAYLOAD_SIZE: u64 = 256 * 1024 * 1024;

/// Persistence configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistConfig {
    /// Magic marker expected at the start of every blob
    pub magic: [u8; 4],
    /// Suffix appended to the target file name for the temporary sibling
    pub temp_suffix: String,
    /// Fsync the parent directory after rename
    pub sync_directory: bool,
    /// Largest payload a read will accept
    pub max_payload_size: u64,
}

impl Default for PersistConfig {
    fn default() -> Self {
        PersistConfig {
            magic: DEFAULT_MAGIC,
            temp_suffix: ".tmp".to_string(),
            sync_directory: true,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

impl PersistConfig {
    /// Set the magic marker
    pub fn with_magic(mut self, magic: [u8; 4]) -> Self {
        self.magic = magic;
        self
    }

    /// Set the temp file suffix
    pub fn with_temp_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.temp_suffix = suffix.into();
        self
    }

    /// Enable or disable the parent directory fsync
    pub fn with_sync_directory(mut self, sync: bool) -> Self {
        self.sync_directory = sync;
        self
    }

    /// Set the maximum payload size
    pub fn with_max_payload_size(mut self, size: u64) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.temp_suffix.is_empty() {
            return Err(ConfigError::EmptyTempSuffix);
        }
        if self.temp_suffix.contains(['/', '\\']) {
            return Err(ConfigError::InvalidTempSuffix(self.temp_suffix.clone()));
        }
        if self.max_payload_size == 0 {
            return Err(ConfigError::ZeroPayloadLimit);
        }
        if self.magic.iter().all(|b| *b == 0) {
            return Err(ConfigError::ZeroMagic);
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Temp suffix is empty, so the temp file would be the target itself
    #[error("Temp suffix must not be empty")]
    EmptyTempSuffix,

    /// Temp suffix contains a path separator
    #[error("Invalid temp suffix: {0:?}")]
    InvalidTempSuffix(String),

    /// Payload limit is zero
    #[error("Max payload size must be greater than zero")]
    ZeroPayloadLimit,

    /// Magic is all zero bytes
    #[error("Magic marker must not be all zero")]
    ZeroMagic,
}
