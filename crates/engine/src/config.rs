//! Pipeline configuration via `savestate.toml`
//!
//! Every key is optional; an empty file yields the defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use savestate_durability::{PersistConfig, UnknownTagPolicy, DEFAULT_MAGIC};

use crate::paths::DEFAULT_SLOT_EXTENSION;
use crate::retry::RetryPolicy;

/// Conventional config file name.
pub const CONFIG_FILE_NAME: &str = "savestate.toml";

/// What to do with wire types this build does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownTags {
    /// Keep them as opaque values and write them back unchanged
    #[default]
    Preserve,
    /// Fail the load
    Reject,
}

impl From<UnknownTags> for UnknownTagPolicy {
    fn from(tags: UnknownTags) -> Self {
        match tags {
            UnknownTags::Preserve => UnknownTagPolicy::Preserve,
            UnknownTags::Reject => UnknownTagPolicy::Reject,
        }
    }
}

/// `[retry]` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts for a storage operation, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound on any delay, in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        RetrySettings {
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
        }
    }
}

/// Pipeline configuration loaded from `savestate.toml`.
///
/// # Example
///
/// ```toml
/// magic = "SAVE"
/// slot_extension = "sav"
/// unknown_tags = "preserve"
/// sync_directory = true
///
/// [retry]
/// max_attempts = 3
/// initial_backoff_ms = 50
/// max_backoff_ms = 1000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Four-byte marker at the start of every save file
    pub magic: String,
    /// Extension of slot files, without the dot
    pub slot_extension: String,
    /// Unknown wire type handling
    pub unknown_tags: UnknownTags,
    /// Fsync the directory after each rename
    pub sync_directory: bool,
    /// Retry of transient storage failures
    pub retry: RetrySettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            magic: String::from_utf8_lossy(&DEFAULT_MAGIC).into_owned(),
            slot_extension: DEFAULT_SLOT_EXTENSION.to_string(),
            unknown_tags: UnknownTags::default(),
            sync_directory: true,
            retry: RetrySettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Contents written for a fresh config file.
    pub fn default_toml() -> &'static str {
        r#"# savestate pipeline configuration

# Four ASCII bytes identifying save files of this application
magic = "SAVE"

# Slot files are <storage dir>/<slot>.<slot_extension>
slot_extension = "sav"

# Wire types unknown to this build: "preserve" (default) or "reject"
unknown_tags = "preserve"

# Fsync the storage directory after every rename (default: true)
sync_directory = true

# Transient storage failures are retried with exponential backoff
[retry]
max_attempts = 3
initial_backoff_ms = 50
max_backoff_ms = 1000
"#
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| ConfigError::Write {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check values the type system can't.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.magic_bytes()?;
        if self.slot_extension.is_empty()
            || self.slot_extension.contains(['/', '\\', '.'])
        {
            return Err(ConfigError::Invalid(format!(
                "slot_extension {:?} must be non-empty and contain no '.' or path separator",
                self.slot_extension
            )));
        }
        let temp_suffix = PersistConfig::default().temp_suffix;
        if format!(".{}", self.slot_extension).ends_with(temp_suffix.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "slot_extension {:?} collides with temp suffix {:?}",
                self.slot_extension, temp_suffix
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::Invalid(format!(
                "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.retry.initial_backoff_ms, self.retry.max_backoff_ms
            )));
        }
        Ok(())
    }

    /// Magic as the 4-byte array written to disk.
    pub fn magic_bytes(&self) -> Result<[u8; 4], ConfigError> {
        <[u8; 4]>::try_from(self.magic.as_bytes()).map_err(|_| {
            ConfigError::Invalid(format!(
                "magic {:?} must be exactly 4 bytes",
                self.magic
            ))
        })
    }

    /// Persistence settings derived from this config.
    pub fn persist_config(&self) -> Result<PersistConfig, ConfigError> {
        Ok(PersistConfig::default()
            .with_magic(self.magic_bytes()?)
            .with_sync_directory(self.sync_directory))
    }

    /// Retry policy derived from this config.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
        }
    }

    /// Set the magic marker.
    pub fn with_magic(mut self, magic: impl Into<String>) -> Self {
        self.magic = magic.into();
        self
    }

    /// Set the slot file extension (without the dot).
    pub fn with_slot_extension(mut self, extension: impl Into<String>) -> Self {
        self.slot_extension = extension.into();
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetrySettings {
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
        };
        self
    }

    /// Set the unknown-tag handling.
    pub fn with_unknown_tags(mut self, tags: UnknownTags) -> Self {
        self.unknown_tags = tags;
        self
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Config file unreadable
    #[error("Failed to read config file '{path}': {reason}")]
    Read {
        /// File path
        path: String,
        /// I/O error text
        reason: String,
    },

    /// Config file unwritable
    #[error("Failed to write config file '{path}': {reason}")]
    Write {
        /// File path
        path: String,
        /// I/O error text
        reason: String,
    },

    /// TOML syntax or type error
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A value is out of range
    #[error("{0}")]
    Invalid(String),
}
