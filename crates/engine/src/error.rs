//! Pipeline error types
//!
//! Lower layers each own an error enum (`SchemaError`, `CodecError`,
//! `PersistError`). [`PipelineError`] wraps them and records the pipeline
//! [`Stage`] that failed so a caller can tell "the file is corrupt" from "the
//! disk is full" from "the data needs a migration we don't have".

use std::fmt;

use savestate_core::{FieldId, MigrationStepError, SchemaError, SchemaVersion};
use savestate_durability::{CodecError, PersistError};
use thiserror::Error;

use crate::config::ConfigError;

/// Step of the save or load sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Capturing live state into a document (owning context)
    Snapshot,
    /// Encoding the document
    Encode,
    /// Durable write
    Write,
    /// Durable read
    Read,
    /// Decoding bytes into a document
    Decode,
    /// Upgrading to the current schema version
    Migrate,
    /// Applying the loaded document to live state (owning context)
    Handoff,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Snapshot => "snapshot",
            Stage::Encode => "encode",
            Stage::Write => "write",
            Stage::Read => "read",
            Stage::Decode => "decode",
            Stage::Migrate => "migrate",
            Stage::Handoff => "handoff",
        };
        f.write_str(name)
    }
}

/// Migration engine errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationError {
    /// The registry cannot produce a chain for the document's version
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A step rejected its input
    #[error("Migration step {from_version} -> {to_version} failed: {diagnostic}")]
    StepFailed {
        /// Version the step started from
        from_version: SchemaVersion,
        /// Version the step was producing
        to_version: SchemaVersion,
        /// Diagnostic reported by the step
        diagnostic: MigrationStepError,
    },
}

impl MigrationError {
    /// Version at which migration stopped, if a step failed
    pub fn failed_version(&self) -> Option<SchemaVersion> {
        match self {
            MigrationError::StepFailed { from_version, .. } => Some(*from_version),
            MigrationError::Schema(_) => None,
        }
    }
}

/// Errors delivered by the save pipeline coordinator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// Snapshot does not fit the current schema
    #[error("Snapshot rejected: field {field} holds {actual}, schema declares {expected}")]
    SnapshotRejected {
        /// First offending field
        field: FieldId,
        /// Declared type
        expected: String,
        /// Kind found
        actual: String,
    },

    /// Encoding or decoding failed
    #[error("{stage} failed: {source}")]
    Codec {
        /// Encode or Decode
        stage: Stage,
        /// Underlying error
        #[source]
        source: CodecError,
    },

    /// Durable read or write failed
    #[error("{stage} failed: {source}")]
    Storage {
        /// Read or Write
        stage: Stage,
        /// Underlying error
        #[source]
        source: PersistError,
        /// Attempts made, including the first
        attempts: u32,
    },

    /// The loaded document could not be upgraded
    #[error("migrate failed: {0}")]
    Migration(#[from] MigrationError),

    /// Request cancelled before `stage` started
    #[error("Cancelled before {stage}")]
    Cancelled {
        /// Stage that was not started
        stage: Stage,
    },

    /// The worker context refused the task
    #[error("Worker context unavailable")]
    WorkerUnavailable,

    /// A task panicked on the worker
    #[error("Worker panicked during {stage}: {message}")]
    WorkerPanicked {
        /// Stage in progress
        stage: Stage,
        /// Panic payload, if it was a string
        message: String,
    },

    /// Slot name cannot be mapped to a path
    #[error("Invalid slot name {slot:?}: {reason}")]
    InvalidSlot {
        /// Offending slot name
        slot: String,
        /// Why it was rejected
        reason: String,
    },

    /// Configuration rejected
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Stage the failure is attributed to, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::SnapshotRejected { .. } => Some(Stage::Snapshot),
            PipelineError::Codec { stage, .. }
            | PipelineError::Storage { stage, .. }
            | PipelineError::Cancelled { stage }
            | PipelineError::WorkerPanicked { stage, .. } => Some(*stage),
            PipelineError::Migration(_) => Some(Stage::Migrate),
            PipelineError::WorkerUnavailable
            | PipelineError::InvalidSlot { .. }
            | PipelineError::Config(_) => None,
        }
    }

    /// Whether resubmitting the request may succeed
    ///
    /// Only transient storage failures qualify. Decode and migration
    /// failures are deterministic for the same bytes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Storage { source, .. } if source.is_retryable())
    }

    /// Whether the request failed because nothing was stored at the slot
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PipelineError::Storage {
                source: PersistError::NotFound { .. },
                ..
            }
        )
    }

    pub(crate) fn encode(source: CodecError) -> Self {
        PipelineError::Codec {
            stage: Stage::Encode,
            source,
        }
    }

    pub(crate) fn decode(source: CodecError) -> Self {
        PipelineError::Codec {
            stage: Stage::Decode,
            source,
        }
    }
}
