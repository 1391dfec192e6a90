//! Save pipeline engine
//!
//! Ties the data model and the durability layer together:
//!
//! - MigrationEngine: walks a registry's migration chain to the current version
//! - Coordinator: save (snapshot → encode → write) and load
//!   (read → decode → migrate → handoff) with per-slot ordering
//! - ExecutionContext: worker/owner switching; ThreadedContext is the default
//! - RequestHandle / Subscription: cancellation, waiting, completion delivery
//! - PipelineConfig: `savestate.toml` settings
//!
//! The engine emits `tracing` events but never installs a subscriber.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod background;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod migration;
pub mod paths;
pub mod provider;
pub mod request;
pub mod retry;

pub use background::{Task, WorkerShutDown, WorkerStats, WorkerThread};
pub use config::{ConfigError, PipelineConfig, RetrySettings, UnknownTags, CONFIG_FILE_NAME};
pub use context::{ExecutionContext, OwnerMailbox, ThreadedContext, WORKER_THREAD_NAME};
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use error::{MigrationError, PipelineError, Stage};
pub use migration::{MigrationEngine, MigrationOutcome};
pub use paths::{validate_slot_name, SlotDirectory, StoragePathProvider, DEFAULT_SLOT_EXTENSION};
pub use provider::StateProvider;
pub use request::{
    Completion, CompletionDetail, Listeners, LoadReport, RequestHandle, RequestId, RequestKind,
    SaveReport, Subscription,
};
pub use retry::RetryPolicy;
