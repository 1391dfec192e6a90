//! Savestate - versioned, crash-safe save/load pipeline
//!
//! Savestate captures application state as a typed field map, encodes it to a
//! compact self-describing binary payload, and writes it to disk so that a
//! crash at any moment leaves either the old file or the new one, never a mix.
//! Files written by older builds are migrated forward one version at a time
//! before they reach the application.
//!
//! # Quick Start
//!
//! ```ignore
//! use savestate::{Coordinator, PipelineConfig, SchemaRegistry, StateProvider};
//!
//! let coordinator = Coordinator::open(registry, "saves/", PipelineConfig::default(), game)?;
//! coordinator.recover_orphans()?;
//!
//! let handle = coordinator.save("slot1")?;
//! // ... once per frame:
//! coordinator.pump();
//! ```
//!
//! # Architecture
//!
//! - `savestate-core`: values, documents, schema registry, migration steps
//! - `savestate-durability`: binary codec, blob header, atomic file store
//! - `savestate-engine`: migration engine, worker thread, save pipeline coordinator

pub use savestate_core::{
    AddField, FieldId, FieldType, Fields, FnStep, MigrationStep, RenameField, RetireField,
    SaveDocument, SchemaDescriptor, SchemaRegistry, SchemaVersion, TransformField, Value,
};
pub use savestate_durability::{
    AtomicStore, BinaryCodec, CodecError, CrashPoint, PersistConfig, PersistError, UnknownTagPolicy,
};
pub use savestate_engine::{
    Completion, Coordinator, MigrationEngine, MigrationError, PipelineConfig, PipelineError,
    RequestHandle, RetryPolicy, SlotDirectory, Stage, StateProvider, Subscription,
};
