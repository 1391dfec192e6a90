//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use savestate_core::{
    AddField, FieldId, FieldType, Fields, SaveDocument, SchemaDescriptor, SchemaRegistry, Value,
};
pub use savestate_durability::{
    AtomicStore, BinaryCodec, CrashPoint, PersistConfig, PersistError, DEFAULT_MAGIC,
};
pub use savestate_engine::{
    Completion, Coordinator, PipelineConfig, PipelineError, RequestHandle, RetryPolicy, Stage,
    StateProvider,
};
pub use tempfile::TempDir;

pub const LEVEL: u32 = 1;
pub const EXPERIENCE: u32 = 2;
pub const UNLOCKED: u32 = 3;

pub const WAIT: Duration = Duration::from_secs(10);

// ============================================================================
// Player - a small application state
// ============================================================================

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Player {
    pub level: i64,
    pub experience: i64,
    pub unlocked: Vec<String>,
    pub loads: usize,
}

impl Player {
    pub fn new(level: i64, experience: i64) -> Self {
        Player {
            level,
            experience,
            ..Default::default()
        }
    }
}

impl StateProvider for Player {
    fn capture_snapshot(&mut self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(FieldId(LEVEL), Value::Int(self.level));
        fields.insert(FieldId(EXPERIENCE), Value::Int(self.experience));
        fields.insert(
            FieldId(UNLOCKED),
            Value::Sequence(self.unlocked.iter().map(|s| Value::from(s.as_str())).collect()),
        );
        fields
    }

    fn apply_loaded(&mut self, document: SaveDocument) {
        self.level = document.get(LEVEL).and_then(Value::as_int).unwrap_or(0);
        self.experience = document.get(EXPERIENCE).and_then(Value::as_int).unwrap_or(0);
        self.unlocked = document
            .get(UNLOCKED)
            .and_then(Value::as_sequence)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        self.loads += 1;
    }
}

// ============================================================================
// Schema
// ============================================================================

/// v1 {level, experience} → v2 adds unlockedItems (empty sequence)
pub fn registry() -> Arc<SchemaRegistry> {
    let v1 = SchemaDescriptor::new(1)
        .field(LEVEL, "level", FieldType::Int, 1i64)
        .field(EXPERIENCE, "experience", FieldType::Int, 0i64);
    let v2 = SchemaDescriptor::new(2)
        .field(LEVEL, "level", FieldType::Int, 1i64)
        .field(EXPERIENCE, "experience", FieldType::Int, 0i64)
        .field(
            UNLOCKED,
            "unlockedItems",
            FieldType::sequence_of(FieldType::String),
            Value::empty_sequence(),
        );
    Arc::new(
        SchemaRegistry::builder()
            .version(v1)
            .version(v2)
            .step(AddField::new(1, UNLOCKED, Value::empty_sequence()))
            .build()
            .unwrap(),
    )
}

// ============================================================================
// Pipeline helpers
// ============================================================================

pub fn open(dir: &Path, player: Player) -> Coordinator<Player> {
    let config = PipelineConfig::default().with_retry(RetryPolicy::none());
    Coordinator::open(registry(), dir, config, player).unwrap()
}

/// Wait for off-owner work, pump once, return the delivered completion.
pub fn finish(coordinator: &Coordinator<Player>, handle: &RequestHandle) -> Completion {
    assert!(handle.wait_finished(WAIT), "request {} did not finish", handle.id());
    coordinator.pump();
    handle.completion().expect("completion delivered")
}

pub fn store() -> AtomicStore {
    AtomicStore::new(PersistConfig::default())
}

/// Write `document` straight to `path`, bypassing the coordinator.
pub fn write_document(path: &Path, document: &SaveDocument) {
    let blob = BinaryCodec::default()
        .encode_blob(document, DEFAULT_MAGIC)
        .unwrap();
    store().write_durable(path, &blob).unwrap();
}

pub fn read_document(path: &Path) -> SaveDocument {
    let bytes = store().read_durable(path).unwrap();
    BinaryCodec::default().decode(&bytes, DEFAULT_MAGIC).unwrap()
}

// ============================================================================
// File manipulation
// ============================================================================

pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

pub fn corrupt_file_at_offset(path: &Path, offset: u64, bytes: &[u8]) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
}

pub fn flip_byte(path: &Path, offset: u64) {
    let original = fs::read(path).unwrap()[offset as usize];
    corrupt_file_at_offset(path, offset, &[original ^ 0xFF]);
}

pub fn truncate_file(path: &Path, len: u64) {
    let file = OpenOptions::new().write(true).open(path).unwrap();
    file.set_len(len).unwrap();
}

pub fn list_dir(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    entries.sort();
    entries
}
