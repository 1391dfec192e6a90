//! Save pipeline coordinator
//!
//! Orchestrates the two sequences:
//!
//! - save: snapshot (owner) → encode → durable write (worker)
//! - load: durable read → decode → migrate (worker) → handoff (owner)
//!
//! # Ordering
//!
//! At most one request per slot file is in flight. A request for a busy slot
//! waits in that slot's queue; when the running request finishes, the worker
//! dispatches the next one before posting the finished request's completion
//! to the owner. Two saves to the same slot therefore never share the temp
//! file, and the second write starts only after the first rename.
//!
//! # Ownership
//!
//! The live state is only locked on the owning context: in
//! [`Coordinator::save`] to take the snapshot and in [`Coordinator::pump`]
//! to apply a loaded document. The worker only ever holds the document it is
//! encoding or the bytes it is decoding.

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use savestate_core::{SaveDocument, SchemaRegistry, SchemaVersion};
use savestate_durability::{AtomicStore, BinaryCodec, PersistError};
use tracing::{debug, error, info, warn};

use crate::background::panic_message;
use crate::config::PipelineConfig;
use crate::context::{ExecutionContext, ThreadedContext};
use crate::error::{PipelineError, Stage};
use crate::migration::MigrationEngine;
use crate::paths::{SlotDirectory, StoragePathProvider};
use crate::provider::StateProvider;
use crate::request::{
    Completion, CompletionDetail, Listeners, LoadReport, RequestHandle, RequestId, RequestKind,
    SaveReport, Subscription,
};
use crate::retry::RetryPolicy;

enum Work {
    Save(SaveDocument),
    Load,
}

struct Job {
    handle: RequestHandle,
    path: PathBuf,
    work: Work,
}

enum Finished {
    Saved(SaveReport),
    Loaded(SaveDocument, LoadReport),
}

struct Inner<P> {
    registry: Arc<SchemaRegistry>,
    migrations: MigrationEngine,
    codec: BinaryCodec,
    store: AtomicStore,
    magic: [u8; 4],
    retry: RetryPolicy,
    paths: Box<dyn StoragePathProvider>,
    context: Arc<dyn ExecutionContext>,
    state: Arc<Mutex<P>>,
    /// Busy slot files; the deque holds requests waiting behind the running one
    slots: Mutex<HashMap<PathBuf, VecDeque<Job>>>,
    listeners: Listeners,
    next_id: AtomicU64,
}

/// Runs save and load requests for one application state
///
/// Construct once per process and pass it to whoever needs to save or load.
/// All methods are meant to be called from the owning context. Dropping the
/// coordinator shuts its execution context down after in-flight worker tasks
/// finish; completions not yet pumped are discarded.
pub struct Coordinator<P: StateProvider> {
    inner: Arc<Inner<P>>,
}

/// Builder for [`Coordinator`]
pub struct CoordinatorBuilder {
    registry: Arc<SchemaRegistry>,
    paths: Box<dyn StoragePathProvider>,
    config: PipelineConfig,
    context: Option<Arc<dyn ExecutionContext>>,
}

impl CoordinatorBuilder {
    /// Use `config` instead of the defaults
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Run work on `context` instead of a dedicated worker thread
    pub fn context(mut self, context: Arc<dyn ExecutionContext>) -> Self {
        self.context = Some(context);
        self
    }

    /// Validate the configuration and start the coordinator
    pub fn build<P: StateProvider>(self, state: P) -> Result<Coordinator<P>, PipelineError> {
        self.config.validate()?;
        let persist = self.config.persist_config()?;
        persist
            .validate()
            .map_err(|e| crate::config::ConfigError::Invalid(e.to_string()))?;
        let magic = persist.magic;

        let context: Arc<dyn ExecutionContext> = match self.context {
            Some(context) => context,
            None => Arc::new(ThreadedContext::spawn()?),
        };

        info!(
            target: "savestate::pipeline",
            dir = %self.paths.storage_dir().display(),
            schema_version = self.registry.current_version(),
            "Coordinator started"
        );

        Ok(Coordinator {
            inner: Arc::new(Inner {
                migrations: MigrationEngine::new(Arc::clone(&self.registry)),
                registry: self.registry,
                codec: BinaryCodec::new(self.config.unknown_tags.into()),
                store: AtomicStore::new(persist),
                magic,
                retry: self.config.retry_policy(),
                paths: self.paths,
                context,
                state: Arc::new(Mutex::new(state)),
                slots: Mutex::new(HashMap::new()),
                listeners: Listeners::default(),
                next_id: AtomicU64::new(1),
            }),
        })
    }
}

impl<P: StateProvider> Coordinator<P> {
    /// Start building a coordinator over `registry` and `paths`
    pub fn builder(
        registry: Arc<SchemaRegistry>,
        paths: impl StoragePathProvider + 'static,
    ) -> CoordinatorBuilder {
        CoordinatorBuilder {
            registry,
            paths: Box::new(paths),
            config: PipelineConfig::default(),
            context: None,
        }
    }

    /// Coordinator with slot files under `dir` and a dedicated worker thread
    pub fn open(
        registry: Arc<SchemaRegistry>,
        dir: impl Into<PathBuf>,
        config: PipelineConfig,
        state: P,
    ) -> Result<Self, PipelineError> {
        let paths = SlotDirectory::new(dir).with_extension(config.slot_extension.clone());
        Self::builder(registry, paths).config(config).build(state)
    }

    /// Schema registry in use
    pub fn registry(&self) -> &SchemaRegistry {
        &self.inner.registry
    }

    /// Version stamped on every save
    pub fn current_version(&self) -> SchemaVersion {
        self.inner.registry.current_version()
    }

    /// File backing `slot`
    pub fn slot_path(&self, slot: &str) -> Result<PathBuf, PipelineError> {
        self.inner.paths.slot_path(slot)
    }

    /// Snapshot live state now and write it to `slot` in the background
    ///
    /// Errors returned here mean no request was created: the slot name is
    /// invalid, the snapshot does not fit the current schema, or the worker
    /// is gone. Every other outcome arrives as a [`Completion`].
    pub fn save(&self, slot: &str) -> Result<RequestHandle, PipelineError> {
        let path = self.inner.paths.slot_path(slot)?;
        let document = self.snapshot()?;
        let handle = self.inner.new_handle(RequestKind::Save, slot);
        debug!(
            target: "savestate::pipeline",
            request = %handle.id(),
            slot,
            fields = document.len(),
            "Save requested"
        );
        self.inner.submit(Job {
            handle: handle.clone(),
            path,
            work: Work::Save(document),
        })?;
        Ok(handle)
    }

    /// Read `slot` in the background and apply it on a later [`pump`](Self::pump)
    ///
    /// A failed load never touches live state.
    pub fn load(&self, slot: &str) -> Result<RequestHandle, PipelineError> {
        let path = self.inner.paths.slot_path(slot)?;
        let handle = self.inner.new_handle(RequestKind::Load, slot);
        debug!(target: "savestate::pipeline", request = %handle.id(), slot, "Load requested");
        self.inner.submit(Job {
            handle: handle.clone(),
            path,
            work: Work::Load,
        })?;
        Ok(handle)
    }

    /// Run owner-side work: load handoffs and completion delivery
    ///
    /// Call regularly from the owning context (e.g. once per frame). Returns
    /// the number of tasks run.
    pub fn pump(&self) -> usize {
        self.inner.context.run_owner_tasks()
    }

    /// Register a completion listener, called from [`pump`](Self::pump)
    pub fn subscribe(
        &self,
        listener: impl Fn(&Completion) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.listeners.subscribe(listener)
    }

    /// Delete temp files left behind by interrupted writes
    ///
    /// Only temp files of slot files are touched. Call at startup, before
    /// issuing requests.
    pub fn recover_orphans(&self) -> Result<Vec<PathBuf>, PipelineError> {
        let paths = &self.inner.paths;
        self.inner
            .store
            .cleanup_orphans(paths.storage_dir(), paths.slot_extension())
            .map_err(|source| PipelineError::Storage {
                stage: Stage::Write,
                source,
                attempts: 1,
            })
    }

    /// Number of requests queued or running
    pub fn pending_requests(&self) -> usize {
        self.inner
            .slots
            .lock()
            .values()
            .map(|queue| queue.len() + 1)
            .sum()
    }

    /// Inspect live state from the owning context
    pub fn with_state<R>(&self, f: impl FnOnce(&P) -> R) -> R {
        f(&self.inner.state.lock())
    }

    /// Mutate live state from the owning context
    pub fn with_state_mut<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        f(&mut self.inner.state.lock())
    }

    fn snapshot(&self) -> Result<SaveDocument, PipelineError> {
        let fields = self.inner.state.lock().capture_snapshot();
        let document = SaveDocument::from_fields(self.current_version(), fields);

        let report = self.inner.registry.current_descriptor().conformance(&document);
        if let Some(mismatch) = report.mismatched.first() {
            warn!(
                target: "savestate::pipeline",
                field = %mismatch.field,
                expected = %mismatch.expected,
                actual = %mismatch.actual,
                "Snapshot rejected"
            );
            return Err(PipelineError::SnapshotRejected {
                field: mismatch.field,
                expected: mismatch.expected.to_string(),
                actual: mismatch.actual.to_string(),
            });
        }
        if !report.unknown.is_empty() {
            debug!(
                target: "savestate::pipeline",
                unknown = report.unknown.len(),
                "Snapshot carries undeclared fields"
            );
        }
        Ok(document)
    }
}

impl<P: StateProvider> Drop for Coordinator<P> {
    fn drop(&mut self) {
        self.inner.context.shutdown();
    }
}

impl<P: StateProvider> Inner<P> {
    fn new_handle(&self, kind: RequestKind, slot: &str) -> RequestHandle {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        RequestHandle::new(id, kind, slot)
    }

    /// Dispatch `job` now or queue it behind the request running on its slot
    fn submit(self: &Arc<Self>, job: Job) -> Result<(), PipelineError> {
        let path = job.path.clone();
        {
            let mut slots = self.slots.lock();
            if let Some(waiting) = slots.get_mut(&path) {
                debug!(
                    target: "savestate::pipeline",
                    request = %job.handle.id(),
                    path = %path.display(),
                    queued_behind = waiting.len() + 1,
                    "Slot busy, request queued"
                );
                waiting.push_back(job);
                return Ok(());
            }
            slots.insert(path.clone(), VecDeque::new());
        }

        let inner = Arc::clone(self);
        let result = self
            .context
            .run_on_worker(Box::new(move || inner.run_job(job)));
        if let Err(e) = result {
            // Nothing was dispatched, so nothing will drain this slot's queue
            let waiting = self.slots.lock().remove(&path).unwrap_or_default();
            for job in waiting {
                self.post_completion(&job.handle, Err(PipelineError::WorkerUnavailable));
            }
            return Err(e);
        }
        Ok(())
    }

    /// Dispatch the next queued request for `path`, or mark the slot idle
    fn dispatch_next(self: &Arc<Self>, path: &Path) {
        loop {
            let next = {
                let mut slots = self.slots.lock();
                let Some(waiting) = slots.get_mut(path) else {
                    return;
                };
                match waiting.pop_front() {
                    Some(job) => job,
                    None => {
                        slots.remove(path);
                        return;
                    }
                }
            };

            let handle = next.handle.clone();
            let inner = Arc::clone(self);
            match self
                .context
                .run_on_worker(Box::new(move || inner.run_job(next)))
            {
                Ok(()) => return,
                Err(e) => self.post_completion(&handle, Err(e)),
            }
        }
    }

    fn run_job(self: &Arc<Self>, job: Job) {
        let Job { handle, path, work } = job;
        let stage = Cell::new(match work {
            Work::Save(_) => Stage::Encode,
            Work::Load => Stage::Read,
        });

        let outcome = catch_unwind(AssertUnwindSafe(|| match work {
            Work::Save(document) => self
                .run_save(&handle, &path, document, &stage)
                .map(Finished::Saved),
            Work::Load => self
                .run_load(&handle, &path, &stage)
                .map(|(document, report)| Finished::Loaded(document, report)),
        }))
        .unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            error!(
                target: "savestate::pipeline",
                request = %handle.id(),
                stage = %stage.get(),
                panic = %message,
                "Request panicked"
            );
            Err(PipelineError::WorkerPanicked {
                stage: stage.get(),
                message,
            })
        });

        // The successor starts before the owner hears about this one
        self.dispatch_next(&path);

        match outcome {
            Ok(Finished::Saved(report)) => {
                self.post_completion(&handle, Ok(CompletionDetail::Saved(report)))
            }
            Ok(Finished::Loaded(document, report)) => self.post_handoff(&handle, document, report),
            Err(e) => self.post_completion(&handle, Err(e)),
        }
    }

    fn check_cancelled(&self, handle: &RequestHandle, next: Stage) -> Result<(), PipelineError> {
        if handle.is_cancelled() {
            debug!(
                target: "savestate::pipeline",
                request = %handle.id(),
                stage = %next,
                "Request cancelled"
            );
            return Err(PipelineError::Cancelled { stage: next });
        }
        Ok(())
    }

    fn run_save(
        &self,
        handle: &RequestHandle,
        path: &Path,
        document: SaveDocument,
        stage: &Cell<Stage>,
    ) -> Result<SaveReport, PipelineError> {
        self.check_cancelled(handle, Stage::Encode)?;
        stage.set(Stage::Encode);
        let schema_version = document.schema_version();
        let blob = self
            .codec
            .encode_blob(&document, self.magic)
            .map_err(PipelineError::encode)?;
        drop(document);

        self.check_cancelled(handle, Stage::Write)?;
        stage.set(Stage::Write);
        let (result, attempts) = self.retry.run(
            "write",
            || self.store.write_durable(path, &blob),
            PersistError::is_retryable,
            || !handle.is_cancelled(),
        );
        let receipt = result.map_err(|source| PipelineError::Storage {
            stage: Stage::Write,
            source,
            attempts,
        })?;

        info!(
            target: "savestate::pipeline",
            request = %handle.id(),
            slot = handle.slot(),
            bytes = receipt.bytes_written,
            schema_version,
            "Save complete"
        );
        Ok(SaveReport {
            slot: handle.slot().to_string(),
            path: receipt.path,
            schema_version,
            bytes_written: receipt.bytes_written,
            attempts,
        })
    }

    fn run_load(
        &self,
        handle: &RequestHandle,
        path: &Path,
        stage: &Cell<Stage>,
    ) -> Result<(SaveDocument, LoadReport), PipelineError> {
        self.check_cancelled(handle, Stage::Read)?;
        stage.set(Stage::Read);
        let (result, attempts) = self.retry.run(
            "read",
            || self.store.read_durable(path),
            PersistError::is_retryable,
            || !handle.is_cancelled(),
        );
        let bytes = result.map_err(|source| PipelineError::Storage {
            stage: Stage::Read,
            source,
            attempts,
        })?;

        self.check_cancelled(handle, Stage::Decode)?;
        stage.set(Stage::Decode);
        let document = self
            .codec
            .decode(&bytes, self.magic)
            .map_err(PipelineError::decode)?;
        drop(bytes);

        self.check_cancelled(handle, Stage::Migrate)?;
        stage.set(Stage::Migrate);
        let outcome = self.migrations.migrate(document)?;

        let report = LoadReport {
            slot: handle.slot().to_string(),
            loaded_from_version: outcome.from_version,
            schema_version: outcome.document.schema_version(),
            steps_applied: outcome.steps_applied,
        };
        info!(
            target: "savestate::pipeline",
            request = %handle.id(),
            slot = handle.slot(),
            from_version = report.loaded_from_version,
            schema_version = report.schema_version,
            steps = report.steps_applied,
            "Load decoded"
        );
        Ok((outcome.document, report))
    }

    /// Queue the apply-and-notify task for a decoded load
    fn post_handoff(&self, handle: &RequestHandle, document: SaveDocument, report: LoadReport) {
        let state = Arc::clone(&self.state);
        let listeners = self.listeners.clone();
        let owner_handle = handle.clone();
        self.context.run_on_owner(Box::new(move || {
            // Checked on the owner so a cancel issued before pump still wins
            let result = if owner_handle.is_cancelled() {
                Err(PipelineError::Cancelled {
                    stage: Stage::Handoff,
                })
            } else {
                state.lock().apply_loaded(document);
                Ok(CompletionDetail::Loaded(report))
            };
            deliver(&owner_handle, &listeners, result);
        }));
        handle.state().mark_finished();
    }

    /// Queue completion delivery on the owner
    fn post_completion(
        &self,
        handle: &RequestHandle,
        result: Result<CompletionDetail, PipelineError>,
    ) {
        if let Err(e) = &result {
            warn!(
                target: "savestate::pipeline",
                request = %handle.id(),
                slot = handle.slot(),
                error = %e,
                "Request failed"
            );
        }
        let listeners = self.listeners.clone();
        let owner_handle = handle.clone();
        self.context.run_on_owner(Box::new(move || {
            deliver(&owner_handle, &listeners, result);
        }));
        handle.state().mark_finished();
    }
}

fn deliver(
    handle: &RequestHandle,
    listeners: &Listeners,
    result: Result<CompletionDetail, PipelineError>,
) {
    let completion = Completion {
        id: handle.id(),
        slot: handle.slot().to_string(),
        kind: handle.kind(),
        result,
    };
    handle.state().deliver(completion.clone());
    listeners.notify(&completion);
}
