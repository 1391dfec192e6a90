//! Request handles, completions and subscriptions
//!
//! Every save or load request gets a [`RequestHandle`] and produces exactly
//! one [`Completion`], delivered on the owning context by
//! [`Coordinator::pump`](crate::Coordinator::pump) to the handle and to every
//! live [`Subscription`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use savestate_core::SchemaVersion;

use crate::error::PipelineError;

/// Process-unique request identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Kind of request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Snapshot, encode, write
    Save,
    /// Read, decode, migrate, handoff
    Load,
}

/// Outcome of a successful save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    /// Slot written
    pub slot: String,
    /// File written
    pub path: PathBuf,
    /// Version stamped on the file
    pub schema_version: SchemaVersion,
    /// Blob size on disk
    pub bytes_written: u64,
    /// Write attempts, including the first
    pub attempts: u32,
}

/// Outcome of a successful load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Slot read
    pub slot: String,
    /// Version the file was written at
    pub loaded_from_version: SchemaVersion,
    /// Version handed to the application
    pub schema_version: SchemaVersion,
    /// Migration steps applied
    pub steps_applied: usize,
}

impl LoadReport {
    /// Whether the file needed migrating
    pub fn migrated(&self) -> bool {
        self.steps_applied > 0
    }
}

/// Success payload of a completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionDetail {
    /// Save finished
    Saved(SaveReport),
    /// Load finished and was applied
    Loaded(LoadReport),
}

/// Final signal for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Request identifier
    pub id: RequestId,
    /// Slot the request targeted
    pub slot: String,
    /// Save or load
    pub kind: RequestKind,
    /// Outcome
    pub result: Result<CompletionDetail, PipelineError>,
}

impl Completion {
    /// Whether the request succeeded
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Error, if the request failed
    pub fn error(&self) -> Option<&PipelineError> {
        self.result.as_ref().err()
    }

    /// Save report, if this is a successful save
    pub fn save_report(&self) -> Option<&SaveReport> {
        match &self.result {
            Ok(CompletionDetail::Saved(report)) => Some(report),
            _ => None,
        }
    }

    /// Load report, if this is a successful load
    pub fn load_report(&self) -> Option<&LoadReport> {
        match &self.result {
            Ok(CompletionDetail::Loaded(report)) => Some(report),
            _ => None,
        }
    }
}

/// Shared between a handle and the coordinator
#[derive(Default)]
pub(crate) struct RequestState {
    cancelled: AtomicBool,
    finished: Mutex<bool>,
    finished_cond: Condvar,
    completion: Mutex<Option<Completion>>,
}

impl RequestState {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Worker side is done; the completion is queued for the owner
    pub(crate) fn mark_finished(&self) {
        let mut finished = self.finished.lock();
        *finished = true;
        self.finished_cond.notify_all();
    }

    /// Store the delivered completion
    pub(crate) fn deliver(&self, completion: Completion) {
        *self.completion.lock() = Some(completion);
        self.mark_finished();
    }
}

/// Caller's view of an in-flight request
#[derive(Clone)]
pub struct RequestHandle {
    id: RequestId,
    kind: RequestKind,
    slot: String,
    state: Arc<RequestState>,
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("slot", &self.slot)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl RequestHandle {
    pub(crate) fn new(id: RequestId, kind: RequestKind, slot: &str) -> Self {
        RequestHandle {
            id,
            kind,
            slot: slot.to_string(),
            state: Arc::new(RequestState::default()),
        }
    }

    pub(crate) fn state(&self) -> &Arc<RequestState> {
        &self.state
    }

    /// Request identifier
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Save or load
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Target slot
    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Ask the request to stop at the next step boundary
    ///
    /// A write already in progress still completes; the completion then
    /// reports success. A load cancelled before handoff leaves live state
    /// untouched.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    /// Whether off-owner work is done and the completion awaits delivery
    pub fn is_finished(&self) -> bool {
        *self.state.finished.lock()
    }

    /// Block until [`is_finished`](Self::is_finished) or `timeout` elapses
    ///
    /// Returns false on timeout. Giving up never aborts disk work.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        let mut finished = self.state.finished.lock();
        if !*finished {
            self.state
                .finished_cond
                .wait_while_for(&mut finished, |done| !*done, timeout);
        }
        *finished
    }

    /// Completion, once delivered by the owning context
    pub fn completion(&self) -> Option<Completion> {
        self.state.completion.lock().clone()
    }
}

type Listener = Arc<dyn Fn(&Completion) + Send + Sync>;

#[derive(Default)]
struct ListenerTable {
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<u64, Listener>>,
}

/// Registered completion listeners
#[derive(Default, Clone)]
pub struct Listeners {
    table: Arc<ListenerTable>,
}

impl Listeners {
    /// Register `listener`; it stays registered while the subscription lives
    pub fn subscribe(&self, listener: impl Fn(&Completion) + Send + Sync + 'static) -> Subscription {
        let id = self.table.next_id.fetch_add(1, Ordering::Relaxed);
        self.table.listeners.lock().insert(id, Arc::new(listener));
        Subscription {
            id,
            table: Arc::downgrade(&self.table),
        }
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.table.listeners.lock().len()
    }

    /// Whether no listener is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every listener with `completion`
    ///
    /// Listeners are called without the table lock held, so they may
    /// subscribe or drop subscriptions.
    pub fn notify(&self, completion: &Completion) {
        let listeners: Vec<Listener> = self.table.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(completion);
        }
    }
}

/// Registration of a completion listener
///
/// Dropping it deregisters the listener.
#[must_use = "dropping a Subscription deregisters its listener"]
pub struct Subscription {
    id: u64,
    table: Weak<ListenerTable>,
}

impl Subscription {
    /// Deregister now
    pub fn unsubscribe(self) {}
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            table.listeners.lock().remove(&self.id);
        }
    }
}
