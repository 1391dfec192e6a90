//! Execution contexts
//!
//! The coordinator never spawns threads or touches live state directly. It
//! asks an [`ExecutionContext`] to run work on the worker side and to run
//! handoff and notification work on the owning side. Hosts with their own
//! job system implement the trait; [`ThreadedContext`] is the default: one
//! dedicated worker thread plus an [`OwnerMailbox`] drained by the owner.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::warn;

use crate::background::{Task, WorkerThread};
use crate::error::PipelineError;

/// Name of the default worker thread
pub const WORKER_THREAD_NAME: &str = "savestate-worker";

/// Switches work between the owning context and a worker context
///
/// The coordinator makes no assumption about how many workers back
/// `run_on_worker`; per-slot ordering is enforced by the coordinator itself.
pub trait ExecutionContext: Send + Sync {
    /// Run `task` off the owning context
    fn run_on_worker(&self, task: Task) -> Result<(), PipelineError>;

    /// Run `task` on the owning context
    fn run_on_owner(&self, task: Task);

    /// Run owner tasks queued so far, from the owning context
    ///
    /// Returns the number of tasks run. Contexts whose owner side is driven
    /// by the host return 0.
    fn run_owner_tasks(&self) -> usize {
        0
    }

    /// Stop accepting work and release queued tasks
    fn shutdown(&self) {}
}

/// Queue of tasks waiting to run on the owning context
#[derive(Default)]
pub struct OwnerMailbox {
    tasks: Mutex<VecDeque<Task>>,
}

impl OwnerMailbox {
    /// Create an empty mailbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task
    pub fn post(&self, task: Task) {
        self.tasks.lock().push_back(task);
    }

    /// Number of queued tasks
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Whether no task is queued
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Run queued tasks in posting order
    ///
    /// Tasks posted while draining run in the same call. The lock is not
    /// held while a task runs.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.tasks.lock().pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Drop queued tasks without running them
    pub fn clear(&self) -> usize {
        let dropped: Vec<Task> = self.tasks.lock().drain(..).collect();
        dropped.len()
    }
}

/// One dedicated worker thread plus an owner mailbox
pub struct ThreadedContext {
    worker: WorkerThread,
    mailbox: OwnerMailbox,
}

impl ThreadedContext {
    /// Spawn the worker thread
    pub fn spawn() -> Result<Self, PipelineError> {
        let worker = WorkerThread::spawn(WORKER_THREAD_NAME).map_err(|e| {
            warn!(target: "savestate::worker", error = %e, "Failed to spawn worker thread");
            PipelineError::WorkerUnavailable
        })?;
        Ok(ThreadedContext {
            worker,
            mailbox: OwnerMailbox::new(),
        })
    }

    /// Block until the worker is idle
    pub fn drain_worker(&self) {
        self.worker.drain();
    }

    /// Worker handle
    pub fn worker(&self) -> &WorkerThread {
        &self.worker
    }

    /// Owner mailbox
    pub fn mailbox(&self) -> &OwnerMailbox {
        &self.mailbox
    }
}

impl ExecutionContext for ThreadedContext {
    fn run_on_worker(&self, task: Task) -> Result<(), PipelineError> {
        self.worker
            .submit_boxed(task)
            .map_err(|_| PipelineError::WorkerUnavailable)
    }

    fn run_on_owner(&self, task: Task) {
        self.mailbox.post(task);
    }

    fn run_owner_tasks(&self) -> usize {
        self.mailbox.drain()
    }

    fn shutdown(&self) {
        self.worker.shutdown();
        let dropped = self.mailbox.clear();
        if dropped > 0 {
            warn!(
                target: "savestate::worker",
                dropped,
                "Owner tasks dropped at shutdown"
            );
        }
    }
}
