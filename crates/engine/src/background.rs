//! Dedicated worker thread.
//!
//! A single background thread that runs submitted tasks in FIFO order. This
//! is the worker half of the default execution context: encoding, disk I/O
//! and migration run here, never on the owning context.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error};

/// Boxed unit of work
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Error returned when the worker no longer accepts tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("worker thread has shut down")]
pub struct WorkerShutDown;

/// Worker metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    /// Number of tasks waiting in the queue.
    pub queue_depth: usize,
    /// Whether a task is currently executing.
    pub busy: bool,
    /// Total number of tasks completed since the worker started.
    pub tasks_completed: u64,
    /// Number of tasks that panicked.
    pub tasks_panicked: u64,
}

struct WorkerInner {
    queue: Mutex<VecDeque<Task>>,
    work_ready: Condvar,
    drain_cond: Condvar,
    shutdown: AtomicBool,
    active: AtomicUsize,
    tasks_completed: AtomicU64,
    tasks_panicked: AtomicU64,
}

/// A single background thread executing tasks in submission order.
pub struct WorkerThread {
    inner: Arc<WorkerInner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerThread {
    /// Spawn the worker thread.
    ///
    /// The thread is named `name`.
    pub fn spawn(name: &str) -> std::io::Result<Self> {
        let inner = Arc::new(WorkerInner {
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            drain_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_panicked: AtomicU64::new(0),
        });

        let inner_clone = Arc::clone(&inner);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(&inner_clone))?;
        debug!(target: "savestate::worker", name, "Worker thread started");

        Ok(Self {
            inner,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Submit a task.
    ///
    /// Returns `Err(WorkerShutDown)` once [`shutdown`](Self::shutdown) has
    /// been called.
    pub fn submit(&self, work: impl FnOnce() + Send + 'static) -> Result<(), WorkerShutDown> {
        self.submit_boxed(Box::new(work))
    }

    /// Submit an already boxed task.
    pub fn submit_boxed(&self, work: Task) -> Result<(), WorkerShutDown> {
        // Checked under the lock so a task can't slip in after the final drain
        let mut queue = self.inner.queue.lock();
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(WorkerShutDown);
        }
        queue.push_back(work);
        drop(queue);
        self.inner.work_ready.notify_one();
        Ok(())
    }

    /// Block until all queued and in-flight tasks have completed.
    ///
    /// The worker keeps running afterwards.
    pub fn drain(&self) {
        let mut queue = self.inner.queue.lock();
        while !queue.is_empty() || self.inner.active.load(Ordering::Acquire) > 0 {
            self.inner.drain_cond.wait(&mut queue);
        }
    }

    /// Stop accepting tasks, run what is already queued, and join the thread.
    ///
    /// Calling this from a task running on the worker itself only signals
    /// shutdown; the thread exits after the current task returns.
    pub fn shutdown(&self) {
        {
            let _queue = self.inner.queue.lock();
            self.inner.shutdown.store(true, Ordering::Release);
            self.inner.work_ready.notify_all();
        }

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            let _ = handle.join();
            debug!(target: "savestate::worker", "Worker thread stopped");
        }
    }

    /// Whether the worker still accepts tasks.
    pub fn is_running(&self) -> bool {
        !self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Return a snapshot of worker metrics.
    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            queue_depth: self.inner.queue.lock().len(),
            busy: self.inner.active.load(Ordering::Relaxed) > 0,
            tasks_completed: self.inner.tasks_completed.load(Ordering::Relaxed),
            tasks_panicked: self.inner.tasks_panicked.load(Ordering::Relaxed),
        }
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// RAII guard that clears the active flag and notifies drain waiters on drop,
/// including when the task panics.
struct ActiveTaskGuard<'a> {
    inner: &'a WorkerInner,
}

impl Drop for ActiveTaskGuard<'_> {
    fn drop(&mut self) {
        self.inner.active.fetch_sub(1, Ordering::Release);
        self.inner.tasks_completed.fetch_add(1, Ordering::Relaxed);

        let queue = self.inner.queue.lock();
        if queue.is_empty() {
            self.inner.drain_cond.notify_all();
        }
    }
}

fn worker_loop(inner: &WorkerInner) {
    loop {
        let task = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(task) = queue.pop_front() {
                    inner.active.fetch_add(1, Ordering::Release);
                    break task;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        let _guard = ActiveTaskGuard { inner };

        // A panicking task must not take the worker down with it
        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
            inner.tasks_panicked.fetch_add(1, Ordering::Relaxed);
            error!(
                target: "savestate::worker",
                panic = panic_message(e.as_ref()),
                "Worker task panicked"
            );
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "(non-string panic)".to_string()
    }
}
