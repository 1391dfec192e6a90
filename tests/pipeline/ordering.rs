//! Per-slot ordering and completion delivery.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use savestate_engine::{ExecutionContext, OwnerMailbox, SlotDirectory, Task};

use crate::common::*;

/// Runs every worker task on a thread of its own
///
/// Before a task runs, records its start index, the level held by the
/// watched slot file and whether that file's temp sibling exists.
struct ThreadPerTask {
    watch: PathBuf,
    started: AtomicUsize,
    observed: Arc<Mutex<Vec<(usize, Option<i64>, bool)>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    mailbox: OwnerMailbox,
}

impl ThreadPerTask {
    fn new(watch: PathBuf) -> Self {
        ThreadPerTask {
            watch,
            started: AtomicUsize::new(0),
            observed: Arc::new(Mutex::new(Vec::new())),
            threads: Mutex::new(Vec::new()),
            mailbox: OwnerMailbox::new(),
        }
    }

    fn join(&self) {
        let threads: Vec<JoinHandle<()>> = self.threads.lock().drain(..).collect();
        for t in threads {
            t.join().unwrap();
        }
    }
}

impl ExecutionContext for ThreadPerTask {
    fn run_on_worker(&self, task: Task) -> Result<(), PipelineError> {
        let index = self.started.fetch_add(1, Ordering::SeqCst);
        let watch = self.watch.clone();
        let observed = Arc::clone(&self.observed);
        let t = thread::spawn(move || {
            let level = watch
                .exists()
                .then(|| read_document(&watch).get(LEVEL).and_then(Value::as_int))
                .flatten();
            let mut temp = watch.clone().into_os_string();
            temp.push(".tmp");
            observed
                .lock()
                .push((index, level, PathBuf::from(temp).exists()));
            // Widen the window in which an overlapping write would show
            thread::sleep(Duration::from_millis(30));
            task();
        });
        self.threads.lock().push(t);
        Ok(())
    }

    fn run_on_owner(&self, task: Task) {
        self.mailbox.post(task);
    }

    fn run_owner_tasks(&self) -> usize {
        self.mailbox.drain()
    }
}

#[test]
fn next_write_on_a_slot_starts_after_the_previous_rename() {
    let dir = TempDir::new().unwrap();
    let slot_file = dir.path().join("slot1.sav");
    let context = Arc::new(ThreadPerTask::new(slot_file.clone()));

    let c = Coordinator::<Player>::builder(registry(), SlotDirectory::new(dir.path()))
        .config(PipelineConfig::default().with_retry(RetryPolicy::none()))
        .context(Arc::clone(&context) as Arc<dyn ExecutionContext>)
        .build(Player::new(1, 10))
        .unwrap();

    let mut handles = Vec::new();
    for level in 1..=3 {
        c.with_state_mut(|p| p.level = level);
        handles.push(c.save("slot1").unwrap());
    }
    for handle in &handles {
        assert!(handle.wait_finished(WAIT));
    }
    context.join();
    c.pump();

    for handle in &handles {
        assert!(handle.completion().unwrap().is_success());
    }
    // Each write started only once its predecessor's file had been renamed
    // into place, and no temp file was lying around at that moment
    assert_eq!(
        *context.observed.lock(),
        vec![(0, None, false), (1, Some(1), false), (2, Some(2), false)]
    );
    assert_eq!(read_document(&slot_file).get(LEVEL), Some(&Value::Int(3)));
}

#[test]
fn sequential_saves_to_one_slot_keep_the_last() {
    let dir = TempDir::new().unwrap();
    let c = open(dir.path(), Player::new(1, 10));

    let order = Arc::new(Mutex::new(Vec::new()));
    let o = Arc::clone(&order);
    let _sub = c.subscribe(move |completion: &Completion| {
        o.lock().push(completion.id);
    });

    let first = c.save("slot1").unwrap();
    c.with_state_mut(|p| {
        p.level = 2;
        p.experience = 20;
    });
    let second = c.save("slot1").unwrap();

    assert!(first.wait_finished(WAIT));
    assert!(second.wait_finished(WAIT));
    c.pump();

    assert!(first.completion().unwrap().is_success());
    assert!(second.completion().unwrap().is_success());
    assert_eq!(*order.lock(), vec![first.id(), second.id()]);

    let doc = read_document(&dir.path().join("slot1.sav"));
    assert_eq!(doc.get(LEVEL), Some(&Value::Int(2)));
    assert_eq!(doc.get(EXPERIENCE), Some(&Value::Int(20)));
    assert_eq!(c.pending_requests(), 0);
}

#[test]
fn load_queued_behind_save_sees_the_save() {
    let dir = TempDir::new().unwrap();
    let c = open(dir.path(), Player::new(6, 60));

    let save = c.save("slot1").unwrap();
    c.with_state_mut(|p| p.level = 0);
    let load = c.load("slot1").unwrap();

    assert!(save.wait_finished(WAIT));
    assert!(load.wait_finished(WAIT));
    c.pump();

    assert!(load.completion().unwrap().is_success());
    c.with_state(|p| assert_eq!(p.level, 6));
}

#[test]
fn different_slots_are_independent() {
    let dir = TempDir::new().unwrap();
    let c = open(dir.path(), Player::new(1, 1));

    let a = c.save("alpha").unwrap();
    c.with_state_mut(|p| p.level = 2);
    let b = c.save("beta").unwrap();

    assert!(finish(&c, &a).is_success());
    assert!(finish(&c, &b).is_success());

    assert_eq!(
        read_document(&dir.path().join("alpha.sav")).get(LEVEL),
        Some(&Value::Int(1))
    );
    assert_eq!(
        read_document(&dir.path().join("beta.sav")).get(LEVEL),
        Some(&Value::Int(2))
    );
}

#[test]
fn missing_slot_load_leaves_state_unchanged() {
    let dir = TempDir::new().unwrap();
    let c = open(dir.path(), Player::new(7, 70));
    let before = c.with_state(Player::clone);

    let completion = finish(&c, &c.load("nothing-here").unwrap());

    let err = completion.error().expect("load fails");
    assert!(err.is_not_found());
    assert!(matches!(
        err,
        PipelineError::Storage {
            stage: Stage::Read,
            source: PersistError::NotFound { .. },
            ..
        }
    ));
    c.with_state(|p| assert_eq!(*p, before));
}

#[test]
fn every_request_completes_exactly_once() {
    let dir = TempDir::new().unwrap();
    let c = open(dir.path(), Player::new(1, 1));

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let d = Arc::clone(&delivered);
    let _sub = c.subscribe(move |completion: &Completion| {
        d.lock().push(completion.id);
    });

    let handles: Vec<RequestHandle> = (0..6)
        .map(|i| {
            if i % 2 == 0 {
                c.save("slot1").unwrap()
            } else {
                c.load("slot1").unwrap()
            }
        })
        .collect();
    for handle in &handles {
        assert!(handle.wait_finished(WAIT));
    }
    c.pump();
    c.pump();

    let ids: Vec<_> = handles.iter().map(RequestHandle::id).collect();
    assert_eq!(*delivered.lock(), ids);
    assert!(handles.iter().all(|h| h.completion().is_some()));
}

#[test]
fn dropped_subscription_receives_nothing() {
    let dir = TempDir::new().unwrap();
    let c = open(dir.path(), Player::new(1, 1));

    let count = Arc::new(Mutex::new(0usize));
    let n = Arc::clone(&count);
    let sub = c.subscribe(move |_: &Completion| *n.lock() += 1);
    finish(&c, &c.save("slot1").unwrap());
    drop(sub);
    finish(&c, &c.save("slot1").unwrap());

    assert_eq!(*count.lock(), 1);
}
