//! Fixed-size worker pool.
//!
//! One pool is created per device and shared by every queue on it. Workers
//! park on a condition variable over a single task queue. Two kinds of work
//! are posted: single tasks (`enqueue`, used for whole command buffers and
//! cleanup work) and slice ranges (`enqueue_range`, used only for ND-range
//! fan-out, where `slice_count` instances of one task share a completion
//! counter).
//!
//! Tasks do not return errors to the pool. A task that fails records the
//! failure in its own output location (fence, command result); the pool
//! always decrements its counters and never fails itself.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::latch::WorkCounter;

struct Task {
    run: Box<dyn FnOnce() + Send + 'static>,
    done: Option<Arc<WorkCounter>>,
}

impl Task {
    fn execute(self, outstanding: &WorkCounter) {
        // Counters are decremented even if the task unwinds.
        struct Completion<'a> {
            done: Option<Arc<WorkCounter>>,
            outstanding: &'a WorkCounter,
        }
        impl Drop for Completion<'_> {
            fn drop(&mut self) {
                if let Some(done) = self.done.take() {
                    done.complete_one();
                }
                self.outstanding.complete_one();
            }
        }

        let _completion = Completion { done: self.done, outstanding };
        (self.run)();
    }
}

struct PoolState {
    queue: VecDeque<Task>,
    shutdown: bool,
}

struct PoolShared {
    state: Mutex<PoolState>,
    available: Condvar,
    /// Tasks posted but not yet finished, pool-wide.
    outstanding: WorkCounter,
}

pub struct ThreadPool {
    shared: Arc<PoolShared>,
    /// Command-buffer groups accepted but not yet completed. Incremented at
    /// dispatch (parked buffers count), decremented by the completion path.
    groups: WorkCounter,
    workers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("workers", &self.workers.len())
            .field("outstanding", &self.shared.outstanding.value())
            .field("groups", &self.groups.value())
            .finish()
    }
}

fn worker_loop(shared: Arc<PoolShared>, index: usize) {
    trace!(worker.index = index, "pool worker started");
    loop {
        let task = {
            let mut state = shared.state.lock();
            loop {
                if let Some(task) = state.queue.pop_front() {
                    break task;
                }
                if state.shutdown {
                    trace!(worker.index = index, "pool worker exiting");
                    return;
                }
                shared.available.wait(&mut state);
            }
        };
        task.execute(&shared.outstanding);
    }
}

impl ThreadPool {
    /// Spawn a pool of `worker_count` OS threads (at least one).
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState { queue: VecDeque::new(), shutdown: false }),
            available: Condvar::new(),
            outstanding: WorkCounter::new(),
        });

        let workers = (0..worker_count)
            .map(|index| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("veles-worker-{index}"))
                    .spawn(move || worker_loop(shared, index))
                    .expect("failed to spawn pool worker")
            })
            .collect();

        Self { shared, groups: WorkCounter::new(), workers }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Post one task. If `done` is given it is incremented now and marked
    /// complete when the task finishes.
    pub fn enqueue(&self, done: Option<&Arc<WorkCounter>>, task: impl FnOnce() + Send + 'static) {
        self.shared.outstanding.add(1);
        if let Some(done) = done {
            done.add(1);
        }
        let task = Task { run: Box::new(task), done: done.cloned() };
        let mut state = self.shared.state.lock();
        state.queue.push_back(task);
        self.shared.available.notify_one();
    }

    /// Post `slice_count` instances of one task, instance `i` invoked as
    /// `task(i, slice_count)`. All instances share `done`, which is
    /// pre-incremented by the full count before the first instance is
    /// posted. ND-range fan-out only; the instances are unordered.
    pub fn enqueue_range(&self, slice_count: usize, done: &Arc<WorkCounter>, task: Arc<dyn Fn(usize, usize) + Send + Sync>) {
        if slice_count == 0 {
            return;
        }
        self.shared.outstanding.add(slice_count);
        done.add(slice_count);

        let mut state = self.shared.state.lock();
        for slice_index in 0..slice_count {
            let task = Arc::clone(&task);
            state.queue.push_back(Task {
                run: Box::new(move || task(slice_index, slice_count)),
                done: Some(Arc::clone(done)),
            });
        }
        drop(state);
        self.shared.available.notify_all();
    }

    /// Block the caller until `counter` reaches zero.
    pub fn wait(&self, counter: &WorkCounter) {
        counter.wait();
    }

    /// Worker-side wait: drain queued tasks while `counter` is non-zero,
    /// then block. A worker waiting on its own fan-out keeps contributing,
    /// so a single-worker pool cannot deadlock on slices parked behind the
    /// task that posted them.
    pub fn run_until(&self, counter: &WorkCounter) {
        while !counter.is_zero() {
            let task = self.shared.state.lock().queue.pop_front();
            match task {
                Some(task) => task.execute(&self.shared.outstanding),
                None => break,
            }
        }
        counter.wait();
    }

    /// Block until every accepted command-buffer group has completed and
    /// the task queue has drained.
    pub fn wait_all(&self) {
        self.groups.wait();
        self.shared.outstanding.wait();
    }

    pub(crate) fn begin_group(&self) {
        self.groups.add(1);
    }

    pub(crate) fn finish_group(&self) {
        self.groups.complete_one();
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
        }
        self.shared.available.notify_all();
        for worker in self.workers.drain(..) {
            // Workers drain the queue before honoring shutdown.
            let _ = worker.join();
        }
    }
}
