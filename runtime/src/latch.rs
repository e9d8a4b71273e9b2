//! Shared completion counter with blocking wait.
//!
//! This is the leaf primitive under the thread pool, the fence protocol and
//! the ND-range fan-out: a count of outstanding work items that completing
//! workers decrement and waiters block on until it reaches zero.
//!
//! The counter is a single monitor: the count lives inside the mutex and a
//! decrement notifies under the same critical section. Decrement-and-notify
//! being atomic is what lets waiters use a plain condition wait with no
//! re-check workaround on the side.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub struct WorkCounter {
    count: Mutex<usize>,
    zero: Condvar,
}

impl WorkCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `n` outstanding work items.
    pub fn add(&self, n: usize) {
        *self.count.lock() += n;
    }

    /// Mark one work item complete, waking waiters on the transition to zero.
    pub fn complete_one(&self) {
        let mut count = self.count.lock();
        debug_assert!(*count > 0, "completion without matching add");
        *count -= 1;
        if *count == 0 {
            self.zero.notify_all();
        }
    }

    pub fn value(&self) -> usize {
        *self.count.lock()
    }

    pub fn is_zero(&self) -> bool {
        self.value() == 0
    }

    /// Block until the count reaches zero.
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.zero.wait(&mut count);
        }
    }

    /// Block until the count reaches zero or `timeout` elapses.
    /// Returns `true` if zero was reached.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            if self.zero.wait_for(&mut count, remaining).timed_out() && *count > 0 {
                return false;
            }
        }
        true
    }
}
