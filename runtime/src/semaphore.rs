//! Edge-triggered cross-buffer dependency gates.
//!
//! A semaphore holds the command buffers currently parked on it. `signal`
//! drains the waiter list and decrements each waiter's queue-tracked wait
//! count; no signaled flag persists, so a signal only affects waiters
//! registered before it and signaling with no waiters is a no-op.
//!
//! Lock discipline: the waiter list has its own mutex and is never locked
//! together with a queue's pending map — registration happens after the map
//! insert, and notification happens after the drain.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use crate::command_buffer::CommandBuffer;
use crate::error::{Error, Result};
use crate::queue::Queue;

struct Waiter {
    queue: Weak<Queue>,
    buffer: Arc<CommandBuffer>,
}

#[derive(Default)]
pub struct Semaphore {
    waiters: Mutex<Vec<Waiter>>,
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore").field("waiters", &self.waiters.lock().len()).finish()
    }
}

impl Semaphore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `buffer` on this semaphore. Called once per wait dependency of a
    /// submission, after the queue has registered the buffer's wait count.
    pub(crate) fn add_wait(&self, queue: &Arc<Queue>, buffer: &Arc<CommandBuffer>) -> Result<()> {
        let mut waiters = self.waiters.lock();
        waiters.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
        waiters.push(Waiter { queue: Arc::downgrade(queue), buffer: Arc::clone(buffer) });
        Ok(())
    }

    /// Unregister a buffer, for dispatch-time rollback.
    pub(crate) fn remove_wait(&self, buffer: &CommandBuffer) {
        self.waiters.lock().retain(|w| w.buffer.id() != buffer.id());
    }

    /// Notify every currently-registered waiter and forget them. Each
    /// notification decrements the waiter's wait count on its owning queue;
    /// a waiter whose count reaches zero is handed to the thread pool by
    /// the queue.
    pub fn signal(&self) {
        let drained = std::mem::take(&mut *self.waiters.lock());
        if drained.is_empty() {
            return;
        }
        trace!(waiters = drained.len(), "semaphore signaled");
        for waiter in drained {
            if let Some(queue) = waiter.queue.upgrade() {
                queue.signal_completed(&waiter.buffer, false);
            }
        }
    }
}
