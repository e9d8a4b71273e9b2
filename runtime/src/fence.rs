//! Single-submission completion objects.
//!
//! A fence is bound to at most one dispatch at a time. The completion path
//! writes its result exactly once; callers block on [`Fence::try_wait`] or
//! poll [`Fence::status`], and must [`Fence::reset`] before reusing the
//! fence with another dispatch. A dispatch without a fence is a valid
//! fire-and-forget configuration, not an error.
//!
//! The fence is one monitor: the state lives inside the mutex and signaling
//! notifies under the same critical section, so waiters need no re-check
//! workaround after waking.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use snafu::ensure;

use crate::error::{FenceFailureSnafu, Result, WaitTimeoutSnafu};

/// Result of a completed dispatch, delivered to fences and callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Complete,
    /// The buffer failed mid-execution or was forced through the
    /// termination path before running.
    Failed,
}

/// Observable fence state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    NotReady,
    Complete,
    Failed,
}

#[derive(Debug, Default)]
pub struct Fence {
    state: Mutex<FenceStatus>,
    signaled: Condvar,
}

impl Default for FenceStatus {
    fn default() -> Self {
        Self::NotReady
    }
}

impl Fence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> FenceStatus {
        *self.state.lock()
    }

    /// Rearm the fence for another dispatch. The previous result is
    /// discarded whether or not anyone waited on it.
    pub fn reset(&self) {
        *self.state.lock() = FenceStatus::NotReady;
    }

    /// Write the dispatch result and wake all waiters.
    pub(crate) fn complete(&self, status: CompletionStatus) {
        let mut state = self.state.lock();
        *state = match status {
            CompletionStatus::Complete => FenceStatus::Complete,
            CompletionStatus::Failed => FenceStatus::Failed,
        };
        self.signaled.notify_all();
    }

    /// Block until the bound dispatch completes.
    pub fn wait(&self) -> Result<()> {
        let mut state = self.state.lock();
        loop {
            match *state {
                FenceStatus::Complete => return Ok(()),
                FenceStatus::Failed => return FenceFailureSnafu.fail(),
                FenceStatus::NotReady => self.signaled.wait(&mut state),
            }
        }
    }

    /// Block up to `timeout` for the bound dispatch. A timeout is reported
    /// distinctly from failure; the underlying work keeps running and will
    /// still write this fence.
    pub fn try_wait(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            match *state {
                FenceStatus::Complete => return Ok(()),
                FenceStatus::Failed => return FenceFailureSnafu.fail(),
                FenceStatus::NotReady => {}
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            ensure!(!remaining.is_zero(), WaitTimeoutSnafu { waited_ms: timeout.as_millis() as u64 });
            self.signaled.wait_for(&mut state, remaining);
        }
    }
}
