//! Command buffers.
//!
//! An ordered, immutable-once-submitted sequence of commands plus the
//! completion bindings of its current dispatch. The command list is fixed at
//! construction; only the per-dispatch state (fence, completion closure,
//! semaphores to signal) changes, and the completion path clears it so a
//! re-submission starts clean.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use smallvec::SmallVec;
use snafu::ensure;

use crate::command::Command;
use crate::error::{Error, InvalidDependencySnafu, Result};
use crate::fence::{CompletionStatus, Fence};
use crate::semaphore::Semaphore;

static NEXT_COMMAND_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a command buffer; key of the queue's pending map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandBufferId(u64);

/// Completion closure invoked on the worker that finished the buffer.
pub type CompletionCallback = Box<dyn FnOnce(CompletionStatus) + Send + 'static>;

#[derive(Default)]
struct DispatchState {
    /// A dispatch of this buffer is outstanding (parked or running).
    active: bool,
    fence: Option<Arc<Fence>>,
    callback: Option<CompletionCallback>,
    signals: SmallVec<[Arc<Semaphore>; 4]>,
}

/// Everything the completion path consumes, taken from the buffer in one
/// step so completion runs exactly once even when termination races normal
/// completion.
pub(crate) struct DispatchCompletion {
    pub fence: Option<Arc<Fence>>,
    pub callback: Option<CompletionCallback>,
    pub signals: SmallVec<[Arc<Semaphore>; 4]>,
}

pub struct CommandBuffer {
    id: CommandBufferId,
    commands: Vec<Command>,
    dispatch: Mutex<DispatchState>,
}

impl std::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuffer").field("id", &self.id).field("commands", &self.commands.len()).finish()
    }
}

impl CommandBuffer {
    pub fn new(commands: Vec<Command>) -> Self {
        Self {
            id: CommandBufferId(NEXT_COMMAND_BUFFER_ID.fetch_add(1, Ordering::Relaxed)),
            commands,
            dispatch: Mutex::new(DispatchState::default()),
        }
    }

    pub fn id(&self) -> CommandBufferId {
        self.id
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Bind the per-dispatch completion state. Rejects overlapping
    /// dispatches: the command sequence must not be re-entered while a
    /// dispatch is outstanding.
    pub(crate) fn bind_dispatch(
        &self,
        fence: Option<Arc<Fence>>,
        callback: Option<CompletionCallback>,
        signals: &[Arc<Semaphore>],
    ) -> Result<()> {
        let mut state = self.dispatch.lock();
        ensure!(!state.active, InvalidDependencySnafu { reason: "command buffer already has an outstanding dispatch" });

        let mut list: SmallVec<[Arc<Semaphore>; 4]> = SmallVec::new();
        list.try_reserve(signals.len()).map_err(|_| Error::OutOfMemory)?;
        list.extend(signals.iter().cloned());

        state.active = true;
        state.fence = fence;
        state.callback = callback;
        state.signals = list;
        Ok(())
    }

    /// Dispatch-time rollback: undo `bind_dispatch` without running the
    /// completion path.
    pub(crate) fn cancel_dispatch(&self) {
        *self.dispatch.lock() = DispatchState::default();
    }

    /// Atomically claim the completion state. Returns `None` if no dispatch
    /// is outstanding (or another path already claimed it).
    pub(crate) fn take_completion(&self) -> Option<DispatchCompletion> {
        let mut state = self.dispatch.lock();
        if !state.active {
            return None;
        }
        state.active = false;
        Some(DispatchCompletion {
            fence: state.fence.take(),
            callback: state.callback.take(),
            signals: std::mem::take(&mut state.signals),
        })
    }
}
