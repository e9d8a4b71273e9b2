//! Queues: dependency resolution, dispatch and execution.
//!
//! A queue tracks parked submissions in a wait-count map and hands runnable
//! buffers to the device's thread pool. From the queue's point of view a
//! submission moves `Parked(wait_count > 0) → Running → Completed`; the
//! sole cross-buffer ordering mechanism is semaphore signaling. Buffers
//! that share no semaphore have no ordering between them, even when
//! dispatched back to back on one queue.
//!
//! Lock discipline: the pending map is guarded by one mutex per queue. It
//! is never held across a pool post, a semaphore registration or a
//! semaphore notification, and command handlers never take it at all.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use snafu::{ResultExt, ensure};
use tracing::{debug, trace, warn};

use veles_device::{QueryPool, ScheduleInfo};

use crate::command::{Command, NDRange};
use crate::command_buffer::{CommandBuffer, CommandBufferId, CompletionCallback};
use crate::error::{DeviceSnafu, Error, InvalidDependencySnafu, Result};
use crate::fence::{CompletionStatus, Fence};
use crate::latch::WorkCounter;
use crate::pool::ThreadPool;
use crate::semaphore::Semaphore;

struct PendingGroup {
    /// Semaphore signals still required before the buffer may run.
    wait_count: usize,
    buffer: Arc<CommandBuffer>,
}

pub struct Queue {
    pool: Arc<ThreadPool>,
    pending: Mutex<HashMap<CommandBufferId, PendingGroup>>,
    slice_multiplier: usize,
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue").field("pending", &self.pending.lock().len()).field("pool", &self.pool).finish()
    }
}

impl Queue {
    pub(crate) fn new(pool: Arc<ThreadPool>, slice_multiplier: usize) -> Arc<Self> {
        Arc::new(Self { pool, pending: Mutex::new(HashMap::new()), slice_multiplier: slice_multiplier.max(1) })
    }

    /// Submit a recorded buffer.
    ///
    /// With an empty wait list the buffer is posted to the pool
    /// immediately; otherwise it parks until every wait semaphore has
    /// signaled once (AND-join). Acceptance never blocks on execution, and
    /// once a buffer is accepted all failures are asynchronous: they reach
    /// the caller through the fence and the completion closure only.
    /// Submitting with neither is valid fire-and-forget.
    pub fn dispatch(
        self: &Arc<Self>,
        buffer: &Arc<CommandBuffer>,
        fence: Option<Arc<Fence>>,
        wait_semaphores: &[Arc<Semaphore>],
        signal_semaphores: &[Arc<Semaphore>],
        on_complete: Option<CompletionCallback>,
    ) -> Result<()> {
        for (i, semaphore) in wait_semaphores.iter().enumerate() {
            ensure!(
                !wait_semaphores[..i].iter().any(|prev| Arc::ptr_eq(prev, semaphore)),
                InvalidDependencySnafu { reason: "duplicate semaphore in wait list" }
            );
        }
        // Reserve map room up front so a parked submission cannot fail
        // after dispatch state exists.
        if !wait_semaphores.is_empty() {
            self.pending.lock().try_reserve(1).map_err(|_| Error::OutOfMemory)?;
        }

        buffer.bind_dispatch(fence, on_complete, signal_semaphores)?;
        self.pool.begin_group();

        if wait_semaphores.is_empty() {
            debug!(buffer.id = ?buffer.id(), "dispatching");
            self.post_process(Arc::clone(buffer));
            return Ok(());
        }

        self.pending
            .lock()
            .insert(buffer.id(), PendingGroup { wait_count: wait_semaphores.len(), buffer: Arc::clone(buffer) });

        for (i, semaphore) in wait_semaphores.iter().enumerate() {
            if let Err(error) = semaphore.add_wait(self, buffer) {
                // A partially-registered dependency must not exist: undo
                // everything this dispatch touched.
                for registered in &wait_semaphores[..i] {
                    registered.remove_wait(buffer);
                }
                self.pending.lock().remove(&buffer.id());
                buffer.cancel_dispatch();
                self.pool.finish_group();
                return Err(error);
            }
        }

        debug!(buffer.id = ?buffer.id(), waits = wait_semaphores.len(), "dispatch parked");
        Ok(())
    }

    /// Force a parked or not-yet-dispatched buffer straight to the
    /// completion path without running its commands: the fence reports
    /// failure, the completion closure runs, and the buffer's own signal
    /// semaphores still fire so dependents are unblocked rather than
    /// deadlocked. Used when a dependency chain is being torn down.
    pub fn terminate(self: &Arc<Self>, buffer: &Arc<CommandBuffer>) {
        self.signal_completed(buffer, true);
    }

    /// Dependency bookkeeping, called by `Semaphore::signal` for each
    /// waiter and by `terminate`.
    pub(crate) fn signal_completed(self: &Arc<Self>, buffer: &Arc<CommandBuffer>, terminate: bool) {
        if terminate {
            self.pending.lock().remove(&buffer.id());
            let queue = Arc::clone(self);
            let buffer = Arc::clone(buffer);
            trace!(buffer.id = ?buffer.id(), "terminating group");
            self.pool.enqueue(None, move || queue.complete(&buffer, CompletionStatus::Failed));
            return;
        }

        let ready = {
            let mut pending = self.pending.lock();
            match pending.get_mut(&buffer.id()) {
                Some(group) => {
                    group.wait_count -= 1;
                    if group.wait_count == 0 {
                        // The entry is removed exactly once, at the
                        // transition to zero.
                        pending.remove(&buffer.id()).map(|group| group.buffer)
                    } else {
                        None
                    }
                }
                // Not tracked here: an edge-triggered signal for a buffer
                // this queue is not waiting on.
                None => None,
            }
        };

        if let Some(buffer) = ready {
            debug!(buffer.id = ?buffer.id(), "dependencies satisfied, dispatching");
            self.post_process(buffer);
        }
    }

    /// Block until every group accepted by this device's pool (parked or
    /// running, across all its queues) has completed.
    pub fn wait_all(&self) -> Result<()> {
        self.pool.wait_all();
        Ok(())
    }

    fn post_process(self: &Arc<Self>, buffer: Arc<CommandBuffer>) {
        let queue = Arc::clone(self);
        self.pool.enqueue(None, move || queue.process_commands(&buffer));
    }

    /// Execute the buffer's commands in recorded order on this worker. The
    /// ND-range handler blocks this worker on its own fan-out, so the
    /// buffer still observes a single logical thread of control.
    fn process_commands(self: &Arc<Self>, buffer: &Arc<CommandBuffer>) {
        let mut active_query: Option<(Arc<QueryPool>, usize)> = None;
        let mut failed = false;

        for command in buffer.commands() {
            let bracketed = active_query.clone();
            let started = Instant::now();
            let result = self.run_command(command, &mut active_query);
            if let Some((pool, index)) = bracketed {
                // Slot index was validated when the query began.
                let _ = pool.add_duration(index, started.elapsed());
            }
            if let Err(error) = result {
                warn!(buffer.id = ?buffer.id(), command = command.kind(), %error, "command failed, aborting buffer");
                failed = true;
                break;
            }
        }

        self.complete(buffer, if failed { CompletionStatus::Failed } else { CompletionStatus::Complete });
    }

    /// The per-buffer completion path. Runs exactly once per dispatch
    /// (normal, failed or terminated): fence result, completion closure,
    /// then every signal semaphore — which may cascade into dispatching
    /// downstream buffers — and finally the pool's group counter.
    fn complete(self: &Arc<Self>, buffer: &Arc<CommandBuffer>, status: CompletionStatus) {
        let Some(completion) = buffer.take_completion() else {
            return;
        };
        trace!(buffer.id = ?buffer.id(), ?status, "group completed");

        if let Some(fence) = completion.fence {
            fence.complete(status);
        }
        if let Some(callback) = completion.callback {
            callback(status);
        }
        for semaphore in completion.signals {
            semaphore.signal();
        }
        self.pool.finish_group();
    }

    fn run_command(&self, command: &Command, active_query: &mut Option<(Arc<QueryPool>, usize)>) -> Result<()> {
        match command {
            Command::ReadBuffer { src, offset, size, dst } => {
                // SAFETY: the recording side guarantees the host pointer is
                // valid and unaliased until the dispatch completes.
                unsafe { src.memory().read_to_ptr(*offset, *size, dst.0) }.context(DeviceSnafu)
            }
            Command::WriteBuffer { dst, offset, size, src } => {
                // SAFETY: as above.
                unsafe { dst.memory().write_from_ptr(*offset, *size, src.0) }.context(DeviceSnafu)
            }
            Command::FillBuffer { dst, offset, size, pattern } => {
                dst.memory().fill(*offset, *size, pattern).context(DeviceSnafu)
            }
            Command::CopyBuffer { src, dst, src_offset, dst_offset, size } => {
                dst.memory().copy_from(src.memory(), *src_offset, *dst_offset, *size).context(DeviceSnafu)
            }
            Command::ReadImage { src, origin, region, dst } => {
                // SAFETY: as for ReadBuffer.
                unsafe { src.read_region_to_ptr(*origin, *region, dst.0) }.context(DeviceSnafu)
            }
            Command::WriteImage { dst, origin, region, src } => {
                // SAFETY: as for WriteBuffer.
                unsafe { dst.write_region_from_ptr(*origin, *region, src.0) }.context(DeviceSnafu)
            }
            Command::FillImage { dst, origin, region, texel } => {
                dst.fill_region(*origin, *region, texel).context(DeviceSnafu)
            }
            Command::CopyImage { src, dst, src_origin, dst_origin, region } => {
                dst.copy_region(src, *src_origin, *dst_origin, *region).context(DeviceSnafu)
            }
            Command::CopyImageToBuffer { src, dst, origin, region, buffer_offset } => {
                src.copy_to_buffer(dst, *origin, *region, *buffer_offset).context(DeviceSnafu)
            }
            Command::CopyBufferToImage { src, dst, buffer_offset, origin, region } => {
                dst.copy_from_buffer(src, *buffer_offset, *origin, *region).context(DeviceSnafu)
            }
            Command::NDRangeDispatch(nd) => self.run_ndrange(nd),
            Command::UserCallback { callback } => {
                callback();
                Ok(())
            }
            Command::BeginQuery { pool, index } => {
                pool.ensure_slot(*index).context(DeviceSnafu)?;
                *active_query = Some((Arc::clone(pool), *index));
                Ok(())
            }
            Command::EndQuery { pool, index } => {
                let matches = active_query.as_ref().is_some_and(|(p, i)| Arc::ptr_eq(p, pool) && i == index);
                if matches {
                    *active_query = None;
                }
                Ok(())
            }
            Command::ResetQueryPool { pool, first, count } => pool.reset(*first, *count).context(DeviceSnafu),
        }
    }

    /// Fan one kernel dispatch out across the pool. The calling worker
    /// participates via `run_until`, so physical parallelism stays inside
    /// this one step of the command loop.
    fn run_ndrange(&self, nd: &NDRange) -> Result<()> {
        if nd.global_size.contains(&0) {
            trace!(kernel = nd.kernel.name(), "empty global extent, dispatch skipped");
            return Ok(());
        }

        let entry = Arc::clone(nd.kernel.entry_for(nd.local_size));
        let template = ScheduleInfo {
            global_size: nd.global_size,
            global_offset: nd.global_offset,
            local_size: nd.local_size,
            work_dim: nd.work_dim,
            slice_index: 0,
            total_slices: 1,
        };
        let total_groups = template.total_workgroups();
        // Mild over-subscription lets a slice that finishes early hand its
        // worker to the remainder; never more slices than groups.
        let slices = (self.pool.worker_count() * self.slice_multiplier).min(total_groups).max(1);

        debug!(kernel = nd.kernel.name(), slices, total_groups, "fanning out kernel dispatch");

        let args = Arc::clone(&nd.args);
        let done = Arc::new(WorkCounter::new());
        self.pool.enqueue_range(
            slices,
            &done,
            Arc::new(move |slice_index, total_slices| {
                let info = ScheduleInfo { slice_index, total_slices, ..template.clone() };
                entry(&args, &info);
            }),
        );
        self.pool.run_until(&done);
        Ok(())
    }
}
