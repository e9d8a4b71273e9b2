//! Error types for the execution core.

use snafu::Snafu;

/// Result type for runtime operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while scheduling or waiting on recorded work.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Malformed wait/signal configuration, rejected synchronously at
    /// dispatch time before any scheduling state is mutated.
    #[snafu(display("invalid dependency: {reason}"))]
    InvalidDependency { reason: String },

    /// Bookkeeping allocation failed while registering a dispatch.
    #[snafu(display("out of memory while registering dispatch bookkeeping"))]
    OutOfMemory,

    /// The dispatch, or one of its dependencies, failed before or during
    /// execution. Which command failed is not distinguished here; that is
    /// the per-command diagnostic logging's job.
    #[snafu(display("fence reports failure"))]
    FenceFailure,

    /// A blocking wait gave up before the awaited state was reached. The
    /// underlying work keeps running and will still signal its fence.
    #[snafu(display("wait timed out after {waited_ms}ms"))]
    WaitTimeout { waited_ms: u64 },

    /// Device-object error surfaced by a command handler.
    #[snafu(display("device error: {source}"))]
    Device { source: veles_device::Error },
}
