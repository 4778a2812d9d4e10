//! Error types for job lifecycle operations.

use std::io;

use thiserror::Error;

/// Errors surfaced while spawning or supervising a worker.
#[derive(Debug, Error)]
pub enum JobError {
    /// The worker executable could not be launched.
    #[error("failed to spawn worker '{command}': {source}")]
    Spawn {
        /// Command that failed to launch.
        command: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Polling the worker's exit status failed.
    #[error("failed to wait on worker '{command}': {source}")]
    Wait {
        /// Command being supervised.
        command: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// A termination signal could not be delivered.
    #[cfg(unix)]
    #[error("failed to signal worker process {pid}: {source}")]
    Signal {
        /// Process (or process group) that was signalled.
        pid: i32,
        /// Underlying OS error.
        #[source]
        source: nix::Error,
    },
    /// Forcing the worker to stop failed.
    #[cfg(not(unix))]
    #[error("failed to stop worker '{command}': {source}")]
    Stop {
        /// Command being stopped.
        command: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

/// Errors raised while claiming an inherited connection.
#[derive(Debug, Error)]
pub enum InheritError {
    /// Nothing was inherited at the agreed descriptor slot.
    #[error("no inherited connection at descriptor slot {slot}")]
    MissingSlot {
        /// The fixed slot that was probed.
        slot: i32,
    },
}
