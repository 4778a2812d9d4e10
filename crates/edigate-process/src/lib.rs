//! Worker process lifecycle management.
//!
//! A [`Job`] runs one external worker to completion with bounded,
//! escalating termination control: a first termination request delivers a
//! graceful stop signal, and if the worker has not exited within the
//! escalation window (or a second request arrives) a forced kill follows
//! exactly once. When the platform supports it, signals are delivered to
//! the worker's whole process group so grandchildren are reclaimed too.
//!
//! Jobs can inherit an open connection from their parent at a fixed,
//! pre-agreed descriptor slot ([`INHERITED_STREAM_SLOT`]) so the worker can
//! reconstruct it without relying on command-line encoding of descriptor
//! numbers.

mod errors;
mod inherit;
mod job;
mod termination;

pub use errors::{InheritError, JobError};
#[cfg(unix)]
pub use inherit::claim_inherited_stream;
pub use inherit::INHERITED_STREAM_SLOT;
pub use job::{ExitOutcome, Job, JobSpec, JobState};
pub use termination::TerminationHandle;

const JOB_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::job");
