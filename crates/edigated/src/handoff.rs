//! Connection hand-off to a receiver worker.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::debug;

use edigate_process::{ExitOutcome, Job, JobError, JobSpec};
use edigate_protocol::SessionStream;

use crate::DISPATCH_TARGET;

/// Idempotent holder of the dispatcher's copy of a handed-off connection.
///
/// Ownership of the connection logically transfers to the worker at spawn;
/// the guard only bounds how long the dispatcher's duplicate descriptor
/// stays open. Closing an already-closed guard is a no-op.
#[derive(Debug)]
pub struct ConnectionGuard {
    stream: Mutex<Option<SessionStream>>,
}

impl ConnectionGuard {
    /// Wraps the dispatcher's copy of a connection.
    #[must_use]
    pub fn new(stream: SessionStream) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
        }
    }

    /// Closes the dispatcher's copy, returning whether this call closed it.
    pub fn close(&self) -> bool {
        match self.stream.lock() {
            Ok(mut slot) => slot.take().is_some(),
            Err(_) => false,
        }
    }
}

/// Spawns the receiver worker with `stream` inherited at the fixed slot,
/// arms the grace timer over the dispatcher's copy, and waits for the
/// worker to finish.
pub(crate) fn hand_off(
    stream: SessionStream,
    spec: JobSpec,
    grace: Duration,
) -> Result<ExitOutcome, JobError> {
    #[cfg(unix)]
    let mut job = Job::spawn_with_stream(spec, &stream)?;
    #[cfg(not(unix))]
    let mut job = Job::spawn(spec)?;

    let guard = Arc::new(ConnectionGuard::new(stream));
    let reclaim = Arc::clone(&guard);
    thread::spawn(move || {
        thread::sleep(grace);
        if reclaim.close() {
            debug!(
                target: DISPATCH_TARGET,
                grace_ms = grace.as_millis(),
                "grace period expired; reclaimed dispatcher copy of the connection"
            );
        }
    });

    let outcome = job.await_exit()?;
    // The worker is gone; reclaim early rather than waiting out the timer.
    guard.close();
    Ok(outcome)
}
