//! Per-job cancellation token with two-stage escalation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// First request: deliver the graceful stop signal.
pub(crate) const GRACEFUL_STAGE: u8 = 1;
/// Second request (or escalation-window expiry): deliver the forced kill.
pub(crate) const FORCED_STAGE: u8 = 2;

/// Cancellation token for one job.
///
/// Cloneable and callable from any thread at any time before the worker
/// exits. The first request triggers the graceful stop, the second (or the
/// escalation window elapsing) the forced kill; requests beyond the second
/// are no-ops because there is nothing further to escalate.
#[derive(Debug, Clone, Default)]
pub struct TerminationHandle {
    stage: Arc<AtomicU8>,
}

impl TerminationHandle {
    /// Builds a fresh token with no termination requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests termination, escalating at most one stage per call.
    pub fn request_termination(&self) {
        let _ = self
            .stage
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |stage| {
                (stage < FORCED_STAGE).then_some(stage + 1)
            });
    }

    /// Whether termination has been requested at least once.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.stage() >= GRACEFUL_STAGE
    }

    pub(crate) fn stage(&self) -> u8 {
        self.stage.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_saturate_at_the_forced_stage() {
        let handle = TerminationHandle::new();
        assert!(!handle.is_requested());
        assert_eq!(handle.stage(), 0);

        handle.request_termination();
        assert_eq!(handle.stage(), GRACEFUL_STAGE);

        handle.request_termination();
        assert_eq!(handle.stage(), FORCED_STAGE);

        handle.request_termination();
        handle.request_termination();
        assert_eq!(handle.stage(), FORCED_STAGE);
        assert!(handle.is_requested());
    }

    #[test]
    fn clones_share_the_same_stage() {
        let handle = TerminationHandle::new();
        let clone = handle.clone();
        clone.request_termination();
        assert!(handle.is_requested());
    }
}
