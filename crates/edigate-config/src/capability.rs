//! Platform process-control capabilities.

/// Process-control capabilities of the running platform.
///
/// Whether termination signals can be delivered to a worker's whole process
/// group is decided here once, at compile time, and threaded into each job
/// at construction. Tests and unusual deployments can override the detected
/// value explicitly; nothing re-probes the platform per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessCapabilities {
    group_signaling: bool,
}

impl ProcessCapabilities {
    /// Capabilities of the compilation target.
    #[must_use]
    pub const fn detect() -> Self {
        Self {
            group_signaling: cfg!(unix),
        }
    }

    /// Builds capabilities with an explicit group-signalling setting.
    #[must_use]
    pub const fn with_group_signaling(group_signaling: bool) -> Self {
        Self { group_signaling }
    }

    /// Whether termination signals reach the worker's whole process group.
    #[must_use]
    pub const fn group_signaling(&self) -> bool {
        self.group_signaling
    }
}

impl Default for ProcessCapabilities {
    fn default() -> Self {
        Self::detect()
    }
}
