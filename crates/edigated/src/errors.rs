//! Error types for the dispatcher daemon.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use edigate_process::{ExitOutcome, JobError};

/// Errors surfaced while binding the inbound listener.
#[derive(Debug, Error)]
pub enum ListenError {
    /// TCP address resolution failed.
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Resolution yielded no usable addresses.
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
    },
    /// Binding the TCP listener failed.
    #[error("failed to bind TCP listener at {addr}: {source}")]
    BindTcp {
        /// Resolved address.
        addr: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The listener could not be switched to non-blocking accepts.
    #[error("failed to enable non-blocking accept: {source}")]
    NonBlocking {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Unix sockets are unavailable on this platform.
    #[cfg(not(unix))]
    #[error("unix sockets are unsupported for endpoint {endpoint}")]
    UnsupportedUnix {
        /// Configured endpoint.
        endpoint: String,
    },
    /// Binding the Unix listener failed.
    #[cfg(unix)]
    #[error("failed to bind unix listener at {path}: {source}")]
    BindUnix {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Another process already serves the Unix socket.
    #[cfg(unix)]
    #[error("existing unix socket {path} is already in use")]
    UnixInUse {
        /// Socket path.
        path: String,
    },
    /// The configured Unix path exists but is not a socket.
    #[cfg(unix)]
    #[error("unix socket path {path} is not a socket")]
    UnixNotSocket {
        /// Socket path.
        path: String,
    },
    /// Probing an existing Unix socket failed.
    #[cfg(unix)]
    #[error("failed to inspect existing unix socket {path}: {source}")]
    UnixInspect {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Removing a stale Unix socket failed.
    #[cfg(unix)]
    #[error("failed to remove stale unix socket {path}: {source}")]
    UnixCleanup {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Fatal dispatcher failures.
///
/// Accept failures and worker failures alike halt intake: a listener that
/// cannot accept cannot self-heal, and a worker binary that cannot run
/// would silently drop every document a degraded dispatcher accepted.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Accepting an inbound connection failed.
    #[error("failed to accept inbound connection: {source}")]
    Accept {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The receiver worker could not be spawned or supervised.
    #[error("receiver worker failed: {source}")]
    Worker {
        /// Underlying job error.
        #[source]
        source: JobError,
    },
    /// The receiver worker ran but did not succeed.
    #[error("receiver worker '{command}' finished with {outcome}")]
    WorkerExit {
        /// Worker command.
        command: String,
        /// How the run ended.
        outcome: ExitOutcome,
    },
}
