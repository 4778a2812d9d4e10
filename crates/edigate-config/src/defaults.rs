//! Default constants shared by the edigate binaries.

use std::time::Duration;

use crate::socket::SocketEndpoint;

/// Default TCP port on which the dispatcher accepts inbound receipt sessions.
pub const DEFAULT_LISTEN_PORT: u16 = 30771;

/// Default TCP port of the order-management host that import workers dial.
pub const DEFAULT_PARTNER_PORT: u16 = 30770;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Quiet period a burst of filesystem events must observe before the watcher
/// considers triggering a run.
pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(200);

/// How long the dispatcher keeps its own copy of a handed-off connection
/// open before reclaiming it, whether or not the worker has claimed it.
pub const HANDOFF_GRACE: Duration = Duration::from_secs(3);

/// How long a worker is given to exit after a graceful stop signal before
/// the forced kill is sent.
pub const ESCALATION_WINDOW: Duration = Duration::from_secs(5);

/// Settle delay between observing a newly created intake file and handing it
/// to a worker, so slow writers can finish.
pub const INTAKE_SETTLE: Duration = Duration::from_millis(200);

/// Default endpoint the dispatcher listens on.
#[must_use]
pub fn default_listen_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_LISTEN_PORT)
}

/// Default endpoint of the order-management host.
#[must_use]
pub fn default_partner_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_PARTNER_PORT)
}
