//! Inbound connection dispatcher for the edigate gateway.
//!
//! The daemon accepts partner connections on one configured endpoint and
//! hands each accepted connection, as an inherited descriptor at the fixed
//! slot, to a freshly spawned receiver worker. The dispatcher keeps a
//! supervisory grace timer per hand-off: when it fires, the dispatcher's
//! own copy of the connection is unconditionally reclaimed so a
//! misbehaving or slow-starting worker cannot pin the socket open from the
//! parent's side.
//!
//! Failure policy: a listener that cannot accept, a worker that cannot be
//! spawned, and a worker that exits non-zero are all fatal to the daemon.
//! A broken worker binary indicates a deployment problem that should halt
//! intake rather than silently drop documents; every such failure reaches
//! the operator through the notifier before the process exits.

mod dispatcher;
mod errors;
mod handoff;

pub use dispatcher::{Dispatcher, DispatcherSettings};
pub use errors::{DispatchError, ListenError};
pub use handoff::ConnectionGuard;

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Current time in the shape operator notifications carry.
#[must_use]
pub fn notification_timestamp() -> String {
    let now = time::OffsetDateTime::now_utc();
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}
