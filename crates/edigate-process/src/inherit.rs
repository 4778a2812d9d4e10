//! The fixed-slot descriptor inheritance contract.
//!
//! A dispatcher hands an accepted connection to its worker by duplicating
//! the connection's descriptor onto [`INHERITED_STREAM_SLOT`] immediately
//! before the worker image is executed. The worker claims the slot with
//! [`claim_inherited_stream`]. The slot number is a fixed contract between
//! the two processes; descriptor numbers are never passed on the command
//! line because their textual value is not reliable across platforms.

use crate::errors::InheritError;

/// Descriptor slot at which a handed-off connection is presented to a
/// spawned worker (the first slot after stdin, stdout, and stderr).
pub const INHERITED_STREAM_SLOT: i32 = 3;

/// Claims the connection inherited at the fixed slot, taking ownership.
///
/// Call once, early in a receiver worker's startup. The returned socket is
/// family-agnostic: the dispatcher may have accepted the connection over
/// TCP or a Unix domain socket.
///
/// # Errors
///
/// Returns [`InheritError::MissingSlot`] when the slot is not an open
/// descriptor, i.e. the worker was started without a hand-off.
#[cfg(unix)]
pub fn claim_inherited_stream() -> Result<socket2::Socket, InheritError> {
    use std::os::fd::FromRawFd;

    // SAFETY: F_GETFD only inspects the descriptor table; it cannot affect
    // other descriptors or memory.
    let flags = unsafe { libc::fcntl(INHERITED_STREAM_SLOT, libc::F_GETFD) };
    if flags == -1 {
        return Err(InheritError::MissingSlot {
            slot: INHERITED_STREAM_SLOT,
        });
    }
    // SAFETY: the slot is open and, per the inheritance contract, this
    // process is its sole owner from this point on.
    Ok(unsafe { socket2::Socket::from_raw_fd(INHERITED_STREAM_SLOT) })
}
