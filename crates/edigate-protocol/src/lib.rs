//! Wire-level record exchange with the order-management host.
//!
//! A [`RecordSession`] conducts one synchronous request/response exchange
//! over a point-to-point byte stream: an ordered stream of `KEY=VALUE`
//! lines terminated by the [`SENTINEL`] line, followed by a two-part
//! outcome (action code, then response message) framed by the transport's
//! own length signalling.
//!
//! Sessions never retry; any transport failure surfaces as a
//! [`TransportError`] and retry policy belongs to the caller. Malformed
//! record lines received from a peer are skipped under a counted leniency
//! policy rather than failing the session, preserving compatibility with
//! the partner's output.

mod errors;
mod record;
mod session;
mod stream;

pub use errors::{RecordError, TransportError};
pub use record::{FIELD_SEPARATOR, MAX_KEY_LENGTH, Record, RecordStream, SENTINEL};
pub use session::{RecordSession, SessionOutcome};
pub use stream::SessionStream;

const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");
