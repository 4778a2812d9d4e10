//! Error types for record construction and session transport.

use std::io;

use thiserror::Error;

/// A transport operation on a record session failed.
///
/// Carries the session operation that failed alongside the underlying IO
/// cause. Sessions never retry internally, so a `TransportError` always
/// terminates the exchange it occurred in.
#[derive(Debug, Error)]
#[error("transport operation '{operation}' failed: {source}")]
pub struct TransportError {
    /// Session operation that failed, e.g. `connect` or `receive record`.
    pub operation: &'static str,
    /// Underlying IO error.
    #[source]
    pub source: io::Error,
}

impl TransportError {
    pub(crate) fn new(operation: &'static str, source: io::Error) -> Self {
        Self { operation, source }
    }

    /// The peer closed the stream before the operation could complete.
    pub(crate) fn peer_closed(operation: &'static str) -> Self {
        Self::new(
            operation,
            io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed the connection"),
        )
    }
}

/// Errors raised while constructing a [`crate::Record`].
///
/// Validation happens at the codec boundary: records that would be
/// ambiguous or unrepresentable on the wire are rejected before a session
/// ever sees them.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Record keys identify fields and must not be empty.
    #[error("record key must not be empty")]
    EmptyKey,
    /// Record keys are bounded-length identifiers.
    #[error("record key '{key}' exceeds {limit} bytes")]
    KeyTooLong {
        /// The rejected key.
        key: String,
        /// Maximum permitted key length.
        limit: usize,
    },
    /// The key contained the field separator or a line terminator.
    #[error("record key '{key}' contains a reserved character")]
    KeyReservedCharacter {
        /// The rejected key.
        key: String,
    },
    /// The value contained the field separator or a line terminator.
    #[error("record value for key '{key}' contains a reserved character")]
    ValueReservedCharacter {
        /// Key whose value was rejected.
        key: String,
    },
}
