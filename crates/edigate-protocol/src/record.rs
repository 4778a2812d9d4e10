//! Records and record streams.

use crate::errors::RecordError;

/// Literal line that terminates a record stream on the wire.
pub const SENTINEL: &str = "EDIEOF";

/// Separator between a record's key and value on the wire.
pub const FIELD_SEPARATOR: char = '=';

/// Maximum length of a record key in bytes.
pub const MAX_KEY_LENGTH: usize = 64;

/// One key/value field of a business document.
///
/// Keys are bounded-length identifiers; neither key nor value may contain
/// the field separator or a line terminator. The codec that produces
/// records is responsible for cleaning values before construction, so a
/// constructed `Record` is always representable as exactly one wire line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    key: String,
    value: String,
}

/// Ordered sequence of records representing one document's fields.
///
/// Order is semantically significant: it reconstructs document line-item
/// order and is preserved end to end by the session.
pub type RecordStream = Vec<Record>;

impl Record {
    /// Validates and builds a record.
    ///
    /// # Errors
    ///
    /// Returns a [`RecordError`] when the key is empty, exceeds
    /// [`MAX_KEY_LENGTH`], or when either part contains the field separator
    /// or a line terminator.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self, RecordError> {
        let key = key.into();
        let value = value.into();
        if key.is_empty() {
            return Err(RecordError::EmptyKey);
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(RecordError::KeyTooLong {
                key,
                limit: MAX_KEY_LENGTH,
            });
        }
        if key.contains([FIELD_SEPARATOR, '\n', '\r']) {
            return Err(RecordError::KeyReservedCharacter { key });
        }
        if value.contains([FIELD_SEPARATOR, '\n', '\r']) {
            return Err(RecordError::ValueReservedCharacter { key });
        }
        Ok(Self { key, value })
    }

    /// The record's field identifier.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The record's field value; may be empty.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}
