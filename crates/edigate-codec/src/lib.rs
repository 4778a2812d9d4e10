//! Record codec: structured envelope documents to ordered key/value
//! records and back.
//!
//! The front-end exchanges JSON envelope documents; the order-management
//! host speaks the line-oriented field transport. This crate owns the
//! mapping in both directions: a [`PurchaseOrder`] envelope flattens into
//! an ordered record stream for sending, and a received record stream
//! folds into a [`MaterialReceipt`] document. Field order is semantically
//! significant and mirrors the legacy host's expectations.
//!
//! Values are cleaned (line breaks, tabs, and the field separator collapse
//! to spaces) before they become records, so the session layer never sees
//! an unrepresentable field.

mod order;
mod receipt;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use edigate_protocol::RecordError;

pub use order::{
    FileIdentity, OrderDetails, OrderLine, OrderResponse, OrderSummary, PurchaseOrder,
    ResponseOrder, UnitOfMeasure, Vendor, build_order_response, load_purchase_order,
    order_identity_from_file_name, order_to_records, response_file_name,
};
pub use receipt::{
    MaterialReceipt, PackageMeasurements, ReceiptAttribute, ReceiptBuilder, ReceiptLine,
    ReceiptPackage, ReceiptSummary, format_host_date, receipt_file_name,
};

/// Errors raised while mapping envelopes to records or writing documents.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The envelope file could not be read.
    #[error("failed to read envelope '{path}': {source}")]
    ReadEnvelope {
        /// Envelope path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// The envelope file was not a valid document.
    #[error("failed to parse envelope '{path}': {source}")]
    ParseEnvelope {
        /// Envelope path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// A result document could not be written.
    #[error("failed to write document '{path}': {source}")]
    WriteDocument {
        /// Destination path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// A result document could not be serialised.
    #[error("failed to serialise document: {0}")]
    SerialiseDocument(#[from] serde_json::Error),
    /// An envelope field was not representable as a record even after
    /// cleaning.
    #[error("field '{key}' is not representable as a record: {source}")]
    Field {
        /// Record key of the offending field.
        key: String,
        /// Underlying validation error.
        #[source]
        source: RecordError,
    },
}

/// A party identity carried in envelope headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Mailbox-style identity, e.g. `MaterialManager@customer.example`.
    #[serde(default)]
    pub identity: String,
    /// Identity domain.
    #[serde(default)]
    pub domain: String,
}

impl Credential {
    /// Builds a credential.
    #[must_use]
    pub fn new(identity: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            domain: domain.into(),
        }
    }
}

/// Current time in the envelope timestamp shape, `YYYY-MM-DDTHH:MM:SS`.
#[must_use]
pub fn document_timestamp() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

/// Current time in the compact shape used for file names, `YYYYMMDDHHMMSS`.
#[must_use]
pub fn file_timestamp() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

/// Writes a result document into `directory` as pretty-printed JSON.
///
/// # Errors
///
/// Fails when the document cannot be serialised or the file cannot be
/// written.
pub fn write_document<T: Serialize>(
    directory: &Path,
    file_name: &str,
    document: &T,
) -> Result<PathBuf, CodecError> {
    let path = directory.join(file_name);
    let mut payload = serde_json::to_vec_pretty(document)?;
    payload.push(b'\n');
    fs::write(&path, payload).map_err(|source| CodecError::WriteDocument {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Collapses characters that cannot appear in a wire field to spaces and
/// trims the result.
pub(crate) fn clean_value(value: &str) -> String {
    let collapsed: String = value
        .chars()
        .map(|character| match character {
            '\n' | '\r' | '\t' | '=' => ' ',
            other => other,
        })
        .collect();
    collapsed.trim().to_string()
}
