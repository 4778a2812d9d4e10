//! Material receipt assembly from a received record stream.

use serde::{Deserialize, Serialize};
use tracing::debug;

use edigate_protocol::Record;

use crate::{Credential, document_timestamp, file_timestamp};

const RECEIPT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::receipt");

/// Inches per foot, for the package volume computation.
const INCHES_PER_FOOT: f64 = 12.0;

/// Outbound material receipt document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterialReceipt {
    /// Receipt message identifier, derived from the order identity.
    pub message_id: String,
    /// Receipt creation time.
    pub timestamp: String,
    /// Envelope schema version.
    pub version: String,
    /// Originating party.
    pub from: Credential,
    /// Receiving party.
    pub to: Credential,
    /// Source-system attributes.
    pub attributes: Vec<ReceiptAttribute>,
    /// The received package.
    pub package: ReceiptPackage,
    /// Received line items, in arrival order.
    pub lines: Vec<ReceiptLine>,
    /// Receipt totals.
    pub summary: ReceiptSummary,
}

/// Named attribute carried in the receipt header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptAttribute {
    pub name: String,
    pub value: String,
}

/// Package-level receipt fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceiptPackage {
    pub package_id: String,
    pub package_number: String,
    pub tracking_number: String,
    pub package_type: String,
    pub package_name: String,
    pub carrier: String,
    /// Date the package reached the packer, in `DDMONYY` form.
    pub at_packer: String,
    /// UN hazard code, when one applies.
    pub hazard_code: String,
    pub order_number: String,
    pub project_number: String,
    pub contract_number: String,
    /// Measured package dimensions.
    pub measured: PackageMeasurements,
}

/// Measured package dimensions. Weight in pounds, linear dimensions in
/// inches, volume in cubic feet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageMeasurements {
    pub weight: String,
    pub length: String,
    pub width: String,
    pub height: String,
    pub volume: String,
}

/// One received line item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub line_number: String,
    pub subline_number: String,
    pub transaction_quantity: String,
    pub packlist_quantity: String,
    pub damaged_quantity: String,
    pub material_item_code: String,
    pub material_item_size: String,
    pub material_type: String,
    pub material_short_description: String,
    /// Descriptive unit of measure, e.g. `EACH`.
    pub unit_of_measure: String,
    /// Unit-of-measure code, e.g. `EA`.
    pub uom_code: String,
    pub shipping_quantity: String,
    pub date_at_packer: String,
    pub is_asset: String,
    pub asset_number: String,
    pub asset_uid: String,
    pub serial_number: String,
}

/// Receipt totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceiptSummary {
    pub total_line_items: String,
    pub total_packages: String,
}

/// Folds a received record stream into a [`MaterialReceipt`].
///
/// Records are applied one at a time in arrival order; a
/// `MRDETL-MR-ITEM-NO` record opens a new line item and subsequent
/// line-level records apply to the most recently opened line. Line-level
/// records arriving before any line has opened are ignored, mirroring the
/// session's lenient posture towards irregular peer output.
#[derive(Debug)]
pub struct ReceiptBuilder {
    receipt: MaterialReceipt,
}

impl ReceiptBuilder {
    /// Starts a receipt between the given parties.
    #[must_use]
    pub fn new(from: Credential, to: Credential) -> Self {
        let mut receipt = MaterialReceipt {
            version: "1.0".to_string(),
            from,
            to,
            ..MaterialReceipt::default()
        };
        receipt.attributes.push(ReceiptAttribute {
            name: "SourceSystem".to_string(),
            value: "MatMan".to_string(),
        });
        receipt.attributes.push(ReceiptAttribute {
            name: "SourceSystemVersion".to_string(),
            value: String::new(),
        });
        Self { receipt }
    }

    /// Applies one received record.
    pub fn apply(&mut self, record: &Record) {
        let value = record.value();
        match record.key() {
            "PKGDETL-PKG-NO" => {
                self.receipt.package.package_id = value.to_string();
                self.receipt.package.tracking_number = value.to_string();
            }
            "PKGDETL-PackageNumber" => self.receipt.package.package_number = value.to_string(),
            "PKG-DESCRIPTION" => {
                self.receipt.package.package_type = value.to_string();
                self.receipt.package.package_name = value.to_string();
            }
            "MRHEAD-CARRIER" => self.receipt.package.carrier = value.to_string(),
            "MRHEAD-DATE-RECV" => self.receipt.package.at_packer = format_host_date(value),
            "MRHEAD-UN-NO" => {
                if let Some(code) = strip_hazard_padding(value) {
                    self.receipt.package.hazard_code = code;
                }
            }
            "POHEAD-REQ-NO" => self.receipt.package.project_number = value.to_string(),
            "POHEAD-PROJECT-CODE" => self.receipt.package.contract_number = value.to_string(),
            "MRHEAD-PO-NO" => self.receipt.package.order_number = value.to_string(),
            "PKGDETL-LENGTH" => self.receipt.package.measured.length = value.to_string(),
            "PKGDETL-WIDTH" => self.receipt.package.measured.width = value.to_string(),
            "PKGDETL-HEIGHT" => self.receipt.package.measured.height = value.to_string(),
            "PKGDETL-TOT-LBS" => self.receipt.package.measured.weight = value.to_string(),
            "MRDETL-MR-ITEM-NO" => self.open_line(),
            "MRDETL-ITEM-REF" => self.with_line(|line| {
                line.line_number = value.trim().to_string();
            }),
            "MRDETL-RECV-QTY" => self.with_line(|line| {
                let quantity = value.trim().to_string();
                line.transaction_quantity = quantity.clone();
                line.packlist_quantity = quantity.clone();
                line.shipping_quantity = quantity;
            }),
            "PODETL-ITEMNO" => self.with_line(|line| {
                line.material_item_code = value.to_string();
            }),
            "PODETL-ITEMNO-DESCR" => self.with_line(|line| {
                line.material_short_description = value.to_string();
            }),
            "PODETD-MaterialItemSize" => self.with_line(|line| {
                line.material_item_size = value.to_string();
            }),
            "PODETD-MaterialType" => self.with_line(|line| {
                line.material_type = value.to_string();
            }),
            "PODETL-UNIT-MEA" => self.with_line(|line| {
                line.unit_of_measure = value.to_string();
            }),
            "PODETL-UOM" => self.with_line(|line| {
                line.uom_code = value.to_string();
                if line.uom_code.is_empty() {
                    // uom truncation fallback: with no dedicated code, derive
                    // one by truncating the descriptive unit of measure.
                    line.uom_code = line.unit_of_measure.chars().take(1).collect();
                }
            }),
            "PODETL-IsAsset" => self.with_line(|line| {
                line.is_asset = value.to_string();
            }),
            "PODETL-assetNo" => self.with_line(|line| {
                line.asset_number = value.to_string();
            }),
            "PODETL-assetUID" => self.with_line(|line| {
                line.asset_uid = value.to_string();
            }),
            "PODETL-SerialNumber" => self.with_line(|line| {
                line.serial_number = value.to_string();
            }),
            other => {
                debug!(
                    target: RECEIPT_TARGET,
                    key = other,
                    "ignoring unmapped record"
                );
            }
        }
    }

    /// Count of line items opened so far.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.receipt.lines.len()
    }

    /// Completes the receipt: computes the package volume, fills the
    /// summary, and stamps identity and timestamps.
    #[must_use]
    pub fn finish(mut self) -> MaterialReceipt {
        let measured = &mut self.receipt.package.measured;
        measured.volume = cubic_feet(&measured.length, &measured.width, &measured.height);

        self.receipt.summary = ReceiptSummary {
            total_line_items: self.receipt.lines.len().to_string(),
            total_packages: "1".to_string(),
        };
        self.receipt.timestamp = document_timestamp();
        self.receipt.message_id = format!(
            "{}_{}_RECEIPTS_{}",
            self.receipt.package.contract_number,
            self.receipt.package.order_number.replace('/', "_"),
            file_timestamp()
        );
        self.receipt
    }

    fn open_line(&mut self) {
        let line = ReceiptLine {
            // Receiving reports no damage separately; damaged quantity is
            // zero unless the host says otherwise.
            damaged_quantity: "0".to_string(),
            subline_number: "0".to_string(),
            date_at_packer: self.receipt.package.at_packer.clone(),
            ..ReceiptLine::default()
        };
        self.receipt.lines.push(line);
    }

    fn with_line(&mut self, update: impl FnOnce(&mut ReceiptLine)) {
        if let Some(line) = self.receipt.lines.last_mut() {
            update(line);
        } else {
            debug!(
                target: RECEIPT_TARGET,
                "ignoring line-level record before any line item"
            );
        }
    }
}

/// Reformats the host's `YYMMDD` date as `DDMONYY`.
///
/// Inputs that are not six ASCII digits are returned unchanged; an unknown
/// month renders as `???`.
#[must_use]
pub fn format_host_date(raw: &str) -> String {
    if raw.len() != 6 || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
        return raw.to_string();
    }
    let year = &raw[0..2];
    let month = match &raw[2..4] {
        "01" => "JAN",
        "02" => "FEB",
        "03" => "MAR",
        "04" => "APR",
        "05" => "MAY",
        "06" => "JUN",
        "07" => "JUL",
        "08" => "AUG",
        "09" => "SEP",
        "10" => "OCT",
        "11" => "NOV",
        "12" => "DEC",
        _ => "???",
    };
    let day = &raw[4..6];
    format!("{day}{month}{year}")
}

/// Strips the host's zero padding from a UN hazard number, yielding the
/// code only when something meaningful remains.
fn strip_hazard_padding(raw: &str) -> Option<String> {
    let code = raw.replace("000000", "");
    (code.len() > 1).then_some(code)
}

/// Converts linear inch measurements into a cubic-foot volume string.
fn cubic_feet(length: &str, width: &str, height: &str) -> String {
    let parse = |value: &str| value.trim().parse::<f64>().unwrap_or(0.0);
    let volume = (parse(length) / INCHES_PER_FOOT)
        * (parse(width) / INCHES_PER_FOOT)
        * (parse(height) / INCHES_PER_FOOT);
    format!("{volume:.6}")
}

/// Derives the receipt document file name.
#[must_use]
pub fn receipt_file_name(customer_id: &str, receipt: &MaterialReceipt) -> String {
    format!(
        "{customer_id}_MR_{}_{}_RECEIPTS_{}.json",
        receipt.package.contract_number,
        receipt.package.order_number.replace('/', "_"),
        file_timestamp()
    )
}
