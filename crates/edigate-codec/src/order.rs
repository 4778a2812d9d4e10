//! Purchase-order envelopes, their record mapping, and order responses.

use std::path::Path;

use serde::{Deserialize, Serialize};

use edigate_protocol::{Record, RecordStream};

use crate::{CodecError, Credential, clean_value, document_timestamp};

/// Inbound purchase-order envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurchaseOrder {
    /// Envelope message identifier.
    #[serde(default)]
    pub message_id: String,
    /// Envelope timestamp as supplied by the customer.
    #[serde(default)]
    pub timestamp: String,
    /// Envelope schema version.
    #[serde(default)]
    pub version: String,
    /// Originating party.
    #[serde(default)]
    pub from: Credential,
    /// Receiving party.
    #[serde(default)]
    pub to: Credential,
    /// Order header and line items.
    #[serde(default)]
    pub order: OrderDetails,
    /// Request totals.
    #[serde(default)]
    pub summary: OrderSummary,
}

/// Order header fields and line items.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderDetails {
    /// Customer order number, possibly slash-separated.
    #[serde(default)]
    pub order_number: String,
    /// Project-scoped order number.
    #[serde(default)]
    pub project_order_number: String,
    /// Requested action, e.g. `New`.
    #[serde(default)]
    pub action: String,
    /// Project identifier.
    #[serde(default)]
    pub project_number: String,
    /// Contract identifier.
    #[serde(default)]
    pub contract_number: String,
    /// Supplying vendor.
    #[serde(default)]
    pub vendor: Vendor,
    /// Agreed delivery terms.
    #[serde(default)]
    pub inco_terms: String,
    /// Delivery terms location.
    #[serde(default)]
    pub inco_location: String,
    /// Order description.
    #[serde(default)]
    pub description: String,
    /// Free-text comments.
    #[serde(default)]
    pub comments: String,
    /// Ordered line items, in document order.
    #[serde(default)]
    pub lines: Vec<OrderLine>,
}

/// Vendor identity and address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vendor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub contact_name: String,
    #[serde(default)]
    pub address1: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub telephone: String,
}

/// Unit-of-measure code and description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitOfMeasure {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: String,
}

/// One purchase-order line item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderLine {
    #[serde(default)]
    pub line_number: String,
    #[serde(default)]
    pub quantity: String,
    #[serde(default)]
    pub revision_number: String,
    #[serde(default)]
    pub issue_date: String,
    #[serde(default)]
    pub material_item_code: String,
    #[serde(default)]
    pub material_item_size: String,
    #[serde(default)]
    pub material_short_description: String,
    #[serde(default)]
    pub unit_of_measure: UnitOfMeasure,
    #[serde(default)]
    pub project_unit_price: String,
    #[serde(default)]
    pub project_currency: String,
    #[serde(default)]
    pub po_unit_price: String,
    #[serde(default)]
    pub po_currency: String,
    #[serde(default)]
    pub material_type: String,
    #[serde(default)]
    pub is_asset: String,
    #[serde(default)]
    pub is_uid: String,
    #[serde(default)]
    pub material_long_description: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub delivery_date: String,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub harmonized_tariff_code: String,
    #[serde(default)]
    pub harmonized_tariff_code_desc: String,
    #[serde(default)]
    pub subline: String,
}

/// Request totals from the envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderSummary {
    #[serde(default)]
    pub total_line_items: String,
    #[serde(default)]
    pub total_amount: String,
    #[serde(default)]
    pub total_quantity: String,
}

/// Outbound order response document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderResponse {
    /// Message identifier, echoed from the request.
    pub message_id: String,
    /// Response creation time.
    pub timestamp: String,
    /// Envelope schema version.
    pub version: String,
    /// Order identity and result.
    pub order: ResponseOrder,
}

/// Order identity and result carried in a response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseOrder {
    pub order_number: String,
    /// Action code reported by the host, or `ERROR`.
    pub action: String,
    pub project_number: String,
    pub contract_number: String,
    /// Host response text or error detail.
    pub response: String,
}

/// Order identity recovered from an intake file name.
///
/// Fallback used when the envelope itself cannot be parsed: intake file
/// names carry the contract, project, and order identifiers as
/// underscore-separated segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity {
    /// File stem, reused as the message identifier.
    pub message_id: String,
    /// Third underscore-separated segment, when present.
    pub project_number: String,
    /// Fourth underscore-separated segment, when present.
    pub order_number: String,
}

/// Loads a purchase-order envelope from disk.
///
/// # Errors
///
/// Fails when the file cannot be read or does not parse as an envelope.
pub fn load_purchase_order(path: &Path) -> Result<PurchaseOrder, CodecError> {
    let payload = std::fs::read_to_string(path).map_err(|source| CodecError::ReadEnvelope {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&payload).map_err(|source| CodecError::ParseEnvelope {
        path: path.to_path_buf(),
        source,
    })
}

/// Flattens a purchase order into the ordered record stream the
/// order-management host expects.
///
/// Header fields precede vendor fields, which precede line items; within a
/// line the field order matches the host's fixed intake sequence. Lines
/// flagged as assets are followed by blank asset placeholder fields the
/// host fills during receiving.
///
/// # Errors
///
/// Fails when a field is unrepresentable as a record even after cleaning.
pub fn order_to_records(order: &PurchaseOrder) -> Result<RecordStream, CodecError> {
    let mut records = RecordStream::new();
    let mut push = |key: &'static str, value: &str| -> Result<(), CodecError> {
        let record =
            Record::new(key, clean_value(value)).map_err(|source| CodecError::Field {
                key: key.to_string(),
                source,
            })?;
        records.push(record);
        Ok(())
    };

    push("Msg", &order.message_id)?;
    push("Datetime", &order.timestamp)?;
    push("Fileversion", &order.version)?;
    push("TotalLineItems", &order.summary.total_line_items)?;
    push("TotalAmount", &order.summary.total_amount)?;
    push("TotalQuantity", &order.summary.total_quantity)?;
    push("from.Id", &order.from.identity)?;
    push("from.Dm", &order.from.domain)?;
    push("to.Id", &order.to.identity)?;
    push("to.Dm", &order.to.domain)?;
    push("Ordno", &order.order.order_number)?;
    push("Prjord", &order.order.project_order_number)?;
    push("Action", &order.order.action)?;
    push("ContractNumber", &order.order.contract_number)?;
    push("IncoTerms", &order.order.inco_terms)?;
    push("IncoLocation", &order.order.inco_location)?;
    push("PODescription", &order.order.description)?;
    push("Comments", &order.order.comments)?;
    push("VendorName", &order.order.vendor.name)?;
    push("VendorContactName", &order.order.vendor.contact_name)?;
    push("VendorAddress1", &order.order.vendor.address1)?;
    push("VendorCity", &order.order.vendor.city)?;
    push("VendorState", &order.order.vendor.state)?;
    push("VendorPostalCode", &order.order.vendor.postal_code)?;

    for line in &order.order.lines {
        push("LineNumber", &line.line_number)?;
        push("Qty", &line.quantity)?;
        push("RevisionNumber", &line.revision_number)?;
        push("IssueDate", &line.issue_date)?;
        push("MaterialItemCode", &line.material_item_code)?;
        push("MaterialItemSize", &line.material_item_size)?;
        push("MaterialShortDescription", &line.material_short_description)?;
        push("UOM", &line.unit_of_measure.code)?;
        push("UOMDescr", &line.unit_of_measure.description)?;
        push("ProjectUnitPrice", &line.project_unit_price)?;
        push("ProjectCurrency", &line.project_currency)?;
        push("POUnitPrice", &line.po_unit_price)?;
        push("POCurrency", &line.po_currency)?;
        push("MaterialType", &line.material_type)?;
        push("IsAsset", &line.is_asset)?;
        push("IsUID", &line.is_uid)?;
        push("MaterialLongDescription", &line.material_long_description)?;
        push("Destination", &line.destination)?;
        push("DeliveryDate", &line.delivery_date)?;
        push("Comments", &line.comments)?;
        push("HarmonizedTariffCode", &line.harmonized_tariff_code)?;
        push("HarmonizedTariffCodeDesc", &line.harmonized_tariff_code_desc)?;
        push("Subline", &line.subline)?;
        if line.is_asset == "Yes" {
            // Blank placeholders the host fills in during receiving.
            push("assetNo", "")?;
            push("assetUID", "")?;
            push("SerialNumber", "")?;
            push("Manufacture", "")?;
            push("ModelNo", "")?;
            push("Sensitive", "")?;
            push("ClientReportTable", "")?;
            push("UIDSerialNumber", "")?;
            push("UIDType", "")?;
        }
    }
    Ok(records)
}

/// Builds the response document for an order from the session outcome.
#[must_use]
pub fn build_order_response(
    order: &PurchaseOrder,
    action: impl Into<String>,
    response: impl Into<String>,
) -> OrderResponse {
    OrderResponse {
        message_id: order.message_id.clone(),
        timestamp: document_timestamp(),
        version: order.version.clone(),
        order: ResponseOrder {
            order_number: order.order.order_number.clone(),
            action: action.into(),
            project_number: order.order.project_number.clone(),
            contract_number: order.order.contract_number.clone(),
            response: response.into(),
        },
    }
}

/// Derives the response document file name.
///
/// Order numbers with one slash contribute both segments to the name;
/// anything else falls back to the whole number with slashes flattened.
#[must_use]
pub fn response_file_name(customer_id: &str, response: &OrderResponse) -> String {
    let project = &response.order.project_number;
    let parts: Vec<&str> = response.order.order_number.split('/').collect();
    match parts.as_slice() {
        [single] => format!("RESPONSE_{customer_id}_{project}_PO_RESPONSE_{single}.json"),
        [first, second] => {
            format!("RESPONSE_{customer_id}_{project}_PO_RESPONSE_{first}_{second}.json")
        }
        _ => format!(
            "RESPONSE_{customer_id}_{project}_PO_RESPONSE_{}.json",
            response.order.order_number.replace('/', "_")
        ),
    }
}

/// Recovers order identity from an intake file name, for the response that
/// must still be produced when the envelope itself is unreadable.
#[must_use]
pub fn order_identity_from_file_name(path: &Path) -> FileIdentity {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();
    let parts: Vec<&str> = stem.split('_').collect();
    FileIdentity {
        message_id: stem.to_string(),
        project_number: parts.get(2).copied().unwrap_or_default().to_string(),
        order_number: parts.get(3).copied().unwrap_or_default().to_string(),
    }
}
