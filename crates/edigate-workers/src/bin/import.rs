//! Purchase-order import worker.
//!
//! Started once per intake file. Reads the envelope named on the command
//! line, flattens it to records, streams them to the order-management
//! host, awaits the two-part outcome, and writes the response document.
//! When the envelope itself cannot be read, order identity is recovered
//! from the file name so an ERROR response still reaches the out
//! directory. Any failure exits non-zero so the watcher quarantines the
//! input.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use edigate_codec::{
    OrderResponse, PurchaseOrder, ResponseOrder, build_order_response, document_timestamp,
    load_purchase_order, order_identity_from_file_name, order_to_records, response_file_name,
    write_document,
};
use edigate_config::{LogFormat, LogSettings, NotifySettings, SocketEndpoint, init_telemetry};
use edigate_notify::{Notification, Notifier};
use edigate_protocol::RecordSession;

const IMPORT_TARGET: &str = "edigate-import";

/// Imports one purchase-order envelope into the order-management host.
#[derive(Debug, Parser)]
#[command(name = "edigate-import")]
struct ImportArgs {
    /// Order-management host endpoint.
    #[arg(
        long,
        env = "EDIGATE_PARTNER",
        default_value_t = edigate_config::default_partner_endpoint()
    )]
    partner: SocketEndpoint,

    /// Directory response documents are written into.
    #[arg(long, env = "EDIGATE_OUT_DIR", default_value = "out")]
    out_dir: PathBuf,

    /// Customer identifier used in response file names.
    #[arg(long, env = "EDIGATE_CUSTOMER", default_value = "CUSTOMER")]
    customer: String,

    /// Log filter expression.
    #[arg(long, env = "EDIGATE_LOG_FILTER", default_value = "info")]
    log_filter: String,

    /// Log output format.
    #[arg(long, env = "EDIGATE_LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,

    /// Originator mailbox for notifications.
    #[arg(long, env = "EDIGATE_NOTIFY_FROM", default_value = "edigate@localhost")]
    notify_from: String,

    /// Operator mailbox for notifications.
    #[arg(long, env = "EDIGATE_NOTIFY_TO", default_value = "operator@localhost")]
    notify_to: String,

    /// Local mail delivery command; notifications go to the log without it.
    #[arg(long, env = "EDIGATE_MAIL_COMMAND")]
    mail_command: Option<String>,

    /// Envelope file to import.
    #[arg(value_name = "ENVELOPE")]
    envelope: PathBuf,
}

fn main() -> ExitCode {
    let args = ImportArgs::parse();
    if let Err(telemetry_error) =
        init_telemetry(&LogSettings::new(args.log_filter.clone(), args.log_format))
    {
        eprintln!("edigate-import: {telemetry_error}");
        return ExitCode::FAILURE;
    }
    let notify = NotifySettings {
        from: args.notify_from.clone(),
        to: args.notify_to.clone(),
        mail_command: args.mail_command.clone(),
    };
    let notifier = edigate_notify::from_settings(&notify);
    run(&args, &notify, notifier.as_ref())
}

fn run(args: &ImportArgs, notify: &NotifySettings, notifier: &dyn Notifier) -> ExitCode {
    let file_name = args
        .envelope
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    info!(target: IMPORT_TARGET, file = %file_name, "import started");

    if let Err(prepare_error) = fs::create_dir_all(&args.out_dir) {
        error!(
            target: IMPORT_TARGET,
            dir = %args.out_dir.display(),
            error = %prepare_error,
            "cannot prepare out directory"
        );
        return ExitCode::FAILURE;
    }

    let order = match load_purchase_order(&args.envelope) {
        Ok(order) => order,
        Err(envelope_error) => {
            error!(
                target: IMPORT_TARGET,
                file = %file_name,
                error = %envelope_error,
                "envelope rejected"
            );
            // The customer still gets a response document; identity comes
            // from the file name when the envelope is unreadable.
            let response = error_response_from_file_name(args, &envelope_error.to_string());
            let name = response_file_name(&args.customer, &response);
            let written = write_document(&args.out_dir, &name, &response);
            notifier.notify(&Notification::new(
                &notify.from,
                &notify.to,
                "[EDI] PO Import Status: ERROR",
                format!(
                    "Filename: {file_name}\nStatus Message: {envelope_error}\nDate Time: {}\n",
                    document_timestamp()
                ),
            ));
            if let Err(write_error) = written {
                error!(
                    target: IMPORT_TARGET,
                    error = %write_error,
                    "failed to write error response"
                );
            }
            return ExitCode::FAILURE;
        }
    };

    let records = match order_to_records(&order) {
        Ok(records) => records,
        Err(codec_error) => {
            error!(
                target: IMPORT_TARGET,
                file = %file_name,
                error = %codec_error,
                "envelope not representable as records"
            );
            notifier.notify(&Notification::new(
                &notify.from,
                &notify.to,
                "[EDI] PO Import Status: ERROR",
                format!(
                    "Filename: {file_name}\nStatus Message: {codec_error}\nDate Time: {}\n",
                    document_timestamp()
                ),
            ));
            return ExitCode::FAILURE;
        }
    };

    info!(
        target: IMPORT_TARGET,
        endpoint = %args.partner,
        records = records.len(),
        "connecting to order-management host"
    );
    let outcome = {
        let session = RecordSession::connect(&args.partner);
        let mut session = match session {
            Ok(session) => session,
            Err(transport_error) => {
                notify_network_error(notify, notifier, &file_name, &order, &transport_error);
                return ExitCode::FAILURE;
            }
        };
        let sent = session
            .send(&records)
            .and_then(|()| session.await_outcome());
        match sent {
            Ok(outcome) => outcome,
            Err(transport_error) => {
                notify_network_error(notify, notifier, &file_name, &order, &transport_error);
                return ExitCode::FAILURE;
            }
        }
    };

    let response = build_order_response(
        &order,
        outcome.action_code.clone(),
        outcome.response_message.clone(),
    );
    let name = response_file_name(&args.customer, &response);
    if let Err(write_error) = write_document(&args.out_dir, &name, &response) {
        error!(
            target: IMPORT_TARGET,
            file = %name,
            error = %write_error,
            "failed to write response document"
        );
        notifier.notify(&Notification::new(
            &notify.from,
            &notify.to,
            "[EDI] PO Response WriteFile FAILED",
            format!(
                "Filename: {file_name}\nOrder: {}\nProject: {}\nImport Status: {}\nResponse Failed: {write_error}\nDate Time: {}\n",
                order.order.order_number,
                order.order.project_number,
                outcome.action_code,
                document_timestamp()
            ),
        ));
        return ExitCode::FAILURE;
    }

    info!(
        target: IMPORT_TARGET,
        file = %name,
        action = %outcome.action_code,
        "import finished"
    );
    notifier.notify(&Notification::new(
        &notify.from,
        &notify.to,
        format!("[EDI] PO Import Status: {}", outcome.action_code),
        format!(
            "Filename: {file_name}\nOrder: {}\nProject: {}\nStatus Message: {}\nDate Time: {}\n",
            order.order.order_number,
            order.order.project_number,
            outcome.response_message,
            document_timestamp()
        ),
    ));
    ExitCode::SUCCESS
}

fn error_response_from_file_name(args: &ImportArgs, detail: &str) -> OrderResponse {
    let identity = order_identity_from_file_name(&args.envelope);
    OrderResponse {
        message_id: identity.message_id,
        timestamp: document_timestamp(),
        version: "1.0".to_string(),
        order: ResponseOrder {
            order_number: identity.order_number,
            action: "ERROR".to_string(),
            project_number: identity.project_number.clone(),
            contract_number: identity.project_number,
            response: detail.to_string(),
        },
    }
}

fn notify_network_error(
    notify: &NotifySettings,
    notifier: &dyn Notifier,
    file_name: &str,
    order: &PurchaseOrder,
    transport_error: &edigate_protocol::TransportError,
) {
    error!(
        target: IMPORT_TARGET,
        file = %file_name,
        operation = transport_error.operation,
        error = %transport_error,
        "session failed"
    );
    notifier.notify(&Notification::new(
        &notify.from,
        &notify.to,
        "[EDI] PO Import Network Error",
        format!(
            "Filename: {file_name}\nOrder: {}\nProject: {}\nOperation: {}\nError Message: {transport_error}\nDate Time: {}\n",
            order.order.order_number,
            order.order.project_number,
            transport_error.operation,
            document_timestamp()
        ),
    ));
}
