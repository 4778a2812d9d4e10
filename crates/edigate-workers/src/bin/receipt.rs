//! Material receipt worker.
//!
//! Started by the dispatcher with the accepted connection inherited at the
//! fixed descriptor slot. Receives the host's record stream, replies with
//! the session outcome, and writes the receipt document. Any failure exits
//! non-zero, which the dispatcher treats as fatal to intake.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};

use edigate_codec::{
    Credential, MaterialReceipt, ReceiptBuilder, document_timestamp, receipt_file_name,
    write_document,
};
use edigate_config::{LogFormat, LogSettings, NotifySettings, init_telemetry};
use edigate_notify::{Notification, Notifier};
use edigate_protocol::SessionOutcome;

const RECEIPT_TARGET: &str = "edigate-receipt";

/// Receives one material-receipt record stream over an inherited
/// connection.
#[derive(Debug, Parser)]
#[command(name = "edigate-receipt")]
struct ReceiptArgs {
    /// Directory receipt documents are written into.
    #[arg(long, env = "EDIGATE_OUT_DIR", default_value = "out")]
    out_dir: PathBuf,

    /// Customer identifier used in receipt file names.
    #[arg(long, env = "EDIGATE_CUSTOMER", default_value = "CUSTOMER")]
    customer: String,

    /// Party identity recorded in the receipt header.
    #[arg(
        long,
        env = "EDIGATE_RECEIPT_IDENTITY",
        default_value = "MaterialManager@customer.example"
    )]
    identity: String,

    /// Party domain recorded in the receipt header.
    #[arg(long, env = "EDIGATE_RECEIPT_DOMAIN", default_value = "customer.example")]
    domain: String,

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
}

fn main() -> ExitCode {
    let args = ReceiptArgs::parse();
    if let Err(telemetry_error) =
        init_telemetry(&LogSettings::new(args.log_filter.clone(), args.log_format))
    {
        eprintln!("edigate-receipt: {telemetry_error}");
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

#[cfg(unix)]
fn run(args: &ReceiptArgs, notify: &NotifySettings, notifier: &dyn Notifier) -> ExitCode {
    use edigate_process::claim_inherited_stream;
    use edigate_protocol::RecordSession;

    let socket = match claim_inherited_stream() {
        Ok(socket) => socket,
        Err(inherit_error) => {
            error!(
                target: RECEIPT_TARGET,
                error = %inherit_error,
                "no connection was handed off"
            );
            notifier.notify(&Notification::new(
                &notify.from,
                &notify.to,
                "[EDI] MR Receipt Network Error",
                format!(
                    "Operation: claim inherited connection\nError Message: {inherit_error}\nDate Time: {}\n",
                    document_timestamp()
                ),
            ));
            return ExitCode::FAILURE;
        }
    };
    info!(target: RECEIPT_TARGET, "receipt session started");

    let mut session = RecordSession::new(socket);
    let records = match session.receive() {
        Ok(records) => records,
        Err(transport_error) => {
            error!(
                target: RECEIPT_TARGET,
                operation = transport_error.operation,
                error = %transport_error,
                "receive failed"
            );
            notifier.notify(&Notification::new(
                &notify.from,
                &notify.to,
                "[EDI] MR Receipt Network Error",
                format!(
                    "Operation: {}\nError Message: {transport_error}\nDate Time: {}\n",
                    transport_error.operation,
                    document_timestamp()
                ),
            ));
            return ExitCode::FAILURE;
        }
    };
    if session.skipped_lines() > 0 {
        warn!(
            target: RECEIPT_TARGET,
            skipped = session.skipped_lines(),
            "malformed record lines were skipped"
        );
    }
    info!(
        target: RECEIPT_TARGET,
        records = records.len(),
        "record stream complete"
    );

    let party = Credential::new(args.identity.clone(), args.domain.clone());
    let mut builder = ReceiptBuilder::new(party.clone(), party);
    for record in &records {
        builder.apply(record);
    }
    let receipt = builder.finish();

    let outcome = SessionOutcome::new(
        "Receipt",
        format!("{} line items received", receipt.lines.len()),
    );
    if let Err(transport_error) = session.send_outcome(&outcome) {
        error!(
            target: RECEIPT_TARGET,
            operation = transport_error.operation,
            error = %transport_error,
            "outcome reply failed"
        );
        notifier.notify(&Notification::new(
            &notify.from,
            &notify.to,
            "[EDI] MR Receipt Network Error",
            format!(
                "Operation: {}\nError Message: {transport_error}\nDate Time: {}\n",
                transport_error.operation,
                document_timestamp()
            ),
        ));
        return ExitCode::FAILURE;
    }
    drop(session);

    write_receipt_document(args, notify, notifier, &receipt)
}

#[cfg(unix)]
fn write_receipt_document(
    args: &ReceiptArgs,
    notify: &NotifySettings,
    notifier: &dyn Notifier,
    receipt: &MaterialReceipt,
) -> ExitCode {
    if let Err(prepare_error) = fs::create_dir_all(&args.out_dir) {
        error!(
            target: RECEIPT_TARGET,
            dir = %args.out_dir.display(),
            error = %prepare_error,
            "cannot prepare out directory"
        );
        return ExitCode::FAILURE;
    }
    let name = receipt_file_name(&args.customer, receipt);
    if let Err(write_error) = write_document(&args.out_dir, &name, receipt) {
        error!(
            target: RECEIPT_TARGET,
            file = %name,
            error = %write_error,
            "failed to write receipt document"
        );
        notifier.notify(&Notification::new(
            &notify.from,
            &notify.to,
            "[EDI] MR Response Error",
            format!(
                "Transfer Filename: {name}\nMR-PkgID#: {}\nError: {write_error}\nDate Time: {}\n",
                receipt.package.package_id,
                document_timestamp()
            ),
        ));
        return ExitCode::FAILURE;
    }

    info!(
        target: RECEIPT_TARGET,
        file = %name,
        lines = receipt.lines.len(),
        "receipt written"
    );
    notifier.notify(&Notification::new(
        &notify.from,
        &notify.to,
        format!("[EDI] MR Response PkgID: {}", receipt.package.package_id),
        format!(
            "Transfer Filename: {name}\nMR-PkgID#: {}\nStatus: Receipt document created successfully.\nDate Time: {}\n",
            receipt.package.package_id,
            document_timestamp()
        ),
    ));
    ExitCode::SUCCESS
}

#[cfg(not(unix))]
fn run(_args: &ReceiptArgs, _notify: &NotifySettings, _notifier: &dyn Notifier) -> ExitCode {
    eprintln!("edigate-receipt: descriptor inheritance requires a unix platform");
    ExitCode::FAILURE
}
