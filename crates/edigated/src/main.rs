//! Dispatcher daemon entry point.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::Parser;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use tracing::{error, warn};

use edigate_config::{LogFormat, LogSettings, NotifySettings, SocketEndpoint, init_telemetry};
use edigate_notify::{Notification, Notifier};
use edigate_process::JobSpec;
use edigated::{Dispatcher, DispatcherSettings, notification_timestamp};

/// Accepts inbound partner connections and hands each one, with the live
/// socket inherited at the fixed descriptor slot, to a receiver worker.
#[derive(Debug, Parser)]
#[command(
    name = "edigated",
    about = "Accepts inbound partner connections and hands each to a receiver worker",
    override_usage = "edigated [OPTIONS] <WORKER> [WORKER ARGS]..."
)]
struct DaemonArgs {
    /// Endpoint to listen on.
    #[arg(
        long,
        env = "EDIGATE_LISTEN",
        default_value_t = edigate_config::default_listen_endpoint()
    )]
    listen: SocketEndpoint,

    /// Seconds before the dispatcher reclaims its copy of a handed-off
    /// connection.
    #[arg(
        long,
        env = "EDIGATE_GRACE_SECS",
        default_value_t = edigate_config::HANDOFF_GRACE.as_secs()
    )]
    grace_secs: u64,

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

    /// Receiver worker command, with its arguments.
    #[arg(
        value_name = "WORKER",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        required = true
    )]
    worker: Vec<String>,
}

fn main() -> ExitCode {
    let args = DaemonArgs::parse();

    if let Err(telemetry_error) =
        init_telemetry(&LogSettings::new(args.log_filter.clone(), args.log_format))
    {
        eprintln!("edigated: {telemetry_error}");
        return ExitCode::FAILURE;
    }

    let notify = NotifySettings {
        from: args.notify_from.clone(),
        to: args.notify_to.clone(),
        mail_command: args.mail_command.clone(),
    };
    let notifier: Arc<dyn Notifier> = Arc::from(edigate_notify::from_settings(&notify));

    let Some((command, worker_args)) = args.worker.split_first() else {
        // clap enforces at least one trailing word.
        return ExitCode::FAILURE;
    };
    let settings = DispatcherSettings {
        worker: JobSpec::new(command).args(worker_args.iter().cloned()),
        grace: Duration::from_secs(args.grace_secs),
        notify: notify.clone(),
    };

    if let Err(prepare_error) = args.listen.prepare_filesystem() {
        error!(error = %prepare_error, "failed to prepare listen endpoint");
        return ExitCode::FAILURE;
    }
    let dispatcher = match Dispatcher::bind(&args.listen, settings, Arc::clone(&notifier)) {
        Ok(dispatcher) => dispatcher,
        Err(listen_error) => {
            error!(
                endpoint = %args.listen,
                error = %listen_error,
                "dispatcher failed to start"
            );
            notifier.notify(&Notification::new(
                &notify.from,
                &notify.to,
                "[EDI] Dispatcher failed to start",
                format!(
                    "Endpoint: {}\nError: {listen_error}\nDate Time: {}\n",
                    args.listen,
                    notification_timestamp()
                ),
            ));
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGTERM, SIGINT, SIGQUIT, SIGHUP] {
        if let Err(register_error) = signal_hook::flag::register(signal, Arc::clone(&shutdown)) {
            warn!(
                signal,
                error = %register_error,
                "failed to install shutdown signal handler"
            );
        }
    }

    match dispatcher.run(&shutdown) {
        Ok(()) => ExitCode::SUCCESS,
        Err(dispatch_error) => {
            error!(error = %dispatch_error, "dispatcher halted");
            ExitCode::FAILURE
        }
    }
}
