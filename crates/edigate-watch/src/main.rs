//! Watcher binary entry point.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::error;

use edigate_config::{
    DEBOUNCE_DELAY, DEFAULT_LOG_FILTER, INTAKE_SETTLE, LogFormat, LogSettings, NotifySettings,
    init_telemetry,
};
use edigate_notify::Notifier;
use edigate_process::JobSpec;
use edigate_watch::{WatchArgs, WatchOptions, run_watch};

fn main() -> ExitCode {
    let args = WatchArgs::parse();

    let Some((command, command_args)) = args.command.split_first() else {
        eprintln!("usage: edigate-watch [OPTIONS] <COMMAND> [COMMAND ARGS]...");
        eprintln!("a worker command to run on each trigger is required");
        return ExitCode::FAILURE;
    };

    let format = if args.terminal {
        LogFormat::Compact
    } else {
        LogFormat::Json
    };
    let filter = if args.verbose {
        "debug"
    } else {
        DEFAULT_LOG_FILTER
    };
    if let Err(telemetry_error) = init_telemetry(&LogSettings::new(filter, format)) {
        eprintln!("edigate-watch: {telemetry_error}");
        return ExitCode::FAILURE;
    }

    let notify = NotifySettings {
        from: args.notify_from.clone(),
        to: args.notify_to.clone(),
        mail_command: args.mail_command.clone(),
    };
    let notifier: Arc<dyn Notifier> = Arc::from(edigate_notify::from_settings(&notify));

    let options = WatchOptions {
        root: args.path.clone(),
        exclude: args.exclude.clone(),
        worker: JobSpec::new(command).args(command_args.iter().cloned()),
        debounce: DEBOUNCE_DELAY,
        settle: INTAKE_SETTLE,
        extensions: args.extensions.clone(),
        notify,
    };

    match run_watch(options, notifier) {
        Ok(()) => ExitCode::SUCCESS,
        Err(watch_error) => {
            error!(error = %watch_error, "watcher failed");
            eprintln!("edigate-watch: {watch_error}");
            ExitCode::FAILURE
        }
    }
}
