//! Filesystem change watcher for the edigate document intake.
//!
//! A storm of low-level filesystem events is converted into a rate-limited
//! stream of triggered worker runs. Two threads cooperate:
//!
//! - the **event thread** maps raw notifications into [`ChangeEvent`]s,
//!   applies the exclusion filter, performs document intake for created
//!   files, and forwards observation timestamps;
//! - the **trigger loop** debounces those timestamps and starts a
//!   supervised run only while the last completed run is older than the
//!   last observed change.
//!
//! The two sides share nothing but the timestamp channel, so event arrival
//! and run supervision never race over mutable state.

mod cli;
mod errors;
mod events;
mod intake;
mod trigger;

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use tracing::{info, warn};

use edigate_config::NotifySettings;
use edigate_notify::Notifier;
use edigate_process::JobSpec;

pub use cli::WatchArgs;
pub use errors::WatchError;
pub use events::{ChangeEvent, ChangeKind, ExclusionFilter};
pub use intake::{IntakeContext, IntakeOutcome};
pub use trigger::{CommandRunner, RunSupervisor};

use events::run_event_thread;
use trigger::run_trigger_loop;

const WATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::watch");

/// Watcher configuration assembled at startup.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Root to watch, recursively.
    pub root: PathBuf,
    /// Exclusion pattern applied before any other handling.
    pub exclude: Option<String>,
    /// Worker command for triggered runs and intake processing.
    pub worker: JobSpec,
    /// Debounce delay for change bursts.
    pub debounce: Duration,
    /// Settle delay before intake picks up a created file.
    pub settle: Duration,
    /// Intake file extensions recognised for processing.
    pub extensions: Vec<String>,
    /// Notification addressing.
    pub notify: NotifySettings,
}

/// Watches the root until the event stream ends or a fatal failure occurs.
///
/// # Errors
///
/// Returns a [`WatchError`] when the watcher cannot be installed, when a
/// worker cannot be spawned (fatal by design), or when the underlying
/// event stream reports a failure.
pub fn run_watch(options: WatchOptions, notifier: Arc<dyn Notifier>) -> Result<(), WatchError> {
    if !options.root.exists() {
        return Err(WatchError::MissingRoot {
            path: options.root.clone(),
        });
    }
    let filter = ExclusionFilter::from_pattern(options.exclude.as_deref())?;

    let (event_tx, event_rx) = mpsc::channel();
    let mut watcher = RecommendedWatcher::new(
        move |result| {
            // The trigger side going away ends the watch; nothing to do here.
            let _ = event_tx.send(result);
        },
        notify::Config::default(),
    )
    .map_err(|source| WatchError::Init { source })?;
    watcher
        .watch(&options.root, RecursiveMode::Recursive)
        .map_err(|source| WatchError::Watch {
            path: options.root.clone(),
            source,
        })?;
    info!(
        target: WATCH_TARGET,
        root = %options.root.display(),
        worker = options.worker.command(),
        "watching for document activity"
    );

    let intake = IntakeContext::prepare(
        options.root.clone(),
        options.worker.clone(),
        options.extensions.clone(),
        options.settle,
        Arc::clone(&notifier),
        options.notify.clone(),
    )?;

    let (change_tx, change_rx) = mpsc::channel();
    let event_thread =
        thread::spawn(move || run_event_thread(event_rx, filter, Some(intake), change_tx));

    let mut runner = CommandRunner::new(
        options.worker.clone(),
        Arc::clone(&notifier),
        options.notify.clone(),
    );
    run_trigger_loop(&change_rx, &mut runner, options.debounce)?;

    // The trigger loop only returns cleanly when the event thread dropped
    // its channel end; surface whatever ended that thread.
    match event_thread.join() {
        Ok(result) => result,
        Err(_) => {
            warn!(target: WATCH_TARGET, "event thread panicked");
            Ok(())
        }
    }
}

/// Current time in the shape operator notifications carry.
pub(crate) fn timestamp() -> String {
    let now = time::OffsetDateTime::now_utc();
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}
