//! The debounce trigger loop and run supervision.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, SystemTime};

use tracing::{info, warn};

use edigate_config::NotifySettings;
use edigate_notify::{Notification, Notifier};
use edigate_process::{Job, JobSpec};

use crate::WATCH_TARGET;
use crate::errors::WatchError;
use crate::timestamp;

/// Supervises one triggered run of the configured worker command.
pub trait RunSupervisor {
    /// Runs the worker once to completion, returning the run's start time.
    ///
    /// # Errors
    ///
    /// Returns a [`WatchError`] when the worker cannot be spawned or
    /// supervised; such failures are fatal to the watcher.
    fn run_once(&mut self) -> Result<SystemTime, WatchError>;
}

/// Production supervisor: spawns the configured command and waits.
pub struct CommandRunner {
    worker: JobSpec,
    notifier: Arc<dyn Notifier>,
    notify: NotifySettings,
}

impl CommandRunner {
    /// Builds a supervisor for the configured worker command.
    #[must_use]
    pub fn new(worker: JobSpec, notifier: Arc<dyn Notifier>, notify: NotifySettings) -> Self {
        Self {
            worker,
            notifier,
            notify,
        }
    }
}

impl RunSupervisor for CommandRunner {
    fn run_once(&mut self) -> Result<SystemTime, WatchError> {
        let started = SystemTime::now();
        info!(
            target: WATCH_TARGET,
            command = self.worker.command(),
            "state changed; starting triggered run"
        );
        let mut job = Job::spawn(self.worker.clone()).inspect_err(|source| {
            self.notifier.notify(&Notification::new(
                &self.notify.from,
                &self.notify.to,
                "[EDI] FATAL ERROR",
                format!(
                    "Command: {}\nFatal Error: {source}\nDate Time: {}\n",
                    self.worker.command(),
                    timestamp()
                ),
            ));
        })?;
        let outcome = job.await_exit()?;
        if !outcome.success() {
            warn!(
                target: WATCH_TARGET,
                command = self.worker.command(),
                outcome = %outcome,
                "triggered run failed"
            );
            self.notifier.notify(&Notification::new(
                &self.notify.from,
                &self.notify.to,
                "[EDI] Triggered run failed",
                format!(
                    "Command: {}\nError: worker finished with {outcome}\nDate Time: {}\n",
                    self.worker.command(),
                    timestamp()
                ),
            ));
        }
        Ok(started)
    }
}

/// Debounces change timestamps into supervised runs.
///
/// Every arriving timestamp restarts the debounce timer. When the timer
/// fires with no intervening change, a run starts only if the last
/// completed run is older than the last observed change; on completion the
/// run's start time becomes the new `last_run`, so changes that arrived
/// during the run still count as pending. Returns when the channel closes.
pub(crate) fn run_trigger_loop<R: RunSupervisor>(
    changes: &Receiver<SystemTime>,
    runner: &mut R,
    debounce: Duration,
) -> Result<(), WatchError> {
    let mut last_run = SystemTime::UNIX_EPOCH;
    let mut last_change = SystemTime::UNIX_EPOCH;
    let mut armed = false;
    loop {
        if armed {
            match changes.recv_timeout(debounce) {
                Ok(observed) => last_change = last_change.max(observed),
                Err(RecvTimeoutError::Timeout) => {
                    armed = false;
                    if last_run < last_change {
                        last_run = runner.run_once()?;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        } else {
            match changes.recv() {
                Ok(observed) => {
                    last_change = last_change.max(observed);
                    armed = true;
                }
                Err(_) => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    const DEBOUNCE: Duration = Duration::from_millis(60);

    struct RecordingRunner {
        runs: Arc<std::sync::Mutex<Vec<SystemTime>>>,
    }

    impl RunSupervisor for RecordingRunner {
        fn run_once(&mut self) -> Result<SystemTime, WatchError> {
            let started = SystemTime::now();
            self.runs.lock().unwrap().push(started);
            Ok(started)
        }
    }

    fn spawn_loop() -> (
        mpsc::Sender<SystemTime>,
        Arc<std::sync::Mutex<Vec<SystemTime>>>,
        thread::JoinHandle<Result<(), WatchError>>,
    ) {
        let (tx, rx) = mpsc::channel();
        let runs = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorded = Arc::clone(&runs);
        let handle = thread::spawn(move || {
            let mut runner = RecordingRunner { runs: recorded };
            run_trigger_loop(&rx, &mut runner, DEBOUNCE)
        });
        (tx, runs, handle)
    }

    #[test]
    fn a_burst_of_events_triggers_exactly_one_run() {
        let (tx, runs, handle) = spawn_loop();
        for _ in 0..5 {
            tx.send(SystemTime::now()).unwrap();
            thread::sleep(Duration::from_millis(10));
        }
        thread::sleep(DEBOUNCE * 3);
        assert_eq!(runs.lock().unwrap().len(), 1);

        drop(tx);
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn no_further_run_until_a_new_change_arrives() {
        let (tx, runs, handle) = spawn_loop();
        tx.send(SystemTime::now()).unwrap();
        thread::sleep(DEBOUNCE * 3);
        assert_eq!(runs.lock().unwrap().len(), 1);

        // Quiet period: the completed run is newer than every observed
        // change, so nothing fires.
        thread::sleep(DEBOUNCE * 3);
        assert_eq!(runs.lock().unwrap().len(), 1);

        // A fresh change makes the state stale again.
        tx.send(SystemTime::now()).unwrap();
        thread::sleep(DEBOUNCE * 3);
        assert_eq!(runs.lock().unwrap().len(), 2);

        drop(tx);
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn changes_during_a_run_cause_exactly_one_follow_up() {
        struct SlowRunner {
            runs: Arc<std::sync::Mutex<Vec<SystemTime>>>,
        }
        impl RunSupervisor for SlowRunner {
            fn run_once(&mut self) -> Result<SystemTime, WatchError> {
                let started = SystemTime::now();
                self.runs.lock().unwrap().push(started);
                thread::sleep(Duration::from_millis(120));
                Ok(started)
            }
        }

        let (tx, rx) = mpsc::channel();
        let runs = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorded = Arc::clone(&runs);
        let handle = thread::spawn(move || {
            let mut runner = SlowRunner { runs: recorded };
            run_trigger_loop(&rx, &mut runner, DEBOUNCE)
        });

        tx.send(SystemTime::now()).unwrap();
        // Wait for the first run to start, then change state twice while
        // it is still in flight.
        thread::sleep(DEBOUNCE + Duration::from_millis(30));
        tx.send(SystemTime::now()).unwrap();
        tx.send(SystemTime::now()).unwrap();

        thread::sleep(Duration::from_millis(500));
        assert_eq!(runs.lock().unwrap().len(), 2);

        drop(tx);
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn loop_ends_when_the_event_side_disconnects() {
        let (tx, _runs, handle) = spawn_loop();
        drop(tx);
        handle.join().unwrap().unwrap();
    }
}
