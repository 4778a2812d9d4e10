//! Document intake: per-file worker runs with quarantine on failure.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use edigate_config::NotifySettings;
use edigate_notify::{Notification, Notifier};
use edigate_process::{Job, JobSpec};

use crate::WATCH_TARGET;
use crate::errors::WatchError;
use crate::timestamp;

/// Name of the area successful inputs are moved into.
const PROCESSED_DIR: &str = "processed";

/// Name of the quarantine area for failed inputs.
const ERRORS_DIR: &str = "errors";

/// How one intake file was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// The worker succeeded; the input moved to the processed area.
    Processed,
    /// The input moved to the errors area.
    Quarantined,
    /// The event did not concern a pending intake file.
    Ignored,
}

/// Intake handling for created files under the watched root.
pub struct IntakeContext {
    root: PathBuf,
    processed_dir: PathBuf,
    errors_dir: PathBuf,
    worker: JobSpec,
    extensions: Vec<String>,
    settle: Duration,
    notifier: Arc<dyn Notifier>,
    notify: NotifySettings,
}

impl IntakeContext {
    /// Prepares intake under `root`, creating the processed and errors
    /// areas when absent.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Prepare`] when either area cannot be created.
    pub fn prepare(
        root: PathBuf,
        worker: JobSpec,
        extensions: Vec<String>,
        settle: Duration,
        notifier: Arc<dyn Notifier>,
        notify: NotifySettings,
    ) -> Result<Self, WatchError> {
        let processed_dir = root.join(PROCESSED_DIR);
        let errors_dir = root.join(ERRORS_DIR);
        for dir in [&processed_dir, &errors_dir] {
            fs::create_dir_all(dir).map_err(|source| WatchError::Prepare {
                root: root.clone(),
                source,
            })?;
        }
        Ok(Self {
            root,
            processed_dir,
            errors_dir,
            worker,
            extensions,
            settle,
            notifier,
            notify,
        })
    }

    /// Handles one created path.
    ///
    /// Directories, vanished files, and files already inside the processed
    /// or errors areas are ignored. A recognised input is handed to one
    /// worker run with the file path as its final argument; the run's
    /// outcome decides between the processed move and quarantine. An
    /// unrecognised extension quarantines immediately.
    ///
    /// # Errors
    ///
    /// Returns a [`WatchError`] when the worker cannot be spawned or
    /// supervised. Spawn failures quarantine the input first: a worker
    /// binary that cannot launch is a deployment problem that must halt
    /// intake.
    pub fn process(&self, path: &Path) -> Result<IntakeOutcome, WatchError> {
        if path.starts_with(&self.processed_dir) || path.starts_with(&self.errors_dir) {
            return Ok(IntakeOutcome::Ignored);
        }
        // Let slow writers finish before the worker reads the file.
        thread::sleep(self.settle);
        match fs::metadata(path) {
            Ok(metadata) if metadata.is_dir() => return Ok(IntakeOutcome::Ignored),
            Ok(_) => {}
            Err(_) => {
                debug!(
                    target: WATCH_TARGET,
                    path = %path.display(),
                    "created path vanished before intake"
                );
                return Ok(IntakeOutcome::Ignored);
            }
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !self.recognises(path) {
            info!(
                target: WATCH_TARGET,
                file = %file_name,
                "unrecognised document type; quarantining"
            );
            self.notifier.notify(&Notification::new(
                &self.notify.from,
                &self.notify.to,
                format!("[EDI] File NOT PROCESSED: {file_name}"),
                format!(
                    "Filename: {}\nStatus Message: Unrecognised file extension.\nDate Time: {}\n",
                    path.display(),
                    timestamp()
                ),
            ));
            self.quarantine(path);
            return Ok(IntakeOutcome::Quarantined);
        }

        self.notifier.notify(&Notification::new(
            &self.notify.from,
            &self.notify.to,
            format!("[EDI] File Received: {file_name}"),
            format!(
                "Filename: {}\nStatus Message: File being passed to {}.\nDate Time: {}\n",
                path.display(),
                self.worker.command(),
                timestamp()
            ),
        ));

        let spec = self.worker.clone().arg(path.to_string_lossy());
        let mut job = match Job::spawn(spec) {
            Ok(job) => job,
            Err(source) => {
                self.notifier.notify(&Notification::new(
                    &self.notify.from,
                    &self.notify.to,
                    "[EDI] FATAL ERROR",
                    format!(
                        "Filename: {}\nFatal Error: {source}\nDate Time: {}\n",
                        path.display(),
                        timestamp()
                    ),
                ));
                self.quarantine(path);
                return Err(WatchError::Job(source));
            }
        };
        let outcome = job.await_exit()?;
        if outcome.success() {
            info!(
                target: WATCH_TARGET,
                file = %file_name,
                "document processed"
            );
            self.promote(path);
            Ok(IntakeOutcome::Processed)
        } else {
            warn!(
                target: WATCH_TARGET,
                file = %file_name,
                outcome = %outcome,
                "worker rejected document; quarantining"
            );
            self.notifier.notify(&Notification::new(
                &self.notify.from,
                &self.notify.to,
                "[EDI] IMPORT ERROR",
                format!(
                    "Filename: {}\nError: {} returned a bad exit status, {outcome}\nDate Time: {}\n",
                    path.display(),
                    self.worker.command(),
                    timestamp()
                ),
            ));
            self.quarantine(path);
            Ok(IntakeOutcome::Quarantined)
        }
    }

    fn recognises(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| {
                self.extensions
                    .iter()
                    .any(|recognised| recognised.eq_ignore_ascii_case(extension))
            })
    }

    fn promote(&self, path: &Path) {
        self.relocate(path, &self.processed_dir);
    }

    fn quarantine(&self, path: &Path) {
        self.relocate(path, &self.errors_dir);
    }

    fn relocate(&self, path: &Path, area: &Path) {
        let Some(file_name) = path.file_name() else {
            return;
        };
        let destination = area.join(file_name);
        if let Err(error) = remove_existing(&destination) {
            warn!(
                target: WATCH_TARGET,
                path = %destination.display(),
                error = %error,
                "failed to clear previous copy in intake area"
            );
        }
        if let Err(error) = fs::rename(path, &destination) {
            warn!(
                target: WATCH_TARGET,
                from = %path.display(),
                to = %destination.display(),
                error = %error,
                "failed to relocate intake file"
            );
        }
    }

    /// Watched root this intake serves.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn remove_existing(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CollectingNotifier {
        sent: Mutex<Vec<Notification>>,
    }

    impl CollectingNotifier {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }

        fn subjects(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|notification| notification.subject.clone())
                .collect()
        }

        fn bodies(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|notification| notification.body.clone())
                .collect()
        }
    }

    impl Notifier for CollectingNotifier {
        fn notify(&self, notification: &Notification) {
            self.sent.lock().unwrap().push(notification.clone());
        }
    }

    fn context(
        root: &Path,
        worker_script: &str,
        notifier: Arc<CollectingNotifier>,
    ) -> IntakeContext {
        IntakeContext::prepare(
            root.to_path_buf(),
            JobSpec::new("/bin/sh").args(["-c", worker_script, "sh"]),
            vec!["xml".to_string(), "json".to_string()],
            Duration::from_millis(10),
            notifier,
            NotifySettings::default(),
        )
        .expect("prepare intake")
    }

    fn drop_file(root: &Path, name: &str) -> PathBuf {
        let path = root.join(name);
        fs::write(&path, b"<order/>").expect("write intake file");
        path
    }

    #[test]
    fn successful_worker_moves_the_file_to_processed() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = CollectingNotifier::new();
        let intake = context(dir.path(), "exit 0", Arc::clone(&notifier));
        let path = drop_file(dir.path(), "ORDER_G41_PROJ1_12345.xml");

        let outcome = intake.process(&path).unwrap();

        assert_eq!(outcome, IntakeOutcome::Processed);
        assert!(!path.exists());
        assert!(dir.path().join("processed/ORDER_G41_PROJ1_12345.xml").exists());
        assert!(!dir.path().join("errors/ORDER_G41_PROJ1_12345.xml").exists());
        assert_eq!(
            notifier.subjects(),
            vec!["[EDI] File Received: ORDER_G41_PROJ1_12345.xml".to_string()]
        );
    }

    #[test]
    fn worker_receives_the_file_path_as_final_argument() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = CollectingNotifier::new();
        let marker = dir.path().join("seen-argument");
        let script = format!("printf '%s' \"$1\" > {}", marker.display());
        let intake = context(dir.path(), &script, notifier);
        let path = drop_file(dir.path(), "ORDER_G41_PROJ1_12345.xml");
        let expected = path.display().to_string();

        let outcome = intake.process(&path).unwrap();

        assert_eq!(outcome, IntakeOutcome::Processed);
        assert_eq!(fs::read_to_string(&marker).unwrap(), expected);
    }

    #[test]
    fn failing_worker_quarantines_and_notifies_with_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = CollectingNotifier::new();
        let intake = context(dir.path(), "exit 2", Arc::clone(&notifier));
        let path = drop_file(dir.path(), "ORDER_G41_PROJ1_12345.xml");

        let outcome = intake.process(&path).unwrap();

        assert_eq!(outcome, IntakeOutcome::Quarantined);
        assert!(!path.exists());
        assert!(dir.path().join("errors/ORDER_G41_PROJ1_12345.xml").exists());
        assert!(!dir.path().join("processed/ORDER_G41_PROJ1_12345.xml").exists());

        let subjects = notifier.subjects();
        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects[1], "[EDI] IMPORT ERROR");
        let body = &notifier.bodies()[1];
        assert!(body.contains("ORDER_G41_PROJ1_12345.xml"));
        assert!(body.contains("exit status 2"));
    }

    #[test]
    fn unrecognised_extension_quarantines_without_a_worker_run() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = CollectingNotifier::new();
        // A worker run would leave a marker; its absence proves no run.
        let marker = dir.path().join("ran");
        let script = format!("touch {}", marker.display());
        let intake = context(dir.path(), &script, Arc::clone(&notifier));
        let path = drop_file(dir.path(), "notes.txt");

        let outcome = intake.process(&path).unwrap();

        assert_eq!(outcome, IntakeOutcome::Quarantined);
        assert!(dir.path().join("errors/notes.txt").exists());
        assert!(!marker.exists());
        assert!(notifier.subjects()[0].starts_with("[EDI] File NOT PROCESSED"));
    }

    #[test]
    fn spawn_failure_is_fatal_and_quarantines_first() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = CollectingNotifier::new();
        let intake = IntakeContext::prepare(
            dir.path().to_path_buf(),
            JobSpec::new("/nonexistent/edigate-import"),
            vec!["xml".to_string()],
            Duration::from_millis(10),
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            NotifySettings::default(),
        )
        .unwrap();
        let path = drop_file(dir.path(), "ORDER_G41_PROJ1_12345.xml");

        let error = intake.process(&path).unwrap_err();

        assert!(matches!(error, WatchError::Job(_)));
        assert!(dir.path().join("errors/ORDER_G41_PROJ1_12345.xml").exists());
        assert!(notifier.subjects().contains(&"[EDI] FATAL ERROR".to_string()));
    }

    #[test]
    fn files_already_inside_intake_areas_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = CollectingNotifier::new();
        let intake = context(dir.path(), "exit 0", Arc::clone(&notifier));
        let inside = dir.path().join("processed/ORDER_G41_PROJ1_12345.xml");
        fs::write(&inside, b"<order/>").unwrap();

        let outcome = intake.process(&inside).unwrap();

        assert_eq!(outcome, IntakeOutcome::Ignored);
        assert!(inside.exists());
        assert!(notifier.subjects().is_empty());
    }

    #[test]
    fn directories_and_vanished_paths_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = CollectingNotifier::new();
        let intake = context(dir.path(), "exit 0", notifier);

        let sub = dir.path().join("incoming");
        fs::create_dir(&sub).unwrap();
        assert_eq!(intake.process(&sub).unwrap(), IntakeOutcome::Ignored);

        let ghost = dir.path().join("already-moved.xml");
        assert_eq!(intake.process(&ghost).unwrap(), IntakeOutcome::Ignored);
    }
}
