//! End-to-end intake through a real filesystem watcher.

#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use edigate_config::NotifySettings;
use edigate_notify::LogNotifier;
use edigate_process::JobSpec;
use edigate_watch::{WatchOptions, run_watch};

fn start_watch(root: PathBuf, worker_script: &str) {
    let options = WatchOptions {
        root,
        exclude: Some(r"\.tmp$".to_string()),
        worker: JobSpec::new("/bin/sh").args(["-c", worker_script, "sh"]),
        debounce: Duration::from_millis(50),
        settle: Duration::from_millis(20),
        extensions: vec!["xml".to_string()],
        notify: NotifySettings::default(),
    };
    thread::spawn(move || run_watch(options, Arc::new(LogNotifier::new())));
    // Give the watcher time to install its watches before dropping files.
    thread::sleep(Duration::from_millis(300));
}

fn wait_for(path: &Path, deadline: Duration) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if path.exists() {
            return true;
        }
        thread::sleep(Duration::from_millis(25));
    }
    false
}

#[test]
fn created_document_is_processed_through_one_worker_run() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path().to_path_buf();
    start_watch(root.clone(), "exit 0");

    fs::write(root.join("ORDER_G41_PROJ1_12345.xml"), b"<order/>").expect("drop document");

    let processed = root.join("processed/ORDER_G41_PROJ1_12345.xml");
    assert!(
        wait_for(&processed, Duration::from_secs(10)),
        "document should reach the processed area"
    );
    assert!(!root.join("ORDER_G41_PROJ1_12345.xml").exists());
    assert!(!root.join("errors/ORDER_G41_PROJ1_12345.xml").exists());
}

#[test]
fn rejected_document_is_quarantined_through_the_watcher() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path().to_path_buf();
    start_watch(root.clone(), "exit 2");

    fs::write(root.join("ORDER_G41_PROJ1_12345.xml"), b"<order/>").expect("drop document");

    let quarantined = root.join("errors/ORDER_G41_PROJ1_12345.xml");
    assert!(
        wait_for(&quarantined, Duration::from_secs(10)),
        "document should reach the errors area"
    );
    assert!(!root.join("processed/ORDER_G41_PROJ1_12345.xml").exists());
}

#[test]
fn excluded_paths_never_reach_intake() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = dir.path().to_path_buf();
    start_watch(root.clone(), "exit 0");

    fs::write(root.join("partial.tmp"), b"half written").expect("drop excluded file");

    thread::sleep(Duration::from_millis(800));
    assert!(root.join("partial.tmp").exists(), "excluded file stays put");
    assert!(!root.join("processed/partial.tmp").exists());
    assert!(!root.join("errors/partial.tmp").exists());
}
