//! Error types for the change watcher.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use edigate_process::JobError;

/// Errors surfaced while installing or running the watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The filesystem notification backend could not be initialised.
    #[error("failed to initialise filesystem watcher: {source}")]
    Init {
        /// Underlying backend error.
        #[source]
        source: notify::Error,
    },
    /// A watch could not be registered on the root.
    #[error("failed to watch '{path}': {source}")]
    Watch {
        /// Path that could not be watched.
        path: PathBuf,
        /// Underlying backend error.
        #[source]
        source: notify::Error,
    },
    /// The watched root does not exist.
    #[error("watched root '{path}' does not exist")]
    MissingRoot {
        /// Configured root.
        path: PathBuf,
    },
    /// The exclusion pattern did not parse.
    #[error("invalid exclusion pattern '{pattern}': {source}")]
    Exclude {
        /// The rejected pattern.
        pattern: String,
        /// Underlying parse error.
        #[source]
        source: regex::Error,
    },
    /// The quarantine directories could not be created.
    #[error("failed to prepare intake directories under '{root}': {source}")]
    Prepare {
        /// Watched root.
        root: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A worker could not be spawned or supervised; fatal to the watcher.
    #[error(transparent)]
    Job(#[from] JobError),
    /// The event stream itself reported a failure.
    #[error("filesystem event stream failed: {source}")]
    EventStream {
        /// Underlying backend error.
        #[source]
        source: notify::Error,
    },
}
