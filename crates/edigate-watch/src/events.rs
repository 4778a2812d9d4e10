//! Event mapping, exclusion filtering, and the event thread.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, Sender};
use std::time::SystemTime;

use notify::EventKind;
use notify::event::ModifyKind;
use regex::Regex;
use tracing::{debug, error};

use crate::WATCH_TARGET;
use crate::errors::WatchError;
use crate::intake::IntakeContext;

/// A filesystem observation relevant to the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Path the event concerns.
    pub path: PathBuf,
    /// What happened to it.
    pub kind: ChangeKind,
    /// When the watcher observed it.
    pub observed_at: SystemTime,
}

/// The kinds of change the watcher reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
    Renamed,
    PermissionChanged,
}

/// Maps one raw notification into change events, one per affected path.
/// Notifications with no corresponding kind (access events and the like)
/// map to nothing.
pub(crate) fn map_event(event: &notify::Event) -> Vec<ChangeEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::Renamed,
        EventKind::Modify(ModifyKind::Metadata(_)) => ChangeKind::PermissionChanged,
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Remove(_) => ChangeKind::Removed,
        _ => return Vec::new(),
    };
    let observed_at = SystemTime::now();
    event
        .paths
        .iter()
        .map(|path| ChangeEvent {
            path: path.clone(),
            kind,
            observed_at,
        })
        .collect()
}

/// Caller-supplied pattern that removes events before any other handling.
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    pattern: Option<Regex>,
}

impl ExclusionFilter {
    /// Compiles the optional exclusion pattern.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Exclude`] when the pattern does not parse.
    pub fn from_pattern(pattern: Option<&str>) -> Result<Self, WatchError> {
        let pattern = match pattern {
            None => None,
            Some(raw) => Some(Regex::new(raw).map_err(|source| WatchError::Exclude {
                pattern: raw.to_string(),
                source,
            })?),
        };
        Ok(Self { pattern })
    }

    /// Whether events for this path are ignored entirely.
    #[must_use]
    pub fn excludes(&self, path: &Path) -> bool {
        self.pattern
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(&path.to_string_lossy()))
    }
}

/// Consumes raw notifications until the stream ends.
///
/// Excluded paths are dropped before the debounce logic ever sees them.
/// Created files go through intake inline; every surviving event forwards
/// its observation timestamp to the trigger loop.
pub(crate) fn run_event_thread(
    events: Receiver<notify::Result<notify::Event>>,
    filter: ExclusionFilter,
    intake: Option<IntakeContext>,
    changes: Sender<SystemTime>,
) -> Result<(), WatchError> {
    while let Ok(incoming) = events.recv() {
        let event = match incoming {
            Ok(event) => event,
            Err(source) => {
                error!(
                    target: WATCH_TARGET,
                    error = %source,
                    "filesystem event stream failed"
                );
                return Err(WatchError::EventStream { source });
            }
        };
        for change in map_event(&event) {
            if filter.excludes(&change.path) {
                debug!(
                    target: WATCH_TARGET,
                    path = %change.path.display(),
                    "ignoring event for excluded path"
                );
                continue;
            }
            debug!(
                target: WATCH_TARGET,
                path = %change.path.display(),
                kind = ?change.kind,
                "filesystem change observed"
            );
            if change.kind == ChangeKind::Created
                && let Some(context) = intake.as_ref()
            {
                context.process(&change.path)?;
            }
            if changes.send(change.observed_at).is_err() {
                // Trigger loop is gone; nothing left to feed.
                return Ok(());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, MetadataKind, ModifyKind, RenameMode};

    fn event(kind: EventKind, path: &str) -> notify::Event {
        let mut event = notify::Event::new(kind);
        event = event.add_path(PathBuf::from(path));
        event
    }

    #[test]
    fn maps_creation_and_removal() {
        let created = map_event(&event(EventKind::Create(CreateKind::File), "/drop/a.xml"));
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].kind, ChangeKind::Created);
        assert_eq!(created[0].path, PathBuf::from("/drop/a.xml"));

        let removed = map_event(&event(
            EventKind::Remove(notify::event::RemoveKind::File),
            "/drop/a.xml",
        ));
        assert_eq!(removed[0].kind, ChangeKind::Removed);
    }

    #[test]
    fn distinguishes_renames_and_permission_changes_from_writes() {
        let renamed = map_event(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Any)),
            "/drop/a.xml",
        ));
        assert_eq!(renamed[0].kind, ChangeKind::Renamed);

        let chmod = map_event(&event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            "/drop/a.xml",
        ));
        assert_eq!(chmod[0].kind, ChangeKind::PermissionChanged);

        let written = map_event(&event(
            EventKind::Modify(ModifyKind::Data(notify::event::DataChange::Content)),
            "/drop/a.xml",
        ));
        assert_eq!(written[0].kind, ChangeKind::Modified);
    }

    #[test]
    fn access_events_map_to_nothing() {
        let accessed = map_event(&event(
            EventKind::Access(notify::event::AccessKind::Read),
            "/drop/a.xml",
        ));
        assert!(accessed.is_empty());
    }

    #[test]
    fn exclusion_filter_matches_anywhere_in_the_path() {
        let filter = ExclusionFilter::from_pattern(Some(r"\.tmp$")).unwrap();
        assert!(filter.excludes(Path::new("/drop/partial.tmp")));
        assert!(!filter.excludes(Path::new("/drop/order.xml")));

        let none = ExclusionFilter::from_pattern(None).unwrap();
        assert!(!none.excludes(Path::new("/drop/partial.tmp")));
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        let error = ExclusionFilter::from_pattern(Some("[")).unwrap_err();
        assert!(matches!(error, WatchError::Exclude { .. }));
    }
}
