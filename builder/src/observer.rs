//! Build progress reporting.
//!
//! Stages report what they do through a [`BuildObserver`] handed to them at
//! construction. [`TracingObserver`] forwards every event to `tracing`;
//! [`RecordingObserver`] keeps them in memory so callers can inspect what a
//! build touched.

use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{debug, info};

use crate::error::Stage;

/// Something a build stage did or decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    StageStarted(Stage),
    /// The stage does not apply to this package.
    StageSkipped { stage: Stage, reason: String },
    /// A file was written or rewritten.
    FileWritten { stage: Stage, path: PathBuf },
    /// A file was inspected and left as is.
    FileUnchanged { stage: Stage, path: PathBuf },
    /// A `.link` file's stored checksum does not match the included file.
    LinkOutdated { link_path: PathBuf, included_path: String },
    StageFinished { stage: Stage, written: usize },
}

/// Receives build events. Implementations must tolerate calls from
/// several worker threads.
pub trait BuildObserver: Send + Sync {
    fn on_event(&self, event: &BuildEvent);
}

/// Logs build events with `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl BuildObserver for TracingObserver {
    fn on_event(&self, event: &BuildEvent) {
        match event {
            BuildEvent::StageStarted(stage) => debug!(%stage, "stage started"),
            BuildEvent::StageSkipped { stage, reason } => {
                debug!(%stage, reason = reason.as_str(), "stage skipped");
            }
            BuildEvent::FileWritten { stage, path } => {
                debug!(%stage, path = %path.display(), "file written");
            }
            BuildEvent::FileUnchanged { stage, path } => {
                debug!(%stage, path = %path.display(), "file unchanged");
            }
            BuildEvent::LinkOutdated {
                link_path,
                included_path,
            } => {
                info!(
                    link = %link_path.display(),
                    included = included_path.as_str(),
                    "linked file is outdated"
                );
            }
            BuildEvent::StageFinished { stage, written } => {
                info!(%stage, written, "stage finished");
            }
        }
    }
}

/// Stores every event it receives.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<BuildEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the events received so far.
    pub fn events(&self) -> Vec<BuildEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Paths written by `stage`, in the order they were reported.
    pub fn written(&self, stage: Stage) -> Vec<PathBuf> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                BuildEvent::FileWritten { stage: s, path } if s == stage => Some(path),
                _ => None,
            })
            .collect()
    }
}

impl BuildObserver for RecordingObserver {
    fn on_event(&self, event: &BuildEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_observer_filters_by_stage() {
        let observer = RecordingObserver::new();
        observer.on_event(&BuildEvent::StageStarted(Stage::Fields));
        observer.on_event(&BuildEvent::FileWritten {
            stage: Stage::Fields,
            path: "fields/ecs.yml".into(),
        });
        observer.on_event(&BuildEvent::FileWritten {
            stage: Stage::Mappings,
            path: "manifest.yml".into(),
        });

        assert_eq!(observer.events().len(), 3);
        assert_eq!(observer.written(Stage::Fields), vec![PathBuf::from("fields/ecs.yml")]);
    }
}
