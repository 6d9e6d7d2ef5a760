use crate::domain::{Event, ProgressEvent, RepoRecord};
use std::collections::HashMap;

/// Progress shown on a single repository row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowProgress {
    pub task: String,
    pub percent: u8,
}

/// Read-only projection of dispatcher events for UI consumption
#[derive(Debug, Default)]
pub struct ReadProjection {
    /// Records as last loaded from the store, ordered by name
    pub records: Vec<RepoRecord>,

    /// Latest progress per folder
    pub progress: HashMap<String, RowProgress>,

    /// Messages not yet shown to the user
    pub notices: Vec<String>,

    /// A terminal operation happened since the records were loaded
    pub needs_reload: bool,

    last_sequence: Option<u64>,
}

impl ReadProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an event to update the projection
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::Refresh => {
                self.needs_reload = true;
            }

            Event::Progress(progress) => {
                self.apply_progress(progress);
            }

            Event::Notice { message, .. } => {
                self.notices.push(message.clone());
            }
        }
    }

    /// Record a progress event unless it is older than one already applied.
    /// Returns whether the event was applied.
    pub fn apply_progress(&mut self, event: &ProgressEvent) -> bool {
        if self.last_sequence.is_some_and(|last| event.sequence <= last) {
            return false;
        }
        self.last_sequence = Some(event.sequence);
        self.progress.insert(
            event.receiver_id.clone(),
            RowProgress {
                task: event.task.clone(),
                percent: event.percent,
            },
        );
        true
    }

    /// Replace the record list after a reload.
    /// Progress of rows no longer pending is dropped.
    pub fn replace_records(&mut self, records: Vec<RepoRecord>) {
        self.progress.retain(|folder, _| {
            records
                .iter()
                .any(|record| &record.folder == folder && record.state.is_pending())
        });
        self.records = records;
        self.needs_reload = false;
    }

    /// Take the pending notices
    pub fn drain_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    /// Progress for a row, if an operation is running on it
    pub fn progress_for(&self, folder: &str) -> Option<&RowProgress> {
        self.progress.get(folder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RepoState;

    fn progress(folder: &str, percent: u8, sequence: u64) -> Event {
        Event::Progress(ProgressEvent {
            receiver_id: folder.to_string(),
            task: "Receiving objects".to_string(),
            percent,
            sequence,
        })
    }

    #[test]
    fn test_out_of_order_progress_is_dropped() {
        let mut projection = ReadProjection::new();
        projection.apply(&progress("a", 10, 1));
        projection.apply(&progress("a", 20, 3));
        projection.apply(&progress("a", 15, 2));
        projection.apply(&progress("a", 20, 3));

        assert_eq!(projection.progress_for("a").map(|p| p.percent), Some(20));
    }

    #[test]
    fn test_displayed_percent_never_regresses_under_shuffle() {
        // Delivery order differs from emission order
        let emitted: Vec<(u8, u64)> = (0..=20).map(|i| (i * 5, u64::from(i))).collect();
        let delivered = [0, 2, 1, 5, 3, 4, 8, 6, 7, 9, 10, 14, 11, 12, 13, 15, 20, 16, 17, 18, 19];

        let mut projection = ReadProjection::new();
        let mut shown = 0;
        for index in delivered {
            let (percent, sequence) = emitted[index];
            projection.apply(&progress("a", percent, sequence));
            let now = projection.progress_for("a").map(|p| p.percent).unwrap_or(0);
            assert!(now >= shown);
            shown = now;
        }
        assert_eq!(shown, 100);
    }

    #[test]
    fn test_refresh_and_reload() {
        let mut projection = ReadProjection::new();
        projection.apply(&progress("busy", 40, 1));
        projection.apply(&progress("done", 100, 2));
        projection.apply(&Event::Refresh);
        assert!(projection.needs_reload);

        let mut busy = RepoRecord::new("busy", "https://x/busy.git", None);
        busy.folder = "busy".to_string();
        busy.state = RepoState::Busy;
        let mut done = RepoRecord::new("done", "https://x/done.git", None);
        done.folder = "done".to_string();
        done.state = RepoState::Local;

        projection.replace_records(vec![busy, done]);
        assert!(!projection.needs_reload);
        assert!(projection.progress_for("busy").is_some());
        assert!(projection.progress_for("done").is_none());
    }

    #[test]
    fn test_notices_are_drained_once() {
        let mut projection = ReadProjection::new();
        projection.apply(&Event::Notice {
            folder: "a".to_string(),
            message: "Pull done.".to_string(),
        });
        assert_eq!(projection.drain_notices(), vec!["Pull done.".to_string()]);
        assert!(projection.drain_notices().is_empty());
    }
}
