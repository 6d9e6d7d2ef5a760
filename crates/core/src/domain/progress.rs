//! Progress reporting for long running git operations.
//!
//! The git capability reports work in raw units (objects received, files
//! checked out). [`ProgressReporter`] turns those into coarse percentage
//! events, at most one per 5% step, each stamped with a process-wide
//! sequence number so consumers can drop late or duplicated deliveries.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Minimum percentage step between two emitted events of the same task
pub const PROGRESS_STEP: u8 = 5;

/// Progress notification routed to the row identified by `receiver_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Folder of the repository the operation runs on
    pub receiver_id: String,
    /// Free text phase name ("Receiving objects", ...)
    pub task: String,
    /// 0..=100
    pub percent: u8,
    /// Strictly increasing for the lifetime of the process
    pub sequence: u64,
}

/// Shared source of progress sequence numbers.
///
/// Clones share the same counter; create one per process and hand it to
/// everything that emits progress.
#[derive(Debug, Clone, Default)]
pub struct SequenceCounter(Arc<AtomicU64>);

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next sequence number
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// Receiver of unit based progress from the git capability
pub trait ProgressSink {
    /// A new phase starts; `total_units` may be 0 when unknown
    fn begin_task(&mut self, task: &str, total_units: u64);

    /// `completed` more units of the current phase are done
    fn update(&mut self, completed: u64);

    /// The current phase is over
    fn end_task(&mut self) {}
}

/// Sink that ignores everything, for callers that do not track progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn begin_task(&mut self, _task: &str, _total_units: u64) {}
    fn update(&mut self, _completed: u64) {}
}

/// Throttles unit progress into [`ProgressEvent`]s and hands them to `emit`
pub struct ProgressReporter<F> {
    receiver_id: String,
    sequence: SequenceCounter,
    emit: F,
    task: String,
    total_units: u64,
    current_units: u64,
    last_percent: u8,
}

impl<F> ProgressReporter<F>
where
    F: FnMut(ProgressEvent),
{
    pub fn new(receiver_id: impl Into<String>, sequence: SequenceCounter, emit: F) -> Self {
        Self {
            receiver_id: receiver_id.into(),
            sequence,
            emit,
            task: String::new(),
            total_units: 0,
            current_units: 0,
            last_percent: 0,
        }
    }

    fn send(&mut self, percent: u8) {
        let event = ProgressEvent {
            receiver_id: self.receiver_id.clone(),
            task: self.task.clone(),
            percent,
            sequence: self.sequence.next(),
        };
        (self.emit)(event);
    }
}

impl<F> ProgressSink for ProgressReporter<F>
where
    F: FnMut(ProgressEvent),
{
    fn begin_task(&mut self, task: &str, total_units: u64) {
        self.task = task.to_string();
        self.total_units = total_units;
        self.current_units = 0;
        self.last_percent = 0;
        self.send(0);
    }

    fn update(&mut self, completed: u64) {
        // No total, no meaningful percentage
        if self.total_units == 0 {
            return;
        }
        self.current_units = self.current_units.saturating_add(completed);
        let percent = percent_of(self.current_units, self.total_units);
        let stepped = percent >= self.last_percent.saturating_add(PROGRESS_STEP);
        let finished = percent == 100 && self.last_percent < 100;
        if stepped || finished {
            self.last_percent = percent;
            self.send(percent);
        }
    }
}

fn percent_of(current: u64, total: u64) -> u8 {
    let percent = u128::from(current) * 100 / u128::from(total);
    percent.min(100) as u8
}
