//! Progress reporting for navigator and batch runs
//!
//! Defines the `ProgressReporter` trait for lifecycle events, a no-op
//! implementation, and a channel-backed reporter for callers that want a
//! stream of events.

use std::time::Duration;
use tokio::sync::mpsc;

/// Trait for reporting pipeline progress at key lifecycle events
///
/// Implementations can send updates to channels, log, update a UI, etc.
/// Calls happen inline on the driving task and must not block.
pub trait ProgressReporter: Send + Sync {
    /// A chapter step is about to run
    fn report_chapter_started(&self, step: usize, identifier: &str);

    /// A chapter step produced a result
    fn report_chapter_completed(&self, step: usize, identifier: &str, elapsed: Duration);

    /// A chapter step failed after retries
    fn report_chapter_failed(&self, step: usize, identifier: &str, error: &str);

    /// A batch is about to be dispatched (1-based index)
    fn report_batch_started(&self, batch: usize, total_batches: usize, size: usize);

    /// A batch settled
    fn report_batch_completed(&self, batch: usize, succeeded: usize, failed: usize);

    /// The batch semaphore was resized
    fn report_concurrency_changed(&self, old: usize, new: usize, reason: &str);

    /// The run finished with `processed` results
    fn report_completed(&self, processed: usize);
}

/// Progress reporter that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgress;

impl ProgressReporter for NoOpProgress {
    #[inline(always)]
    fn report_chapter_started(&self, _step: usize, _identifier: &str) {}

    #[inline(always)]
    fn report_chapter_completed(&self, _step: usize, _identifier: &str, _elapsed: Duration) {}

    #[inline(always)]
    fn report_chapter_failed(&self, _step: usize, _identifier: &str, _error: &str) {}

    #[inline(always)]
    fn report_batch_started(&self, _batch: usize, _total_batches: usize, _size: usize) {}

    #[inline(always)]
    fn report_batch_completed(&self, _batch: usize, _succeeded: usize, _failed: usize) {}

    #[inline(always)]
    fn report_concurrency_changed(&self, _old: usize, _new: usize, _reason: &str) {}

    #[inline(always)]
    fn report_completed(&self, _processed: usize) {}
}

/// Owned progress event, as emitted by [`ChannelProgress`]
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    ChapterStarted {
        step: usize,
        identifier: String,
    },
    ChapterCompleted {
        step: usize,
        identifier: String,
        elapsed: Duration,
    },
    ChapterFailed {
        step: usize,
        identifier: String,
        error: String,
    },
    BatchStarted {
        batch: usize,
        total_batches: usize,
        size: usize,
    },
    BatchCompleted {
        batch: usize,
        succeeded: usize,
        failed: usize,
    },
    ConcurrencyChanged {
        old: usize,
        new: usize,
        reason: String,
    },
    Completed {
        processed: usize,
    },
}

/// Forwards every event into an unbounded channel
///
/// Events sent after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

impl ProgressReporter for ChannelProgress {
    fn report_chapter_started(&self, step: usize, identifier: &str) {
        self.send(ProgressEvent::ChapterStarted {
            step,
            identifier: identifier.to_string(),
        });
    }

    fn report_chapter_completed(&self, step: usize, identifier: &str, elapsed: Duration) {
        self.send(ProgressEvent::ChapterCompleted {
            step,
            identifier: identifier.to_string(),
            elapsed,
        });
    }

    fn report_chapter_failed(&self, step: usize, identifier: &str, error: &str) {
        self.send(ProgressEvent::ChapterFailed {
            step,
            identifier: identifier.to_string(),
            error: error.to_string(),
        });
    }

    fn report_batch_started(&self, batch: usize, total_batches: usize, size: usize) {
        self.send(ProgressEvent::BatchStarted {
            batch,
            total_batches,
            size,
        });
    }

    fn report_batch_completed(&self, batch: usize, succeeded: usize, failed: usize) {
        self.send(ProgressEvent::BatchCompleted {
            batch,
            succeeded,
            failed,
        });
    }

    fn report_concurrency_changed(&self, old: usize, new: usize, reason: &str) {
        self.send(ProgressEvent::ConcurrencyChanged {
            old,
            new,
            reason: reason.to_string(),
        });
    }

    fn report_completed(&self, processed: usize) {
        self.send(ProgressEvent::Completed { processed });
    }
}
