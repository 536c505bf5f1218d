//! Result and report types shared by the navigator and batch processor

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::error::PipelineResult;

/// A step result that knows its title and where the chain continues
pub trait ChainLink {
    /// Chapter title; a missing or blank title fails the step
    fn title(&self) -> Option<&str>;

    /// Identifier of the next item in the chain, if any
    fn next_identifier(&self) -> Option<&str>;
}

/// Expands a start identifier into the ordered list of chain items
pub trait ChainDiscovery: Send + Sync {
    fn discover<'a>(
        &'a self,
        start: &'a str,
        max_items: usize,
    ) -> BoxFuture<'a, PipelineResult<Vec<String>>>;
}

/// Where the navigator stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The last result declared no next link
    EndOfChain,
    /// The next link pointed at an already processed identifier
    Cycle,
    /// The next identifier does not exist
    NotFound,
    /// `max_items` results were collected
    MaxItems,
}

/// Outcome of a navigator run
#[derive(Debug, Clone, Serialize)]
pub struct NavigationReport<R> {
    pub run_id: Uuid,
    /// Results in chain order
    pub results: Vec<R>,
    pub total_chapters: usize,
    pub start_url: String,
    /// Last identifier that was processed successfully
    pub last_url: Option<String>,
    pub stop_reason: StopReason,
    pub elapsed: Duration,
}

/// A failed item, kept in place of its result
#[derive(Debug, Clone, Serialize)]
pub struct ItemError<T> {
    pub item: T,
    /// Position in the input list
    pub index: usize,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Settled outcome of one batch item
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ItemOutcome<T, R> {
    Success(R),
    Failed(ItemError<T>),
}

impl<T, R> ItemOutcome<T, R> {
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    #[must_use]
    pub fn success(&self) -> Option<&R> {
        match self {
            Self::Success(result) => Some(result),
            Self::Failed(_) => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&ItemError<T>> {
        match self {
            Self::Success(_) => None,
            Self::Failed(error) => Some(error),
        }
    }
}

/// Outcome of a batch run, one entry per input item in input order
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport<T, R> {
    pub run_id: Uuid,
    pub outcomes: Vec<ItemOutcome<T, R>>,
    pub succeeded: usize,
    pub failed: usize,
    /// Passes made over the items, 1 without retries
    pub passes: u32,
    /// Semaphore capacity when the run ended
    pub final_concurrency: usize,
    pub elapsed: Duration,
}

impl<T, R> BatchReport<T, R> {
    #[must_use]
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Fraction of items that succeeded, 0 for an empty run
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            0.0
        } else {
            self.succeeded as f64 / self.outcomes.len() as f64
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &ItemError<T>> {
        self.outcomes.iter().filter_map(ItemOutcome::error)
    }

    pub fn successes(&self) -> impl Iterator<Item = &R> {
        self.outcomes.iter().filter_map(ItemOutcome::success)
    }
}
