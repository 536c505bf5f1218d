//! Sequential chain walker
//!
//! Follows "next" links one item at a time. Every step runs under the retry
//! executor; a step that still fails either ends the run (the identifier does
//! not exist) or triggers fallback navigation until too many steps in a row
//! have failed.
//!
//! ```text
//! Idle -> Fetching(n) -> Advancing      -> Fetching(n + 1)
//!                     -> ErrorRecovery  -> Fetching(n + 1) | abort
//!                     -> Done
//! ```

use log::{debug, info, warn};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use super::progress::{NoOpProgress, ProgressReporter};
use super::retry::{RetryPolicy, with_retry};
use super::types::{ChainLink, NavigationReport, StopReason};
use crate::config::NavigatorConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::utils::{NAV_ADAPTIVE_DELAY_FACTOR, increment_sequence};

/// Where the navigator is in its run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigatorState {
    Idle,
    /// Running step n (1-based)
    Fetching(usize),
    /// Waiting before the next step
    Advancing,
    /// Backing off after a failed step
    ErrorRecovery,
    Done,
}

/// Picks the identifier to try after a step failed for good
pub trait FallbackRule: Send + Sync {
    fn next_after_failure(&self, failed: &str) -> Option<String>;
}

/// Bump the trailing sequence number: `.../chapter-7` becomes `.../chapter-8`
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialFallback;

impl FallbackRule for SequentialFallback {
    fn next_after_failure(&self, failed: &str) -> Option<String> {
        increment_sequence(failed)
    }
}

impl<F> FallbackRule for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn next_after_failure(&self, failed: &str) -> Option<String> {
        self(failed)
    }
}

pub struct ChapterNavigator {
    config: NavigatorConfig,
    policy: RetryPolicy,
    fallback: Box<dyn FallbackRule>,
    progress: Arc<dyn ProgressReporter>,
    state: NavigatorState,
}

impl std::fmt::Debug for ChapterNavigator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChapterNavigator")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ChapterNavigator {
    /// # Errors
    /// Returns a validation error for an invalid config.
    pub fn new(config: NavigatorConfig) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self {
            policy: RetryPolicy::from_config(&config.retry)?,
            config,
            fallback: Box::new(SequentialFallback),
            progress: Arc::new(NoOpProgress),
            state: NavigatorState::Idle,
        })
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: impl FallbackRule + 'static) -> Self {
        self.fallback = Box::new(fallback);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn state(&self) -> NavigatorState {
        self.state
    }

    /// Walk the chain from `start`, running `step` once per identifier
    ///
    /// Identifiers are processed at most once per run. The run ends when a
    /// result has no next link, the next link was already processed, the next
    /// identifier is not found, or `max_items` results were collected.
    ///
    /// # Errors
    /// Returns [`PipelineError::Navigation`] once `max_consecutive_errors`
    /// steps in a row have failed, or when no fallback identifier exists.
    pub async fn process_chapter_sequence<R, F, Fut>(
        &mut self,
        start: &str,
        mut step: F,
    ) -> PipelineResult<NavigationReport<R>>
    where
        R: ChainLink,
        F: FnMut(String) -> Fut,
        Fut: Future<Output = PipelineResult<R>>,
    {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        self.state = NavigatorState::Idle;
        info!("[{run_id}] Navigating chain from {start}");

        let mut processed: HashSet<String> = HashSet::new();
        let mut results: Vec<R> = Vec::new();
        let mut current = Some(start.to_string());
        let mut last_url: Option<String> = None;
        let mut average: Option<Duration> = None;
        let mut consecutive_errors: u32 = 0;
        let mut step_number = 0usize;
        let mut stop_reason = StopReason::EndOfChain;

        while let Some(identifier) = current.take() {
            if processed.contains(&identifier) {
                info!("[{run_id}] {identifier} was already processed, stopping");
                stop_reason = StopReason::Cycle;
                break;
            }

            step_number += 1;
            self.state = NavigatorState::Fetching(step_number);
            self.progress.report_chapter_started(step_number, &identifier);
            let step_started = Instant::now();
            let context = format!("chapter step {step_number} ({identifier})");

            let outcome = with_retry(&self.policy, &context, |_| {
                let pending = step(identifier.clone());
                async move { require_title(pending.await?) }
            })
            .await;

            match outcome {
                Ok(result) => {
                    let elapsed = step_started.elapsed();
                    consecutive_errors = 0;
                    average = Some(average.map_or(elapsed, |old| (old + elapsed) / 2));
                    self.progress
                        .report_chapter_completed(step_number, &identifier, elapsed);
                    debug!(
                        "[{run_id}] Step {step_number} done in {elapsed:?}: {}",
                        result.title().unwrap_or_default()
                    );

                    let next = result.next_identifier().map(str::to_string);
                    processed.insert(identifier.clone());
                    last_url = Some(identifier);
                    results.push(result);

                    if results.len() >= self.config.max_items {
                        info!("[{run_id}] Reached max_items ({})", self.config.max_items);
                        stop_reason = StopReason::MaxItems;
                        break;
                    }

                    let Some(next) = next else {
                        stop_reason = StopReason::EndOfChain;
                        break;
                    };

                    self.state = NavigatorState::Advancing;
                    tokio::time::sleep(self.step_delay(average.unwrap_or_default())).await;
                    current = Some(next);
                }
                Err(error) if error.is_not_found() => {
                    info!("[{run_id}] {identifier} not found, treating as end of chain");
                    stop_reason = StopReason::NotFound;
                    break;
                }
                Err(error) => {
                    consecutive_errors += 1;
                    self.state = NavigatorState::ErrorRecovery;
                    self.progress
                        .report_chapter_failed(step_number, &identifier, &error.to_string());
                    warn!(
                        "[{run_id}] Step {step_number} failed ({consecutive_errors}/{} in a row): {error}",
                        self.config.max_consecutive_errors
                    );

                    if consecutive_errors >= self.config.max_consecutive_errors {
                        self.state = NavigatorState::Done;
                        return Err(PipelineError::Navigation {
                            message: format!(
                                "{consecutive_errors} consecutive steps failed, last error: {error}"
                            ),
                            url: identifier,
                            step: step_number,
                        });
                    }

                    tokio::time::sleep(self.error_backoff(consecutive_errors)).await;

                    let Some(fallback) = self.fallback.next_after_failure(&identifier) else {
                        self.state = NavigatorState::Done;
                        return Err(PipelineError::Navigation {
                            message: format!("no fallback after failure: {error}"),
                            url: identifier,
                            step: step_number,
                        });
                    };
                    info!("[{run_id}] Falling back from {identifier} to {fallback}");
                    current = Some(fallback);
                }
            }
        }

        self.state = NavigatorState::Done;
        self.progress.report_completed(results.len());
        info!(
            "[{run_id}] Navigation finished: {} chapters, stopped on {stop_reason:?}",
            results.len()
        );

        Ok(NavigationReport {
            run_id,
            total_chapters: results.len(),
            results,
            start_url: start.to_string(),
            last_url,
            stop_reason,
            elapsed: started.elapsed(),
        })
    }

    /// Pause between successful steps
    fn step_delay(&self, average: Duration) -> Duration {
        if !self.config.adaptive_delay {
            return self.config.fixed_delay();
        }
        average
            .mul_f64(NAV_ADAPTIVE_DELAY_FACTOR)
            .clamp(self.config.min_delay(), self.config.max_delay())
    }

    /// `min(max_delay, base_delay * 2^consecutive)`
    fn error_backoff(&self, consecutive_errors: u32) -> Duration {
        let factor = 1u32.checked_shl(consecutive_errors).unwrap_or(u32::MAX);
        self.config
            .base_delay()
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.config.max_delay())
    }
}

fn require_title<R: ChainLink>(result: R) -> PipelineResult<R> {
    match result.title() {
        Some(title) if !title.trim().is_empty() => Ok(result),
        _ => Err(PipelineError::fatal("step result has no title")),
    }
}
