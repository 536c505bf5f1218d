//! Batch processor
//!
//! Splits the input into fixed-size batches that run strictly one after
//! another. Items inside a batch are dispatched through the shared
//! [`AdaptiveSemaphore`] and joined all-settled, so one failing or panicking
//! item never takes its neighbours down: it becomes an [`ItemError`] at its
//! own index. Between batches the semaphore may be resized from the
//! statistics gathered while the previous batches ran.

use chrono::Utc;
use futures::FutureExt;
use futures::future::join_all;
use log::{debug, info, warn};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use super::adaptive;
use super::progress::{NoOpProgress, ProgressReporter};
use super::semaphore::AdaptiveSemaphore;
use super::types::{BatchReport, ChainDiscovery, ItemError, ItemOutcome};
use crate::config::BatchConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::utils::MAX_ERROR_MESSAGE_CHARS;
use crate::utils::string_utils::preview;

pub struct BatchProcessor {
    config: BatchConfig,
    semaphore: AdaptiveSemaphore,
    progress: Arc<dyn ProgressReporter>,
    discovery: Option<Arc<dyn ChainDiscovery>>,
    /// Batches dispatched over the processor's lifetime, drives the adaptive cadence
    batches_dispatched: AtomicUsize,
}

impl std::fmt::Debug for BatchProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("config", &self.config)
            .field("semaphore", &self.semaphore)
            .field("has_discovery", &self.discovery.is_some())
            .finish_non_exhaustive()
    }
}

impl BatchProcessor {
    /// # Errors
    /// Returns a validation error for an invalid config.
    pub fn new(config: BatchConfig) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self {
            semaphore: AdaptiveSemaphore::new(config.max_concurrency)?,
            config,
            progress: Arc::new(NoOpProgress),
            discovery: None,
            batches_dispatched: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn with_discovery(mut self, discovery: Arc<dyn ChainDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    #[must_use]
    pub fn semaphore(&self) -> &AdaptiveSemaphore {
        &self.semaphore
    }

    #[must_use]
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run `step(item, index)` for every item, one outcome per item in input order
    pub async fn process<T, R, F, Fut>(&self, items: Vec<T>, step: F) -> BatchReport<T, R>
    where
        T: Clone,
        F: Fn(T, usize) -> Fut,
        Fut: Future<Output = PipelineResult<R>>,
    {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!("[{run_id}] Processing {} items", items.len());

        let indexed: Vec<(usize, T)> = items.into_iter().enumerate().collect();
        let outcomes = self
            .run_pass(run_id, indexed, &step)
            .await
            .into_iter()
            .map(|(_, outcome)| outcome)
            .collect();

        self.finish(run_id, outcomes, 1, started)
    }

    /// Like [`process`](Self::process), re-running only failed items
    ///
    /// Makes up to `retry_attempts` passes with `retry_base_delay * 2^(pass-1)`
    /// between them. Each item keeps the outcome of its last pass.
    pub async fn process_with_retry<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        step: F,
    ) -> BatchReport<T, R>
    where
        T: Clone,
        F: Fn(T, usize) -> Fut,
        Fut: Future<Output = PipelineResult<R>>,
    {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!(
            "[{run_id}] Processing {} items with up to {} passes",
            items.len(),
            self.config.retry_attempts
        );

        let mut slots: Vec<Option<ItemOutcome<T, R>>> = items.iter().map(|_| None).collect();
        let mut pending: Vec<(usize, T)> = items.into_iter().enumerate().collect();
        let mut passes = 0u32;

        loop {
            passes += 1;
            let settled = self.run_pass(run_id, pending, &step).await;

            pending = Vec::new();
            for (index, outcome) in settled {
                if let ItemOutcome::Failed(error) = &outcome {
                    pending.push((index, error.item.clone()));
                }
                slots[index] = Some(outcome);
            }

            if pending.is_empty() || passes >= self.config.retry_attempts {
                break;
            }

            let delay = self.retry_delay(passes);
            info!(
                "[{run_id}] Retrying {} failed items (pass {}/{}) in {delay:?}",
                pending.len(),
                passes + 1,
                self.config.retry_attempts
            );
            tokio::time::sleep(delay).await;
        }

        let outcomes = slots.into_iter().flatten().collect();
        self.finish(run_id, outcomes, passes, started)
    }

    /// Process a chain starting at `start`
    ///
    /// With `discover` set the item list is expanded by the discovery
    /// collaborator first (capped at `max_items`); otherwise only `start` runs.
    ///
    /// # Errors
    /// Fails when discovery is requested without a collaborator, or when
    /// discovery itself fails.
    pub async fn process_chain<R, F, Fut>(
        &self,
        start: &str,
        discover: bool,
        step: F,
    ) -> PipelineResult<BatchReport<String, R>>
    where
        F: Fn(String, usize) -> Fut,
        Fut: Future<Output = PipelineResult<R>>,
    {
        let items = if discover {
            let discovery = self.discovery.as_ref().ok_or_else(|| {
                PipelineError::validation("chain discovery requested but no discovery is configured")
            })?;
            let mut items = discovery.discover(start, self.config.max_items).await?;
            items.truncate(self.config.max_items);
            if items.is_empty() {
                vec![start.to_string()]
            } else {
                items
            }
        } else {
            vec![start.to_string()]
        };

        debug!("Chain from {start} expanded to {} items", items.len());
        Ok(self.process_with_retry(items, step).await)
    }

    async fn run_pass<T, R, F, Fut>(
        &self,
        run_id: Uuid,
        items: Vec<(usize, T)>,
        step: &F,
    ) -> Vec<(usize, ItemOutcome<T, R>)>
    where
        T: Clone,
        F: Fn(T, usize) -> Fut,
        Fut: Future<Output = PipelineResult<R>>,
    {
        let batch_size = self.config.batch_size;
        let total_batches = items.len().div_ceil(batch_size);
        let mut settled = Vec::with_capacity(items.len());
        let mut remaining = items.into_iter().peekable();
        let mut batch_number = 0;

        while remaining.peek().is_some() {
            let batch: Vec<(usize, T)> = remaining.by_ref().take(batch_size).collect();
            batch_number += 1;
            self.progress
                .report_batch_started(batch_number, total_batches, batch.len());
            debug!(
                "[{run_id}] Batch {batch_number}/{total_batches} with {} items",
                batch.len()
            );

            let results = join_all(
                batch
                    .into_iter()
                    .map(|(index, item)| self.run_item(run_id, index, item, step)),
            )
            .await;

            let failed = results.iter().filter(|(_, outcome)| outcome.is_error()).count();
            self.progress
                .report_batch_completed(batch_number, results.len() - failed, failed);
            settled.extend(results);

            let dispatched = self.batches_dispatched.fetch_add(1, Ordering::Relaxed) + 1;
            if remaining.peek().is_none() {
                break;
            }

            if self.config.adaptive.enabled
                && dispatched % self.config.adaptive.check_interval == 0
            {
                self.adjust_concurrency(run_id);
            }
            if self.config.batch_delay_ms > 0 {
                tokio::time::sleep(self.config.batch_delay()).await;
            }
        }

        settled
    }

    async fn run_item<T, R, F, Fut>(
        &self,
        run_id: Uuid,
        index: usize,
        item: T,
        step: &F,
    ) -> (usize, ItemOutcome<T, R>)
    where
        T: Clone,
        F: Fn(T, usize) -> Fut,
        Fut: Future<Output = PipelineResult<R>>,
    {
        let input = item.clone();
        let settled = AssertUnwindSafe(
            self.semaphore
                .run(async move { step(input, index).await }),
        )
        .catch_unwind()
        .await;

        let message = match settled {
            Ok(Ok(Ok(result))) => return (index, ItemOutcome::Success(result)),
            Ok(Ok(Err(error)) | Err(error)) => error.to_string(),
            Err(payload) => format!("step panicked: {}", panic_message(payload.as_ref())),
        };

        warn!("[{run_id}] Item {index} failed: {message}");
        (
            index,
            ItemOutcome::Failed(ItemError {
                item,
                index,
                message: preview(&message, MAX_ERROR_MESSAGE_CHARS),
                timestamp: Utc::now(),
            }),
        )
    }

    fn adjust_concurrency(&self, run_id: Uuid) {
        let window = self.semaphore.take_window();
        let current = self.semaphore.capacity();
        let Some(adjustment) = adaptive::evaluate(&self.config.adaptive, current, &window) else {
            debug!(
                "[{run_id}] Concurrency stays at {current} (peak queue {}, utilization {:.2}, wait {:?})",
                window.max_queue_length, window.mean_utilization, window.average_wait
            );
            return;
        };

        match self.semaphore.resize(adjustment.new) {
            Ok(()) => {
                info!(
                    "[{run_id}] Concurrency {} -> {}: {}",
                    adjustment.old, adjustment.new, adjustment.reason
                );
                self.progress.report_concurrency_changed(
                    adjustment.old,
                    adjustment.new,
                    &adjustment.reason,
                );
            }
            Err(e) => warn!("[{run_id}] Failed to resize concurrency: {e}"),
        }
    }

    fn retry_delay(&self, completed_passes: u32) -> Duration {
        let factor = 1u32
            .checked_shl(completed_passes.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.config
            .retry_base_delay()
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
    }

    fn finish<T, R>(
        &self,
        run_id: Uuid,
        outcomes: Vec<ItemOutcome<T, R>>,
        passes: u32,
        started: Instant,
    ) -> BatchReport<T, R> {
        let failed = outcomes.iter().filter(|outcome| outcome.is_error()).count();
        let succeeded = outcomes.len() - failed;
        self.progress.report_completed(succeeded);
        self.semaphore.log_stats(&format!("[{run_id}] semaphore"));
        info!(
            "[{run_id}] Batch run finished: {succeeded} succeeded, {failed} failed in {passes} pass(es)"
        );

        BatchReport {
            run_id,
            outcomes,
            succeeded,
            failed,
            passes,
            final_concurrency: self.semaphore.capacity(),
            elapsed: started.elapsed(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::progress::{ChannelProgress, ProgressEvent};
    use crate::error::FailureKind;
    use futures::future::BoxFuture;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn config(batch_size: usize, max_concurrency: usize) -> BatchConfig {
        BatchConfig {
            batch_size,
            max_concurrency,
            batch_delay_ms: 0,
            ..BatchConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_keep_input_order() {
        let processor = BatchProcessor::new(config(3, 2)).expect("valid config");
        let items: Vec<u64> = (1..=7).collect();

        // Later items finish first within each batch
        let report = processor
            .process(items, |n, _| async move {
                tokio::time::sleep(Duration::from_millis(100 / n)).await;
                Ok(n * 10)
            })
            .await;

        assert_eq!(report.total(), 7);
        let values: Vec<u64> = report.successes().copied().collect();
        assert_eq!(values, vec![10, 20, 30, 40, 50, 60, 70]);
        assert!((report.success_rate() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_isolated_to_its_index() {
        let processor = BatchProcessor::new(config(2, 2)).expect("valid config");
        let items = vec!["a", "b", "c", "d", "e"];

        let report = processor
            .process(items, |item, index| async move {
                if index == 3 {
                    Err(PipelineError::fatal(format!("cannot process {item}")))
                } else {
                    Ok(item.to_uppercase())
                }
            })
            .await;

        assert_eq!(report.succeeded, 4);
        assert_eq!(report.failed, 1);
        let errors: Vec<&ItemError<&str>> = report.errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].item, "d");
        assert_eq!(errors[0].index, 3);
        assert!(report.outcomes[3].is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_item_becomes_error_and_releases_permit() {
        let processor = BatchProcessor::new(config(4, 1)).expect("valid config");

        let report = processor
            .process(vec![1, 2, 3], |n, _| async move {
                if n == 2 {
                    panic!("boom on {n}");
                }
                Ok(n)
            })
            .await;

        assert_eq!(report.succeeded, 2);
        let error = report.errors().next().expect("one error");
        assert!(error.message.contains("boom on 2"));
        assert_eq!(processor.semaphore().running(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_reruns_only_failures() {
        let processor = BatchProcessor::new(BatchConfig {
            retry_attempts: 3,
            retry_base_delay_ms: 100,
            ..config(2, 2)
        })
        .expect("valid config");
        let calls = Mutex::new(HashMap::<usize, u32>::new());
        let started = Instant::now();

        let report = processor
            .process_with_retry(vec!["a", "b", "c"], |item, index| {
                let attempt = {
                    let mut calls = calls.lock().expect("lock");
                    let count = calls.entry(index).or_default();
                    *count += 1;
                    *count
                };
                async move {
                    match (item, attempt) {
                        ("b", 1 | 2) => Err(PipelineError::operational(
                            FailureKind::Network,
                            "reset",
                        )),
                        ("c", _) => Err(PipelineError::fatal("always broken")),
                        _ => Ok(item),
                    }
                }
            })
            .await;

        let calls = calls.lock().expect("lock");
        assert_eq!(calls[&0], 1);
        assert_eq!(calls[&1], 3);
        assert_eq!(calls[&2], 3);
        assert_eq!(report.passes, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.errors().next().map(|e| e.item), Some("c"));
        // 100ms after the first pass, 200ms after the second
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_adaptive_check_scales_up_on_long_waits() {
        let processor = BatchProcessor::new(BatchConfig {
            adaptive: crate::config::AdaptiveConcurrencyConfig {
                check_interval: 1,
                ..Default::default()
            },
            ..config(10, 2)
        })
        .expect("valid config");
        let (progress, mut events) = ChannelProgress::new();
        let processor = processor.with_progress(Arc::new(progress));

        let report = processor
            .process((0..20).collect::<Vec<u32>>(), |n, _| async move {
                tokio::time::sleep(Duration::from_millis(800)).await;
                Ok(n)
            })
            .await;

        assert_eq!(report.succeeded, 20);
        assert_eq!(report.final_concurrency, 3);

        let mut changes = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ProgressEvent::ConcurrencyChanged { old, new, .. } = event {
                changes.push((old, new));
            }
        }
        assert_eq!(changes, vec![(2, 3)]);
    }

    struct FixedDiscovery(Vec<String>);

    impl ChainDiscovery for FixedDiscovery {
        fn discover<'a>(
            &'a self,
            _start: &'a str,
            max_items: usize,
        ) -> BoxFuture<'a, PipelineResult<Vec<String>>> {
            let items = self.0.iter().take(max_items).cloned().collect();
            Box::pin(async move { Ok(items) })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_chain_uses_discovery() {
        let processor = BatchProcessor::new(config(2, 2))
            .expect("valid config")
            .with_discovery(Arc::new(FixedDiscovery(vec![
                "u1".to_string(),
                "u2".to_string(),
                "u3".to_string(),
            ])));

        let report = processor
            .process_chain("u1", true, |url, _| async move { Ok(url.len()) })
            .await
            .expect("discovery succeeds");
        assert_eq!(report.total(), 3);

        let single = processor
            .process_chain("u1", false, |url, _| async move { Ok(url) })
            .await
            .expect("no discovery needed");
        assert_eq!(single.successes().collect::<Vec<_>>(), vec!["u1"]);

        let bare = BatchProcessor::new(config(2, 2)).expect("valid config");
        let missing = bare
            .process_chain("u1", true, |url, _| async move { Ok(url) })
            .await;
        assert!(matches!(missing, Err(PipelineError::Validation(_))));
    }
}
