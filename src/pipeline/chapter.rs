//! Chapter pipeline: fetch, transform, write
//!
//! Composes the collaborators into the step function the navigator and the
//! batch processor drive. Every remote call goes through the cache first and
//! runs under the remote retry policy; transformer calls are timed and
//! recorded against the provider that served them.

use log::{debug, info};
use std::sync::Arc;
use tokio::time::Instant;

use super::collaborators::{ChapterOutcome, FetchedChapter, Fetcher, Transformer, Writer};
use crate::cache::{CacheManager, CacheNamespace};
use crate::config::PipelineConfig;
use crate::engine::{
    BatchProcessor, BatchReport, ChapterNavigator, NavigationReport, RetryPolicy, with_retry,
};
use crate::error::{FailureKind, PipelineError, PipelineResult};
use crate::health::ProviderHealthMonitor;

pub(crate) const FETCH_OPERATION: &str = "fetch";
const TRANSFORM_OPERATION: &str = "transform";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct CachedTransform {
    text: String,
    provider: String,
}

pub struct ChapterPipeline {
    fetcher: Arc<dyn Fetcher>,
    transformers: Vec<Arc<dyn Transformer>>,
    writer: Option<Arc<dyn Writer>>,
    cache: Arc<CacheManager>,
    health: Arc<ProviderHealthMonitor>,
    remote_retry: RetryPolicy,
}

impl std::fmt::Debug for ChapterPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChapterPipeline")
            .field("providers", &self.provider_ids())
            .field("has_writer", &self.writer.is_some())
            .field("remote_retry", &self.remote_retry)
            .finish_non_exhaustive()
    }
}

impl ChapterPipeline {
    /// Build a pipeline with its own cache and health monitor
    ///
    /// # Errors
    /// Fails on an invalid config or an empty transformer list.
    pub fn new(
        config: &PipelineConfig,
        fetcher: Arc<dyn Fetcher>,
        transformers: Vec<Arc<dyn Transformer>>,
    ) -> PipelineResult<Self> {
        config.validate()?;
        if transformers.is_empty() {
            return Err(PipelineError::validation(
                "a chapter pipeline needs at least one transformer",
            ));
        }

        Ok(Self {
            fetcher,
            transformers,
            writer: None,
            cache: Arc::new(CacheManager::new(&config.cache)?),
            health: Arc::new(ProviderHealthMonitor::new(config.health)?),
            remote_retry: RetryPolicy::from_config(&config.remote_retry)?,
        })
    }

    #[must_use]
    pub fn with_writer(mut self, writer: Arc<dyn Writer>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Share a cache with other pipelines
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<CacheManager>) -> Self {
        self.cache = cache;
        self
    }

    /// Share a health monitor with other pipelines
    #[must_use]
    pub fn with_health(mut self, health: Arc<ProviderHealthMonitor>) -> Self {
        self.health = health;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    #[must_use]
    pub fn health(&self) -> &Arc<ProviderHealthMonitor> {
        &self.health
    }

    #[must_use]
    pub fn provider_ids(&self) -> Vec<String> {
        self.transformers
            .iter()
            .map(|t| t.provider_id().to_string())
            .collect()
    }

    /// Fetch, transform and write one chapter
    pub async fn process_chapter(&self, identifier: &str) -> PipelineResult<ChapterOutcome> {
        let started = Instant::now();
        let chapter = self.fetch(identifier).await?;
        let (transformer, cached) = self.pick_transformer(&chapter)?;

        let (transformed_text, provider, from_cache) = match cached {
            Some(text) => (text, transformer.provider_id().to_string(), true),
            None => {
                let (text, provider) = self.transform(transformer, &chapter).await?;
                (text, provider, false)
            }
        };

        let mut outcome = ChapterOutcome {
            url: chapter.url,
            title: chapter.title,
            source_text: chapter.content,
            transformed_text,
            provider,
            next_url: chapter.next_url,
            output_path: None,
            from_cache,
            elapsed: started.elapsed(),
        };

        if let Some(writer) = &self.writer {
            outcome.output_path = writer.write(&outcome).await?;
        }

        debug!(
            "Processed {} via {} in {:?}{}",
            outcome.url,
            outcome.provider,
            outcome.elapsed,
            if from_cache { " (cached)" } else { "" }
        );
        Ok(outcome)
    }

    /// Walk a chain with `navigator`, processing each chapter
    pub async fn run_sequence(
        &self,
        navigator: &mut ChapterNavigator,
        start: &str,
    ) -> PipelineResult<NavigationReport<ChapterOutcome>> {
        navigator
            .process_chapter_sequence(start, move |identifier| async move {
                self.process_chapter(&identifier).await
            })
            .await
    }

    /// Process a known list of chapters in batches, retrying failed ones
    pub async fn run_batch(
        &self,
        processor: &BatchProcessor,
        identifiers: Vec<String>,
    ) -> BatchReport<String, ChapterOutcome> {
        processor
            .process_with_retry(identifiers, move |identifier, _| async move {
                self.process_chapter(&identifier).await
            })
            .await
    }

    /// Process the chain starting at `start` in batches
    pub async fn run_chain(
        &self,
        processor: &BatchProcessor,
        start: &str,
        discover: bool,
    ) -> PipelineResult<BatchReport<String, ChapterOutcome>> {
        processor
            .process_chain(start, discover, move |identifier, _| async move {
                self.process_chapter(&identifier).await
            })
            .await
    }

    async fn fetch(&self, identifier: &str) -> PipelineResult<FetchedChapter> {
        if let Some(cached) =
            self.cache
                .get_as::<FetchedChapter, _>(CacheNamespace::Content, FETCH_OPERATION, &[identifier])?
        {
            debug!("Content cache hit for {identifier}");
            return Ok(cached);
        }

        let context = format!("fetch {identifier}");
        let chapter = with_retry(&self.remote_retry, &context, move |_| {
            self.fetcher.fetch(identifier)
        })
        .await?;

        self.cache
            .set_as(CacheNamespace::Content, FETCH_OPERATION, &[identifier], &chapter)?;
        Ok(chapter)
    }

    /// Best available transformer and its cached output for `chapter`, if any
    fn pick_transformer(
        &self,
        chapter: &FetchedChapter,
    ) -> PipelineResult<(Arc<dyn Transformer>, Option<String>)> {
        let ids = self.provider_ids();
        let selected = self.health.select_provider(&ids).ok_or_else(|| {
            PipelineError::operational(
                FailureKind::Service,
                format!("no available provider among {}", ids.join(", ")),
            )
        })?;

        let transformer = self
            .transformers
            .iter()
            .find(|t| t.provider_id() == selected)
            .cloned()
            .ok_or_else(|| PipelineError::fatal(format!("selected unknown provider {selected}")))?;

        let cached = self
            .cache
            .get_as::<CachedTransform, _>(
                CacheNamespace::Translation,
                TRANSFORM_OPERATION,
                &(selected.as_str(), chapter.content.as_str()),
            )?
            .map(|entry| entry.text);

        Ok((transformer, cached))
    }

    /// Transformer to use for the next attempt
    ///
    /// Keeps `current` while its breaker admits calls, otherwise switches to the
    /// best available provider.
    fn dispatchable(
        &self,
        current: &Arc<dyn Transformer>,
    ) -> PipelineResult<Arc<dyn Transformer>> {
        if self.health.is_available(current.provider_id()) {
            return Ok(Arc::clone(current));
        }

        let ids = self.provider_ids();
        self.health
            .select_provider(&ids)
            .and_then(|id| {
                self.transformers
                    .iter()
                    .find(|t| t.provider_id() == id)
                    .cloned()
            })
            .ok_or_else(|| {
                PipelineError::operational(
                    FailureKind::Service,
                    format!(
                        "circuit open for {} and no other provider available",
                        current.provider_id()
                    ),
                )
            })
    }

    /// Run the transform under the remote retry policy
    ///
    /// Availability is checked before every attempt, so a breaker that opens
    /// mid-loop moves the remaining attempts to another provider. Returns the
    /// text and the id of the provider that produced it.
    async fn transform(
        &self,
        initial: Arc<dyn Transformer>,
        chapter: &FetchedChapter,
    ) -> PipelineResult<(String, String)> {
        let context = format!("transform {}", chapter.url);
        let mut current = initial;

        let (text, provider) = with_retry(&self.remote_retry, &context, move |attempt| {
            if attempt > 1 {
                self.health.record_retry(current.provider_id());
            }
            let next = self.dispatchable(&current);
            if let Ok(transformer) = &next {
                if transformer.provider_id() != current.provider_id() {
                    info!(
                        "Switching {} from {} to {}",
                        chapter.url,
                        current.provider_id(),
                        transformer.provider_id()
                    );
                }
                current = Arc::clone(transformer);
            }

            async move {
                let transformer = next?;
                let provider = transformer.provider_id().to_string();
                let call_started = Instant::now();
                let result = transformer.transform(&chapter.content).await;
                match &result {
                    Ok(_) => self.health.record_success(&provider, call_started.elapsed()),
                    Err(error) => self.health.record_error(&provider, error),
                }
                result.map(|text| (text, provider))
            }
        })
        .await?;

        self.cache.set_as(
            CacheNamespace::Translation,
            TRANSFORM_OPERATION,
            &(provider.as_str(), chapter.content.as_str()),
            &CachedTransform {
                text: text.clone(),
                provider: provider.clone(),
            },
        )?;
        info!("Transformed {} via {provider}", chapter.url);
        Ok((text, provider))
    }
}
