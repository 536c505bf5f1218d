//! Fluent builder for `PipelineConfig`
//!
//! Every field has a default, so the builder needs no typestate: any chain of
//! setters ends in `build()`, which validates the assembled config.

use std::path::PathBuf;

use super::types::{
    AdaptiveConcurrencyConfig, BatchConfig, CacheConfig, HealthConfig, NavigatorConfig,
    PipelineConfig, RetryConfig,
};
use crate::error::PipelineResult;

#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfig {
    /// Create a builder for configuring a `PipelineConfig` with a fluent interface
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch.batch_size = size;
        self
    }

    #[must_use]
    pub fn max_concurrency(mut self, concurrency: usize) -> Self {
        self.config.batch.max_concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn batch_delay_ms(mut self, delay_ms: u64) -> Self {
        self.config.batch.batch_delay_ms = delay_ms;
        self
    }

    /// Turn adaptive concurrency resizing on or off
    #[must_use]
    pub fn adaptive_concurrency(mut self, enabled: bool) -> Self {
        self.config.batch.adaptive.enabled = enabled;
        self
    }

    #[must_use]
    pub fn adaptive(mut self, adaptive: AdaptiveConcurrencyConfig) -> Self {
        self.config.batch.adaptive = adaptive;
        self
    }

    #[must_use]
    pub fn batch(mut self, batch: BatchConfig) -> Self {
        self.config.batch = batch;
        self
    }

    #[must_use]
    pub fn navigator(mut self, navigator: NavigatorConfig) -> Self {
        self.config.navigator = navigator;
        self
    }

    /// Turn adaptive inter-chapter delays on or off
    #[must_use]
    pub fn adaptive_delay(mut self, enabled: bool) -> Self {
        self.config.navigator.adaptive_delay = enabled;
        self
    }

    /// Ceiling on chapters per run, shared by the navigator and discovery
    #[must_use]
    pub fn max_items(mut self, max_items: usize) -> Self {
        self.config.navigator.max_items = max_items;
        self.config.batch.max_items = max_items;
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.config.cache = cache;
        self
    }

    #[must_use]
    pub fn health(mut self, health: HealthConfig) -> Self {
        self.config.health = health;
        self
    }

    /// Retry policy for single remote calls inside a chapter step
    #[must_use]
    pub fn remote_retry(mut self, retry: RetryConfig) -> Self {
        self.config.remote_retry = retry;
        self
    }

    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    #[must_use]
    pub fn compress_output(mut self, compress: bool) -> Self {
        self.config.compress_output = compress;
        self
    }

    /// Validate and return the config
    pub fn build(self) -> PipelineResult<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
