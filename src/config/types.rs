//! Core configuration types for the chapter pipeline
//!
//! Each component owns an explicit config struct with defaults and a
//! `validate()` method. `PipelineConfig` aggregates them and is what callers
//! usually load or build. All structs deserialize with `#[serde(default)]`, so a
//! partial JSON document only overrides the fields it names.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, PipelineResult};
use crate::utils::constants::*;

/// Exponential backoff policy for the retry executor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first call
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Growth factor applied per further retry
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            backoff_multiplier: DEFAULT_RETRY_MULTIPLIER,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.max_attempts == 0 {
            return Err(PipelineError::validation("retry.max_attempts must be at least 1"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(PipelineError::validation(format!(
                "retry.backoff_multiplier must be a finite value >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }
}

/// Circuit breaker thresholds shared by every provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures while closed before the breaker opens
    pub failure_threshold: u32,
    /// Cooldown after the first opening
    pub base_cooldown_secs: u64,
    /// Cap for the exponential cooldown after failed probes
    pub max_cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: CIRCUIT_FAILURE_THRESHOLD,
            base_cooldown_secs: CIRCUIT_BASE_COOLDOWN_SECS,
            max_cooldown_secs: CIRCUIT_MAX_COOLDOWN_SECS,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.failure_threshold == 0 {
            return Err(PipelineError::validation(
                "circuit_breaker.failure_threshold must be at least 1",
            ));
        }
        if self.max_cooldown_secs < self.base_cooldown_secs {
            return Err(PipelineError::validation(format!(
                "circuit_breaker.max_cooldown_secs ({}) is below base_cooldown_secs ({})",
                self.max_cooldown_secs, self.base_cooldown_secs
            )));
        }
        Ok(())
    }
}

/// Provider health monitor settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    /// Response-time samples kept per provider
    pub response_time_window: usize,
    /// Hourly buckets kept per provider
    pub hourly_bucket_limit: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: CircuitBreakerConfig::default(),
            response_time_window: RESPONSE_TIME_WINDOW,
            hourly_bucket_limit: HOURLY_BUCKET_LIMIT,
        }
    }
}

impl HealthConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        self.circuit_breaker.validate()?;
        if self.response_time_window == 0 || self.hourly_bucket_limit == 0 {
            return Err(PipelineError::validation(
                "health windows must hold at least one sample",
            ));
        }
        Ok(())
    }
}

/// Size and lifetime of one cache namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    pub max_size: usize,
    pub ttl_secs: u64,
}

impl NamespaceConfig {
    #[must_use]
    pub const fn new(max_size: usize, ttl_secs: u64) -> Self {
        Self { max_size, ttl_secs }
    }

    fn validate(&self, name: &str) -> PipelineResult<()> {
        if self.max_size == 0 {
            return Err(PipelineError::validation(format!(
                "cache.{name}.max_size must be at least 1"
            )));
        }
        if self.ttl_secs == 0 {
            return Err(PipelineError::validation(format!(
                "cache.{name}.ttl_secs must be at least 1"
            )));
        }
        Ok(())
    }
}

/// Cache namespaces and sweep cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub translation: NamespaceConfig,
    pub api_response: NamespaceConfig,
    pub content: NamespaceConfig,
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            translation: NamespaceConfig::new(TRANSLATION_CACHE_SIZE, TRANSLATION_CACHE_TTL_SECS),
            api_response: NamespaceConfig::new(API_CACHE_SIZE, API_CACHE_TTL_SECS),
            content: NamespaceConfig::new(CONTENT_CACHE_SIZE, CONTENT_CACHE_TTL_SECS),
            sweep_interval_secs: CACHE_SWEEP_INTERVAL_SECS,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        self.translation.validate("translation")?;
        self.api_response.validate("api_response")?;
        self.content.validate("content")?;
        if self.sweep_interval_secs == 0 {
            return Err(PipelineError::validation(
                "cache.sweep_interval_secs must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Chapter navigator settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorConfig {
    /// Retry policy wrapped around every step
    pub retry: RetryConfig,
    /// Size inter-step delays from observed processing time
    pub adaptive_delay: bool,
    /// Delay used when `adaptive_delay` is off
    pub fixed_delay_ms: u64,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Base of the exponential error backoff
    pub base_delay_ms: u64,
    /// Consecutive failed steps that abort the run
    pub max_consecutive_errors: u32,
    /// Hard ceiling on processed chapters
    pub max_items: usize,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            adaptive_delay: true,
            fixed_delay_ms: NAV_BASE_DELAY_MS,
            min_delay_ms: NAV_MIN_DELAY_MS,
            max_delay_ms: NAV_MAX_DELAY_MS,
            base_delay_ms: NAV_BASE_DELAY_MS,
            max_consecutive_errors: NAV_MAX_CONSECUTIVE_ERRORS,
            max_items: DEFAULT_MAX_ITEMS,
        }
    }
}

impl NavigatorConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        self.retry.validate()?;
        if self.min_delay_ms > self.max_delay_ms {
            return Err(PipelineError::validation(format!(
                "navigator.min_delay_ms ({}) exceeds max_delay_ms ({})",
                self.min_delay_ms, self.max_delay_ms
            )));
        }
        if self.max_consecutive_errors == 0 {
            return Err(PipelineError::validation(
                "navigator.max_consecutive_errors must be at least 1",
            ));
        }
        if self.max_items == 0 {
            return Err(PipelineError::validation("navigator.max_items must be at least 1"));
        }
        Ok(())
    }
}

/// Thresholds for resizing the batch semaphore between batches
///
/// The defaults are heuristics, not load-bearing constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConcurrencyConfig {
    pub enabled: bool,
    /// Evaluate every this many batches
    pub check_interval: usize,
    pub min_concurrency: usize,
    pub max_concurrency: usize,
    /// Permits added or removed per adjustment
    pub step: usize,
    /// Peak queue length that counts as backed up
    pub queue_threshold: usize,
    pub low_utilization: f64,
    pub high_utilization: f64,
    pub wait_threshold_ms: u64,
}

impl Default for AdaptiveConcurrencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval: DEFAULT_ADAPTIVE_CHECK_INTERVAL,
            min_concurrency: MIN_ADAPTIVE_CONCURRENCY,
            max_concurrency: MAX_ADAPTIVE_CONCURRENCY,
            step: 1,
            queue_threshold: ADAPTIVE_QUEUE_THRESHOLD,
            low_utilization: ADAPTIVE_LOW_UTILIZATION,
            high_utilization: ADAPTIVE_HIGH_UTILIZATION,
            wait_threshold_ms: ADAPTIVE_WAIT_THRESHOLD_MS,
        }
    }
}

impl AdaptiveConcurrencyConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.check_interval == 0 || self.step == 0 {
            return Err(PipelineError::validation(
                "adaptive.check_interval and adaptive.step must be at least 1",
            ));
        }
        if self.min_concurrency == 0 || self.min_concurrency > self.max_concurrency {
            return Err(PipelineError::validation(format!(
                "adaptive concurrency bounds are invalid: [{}, {}]",
                self.min_concurrency, self.max_concurrency
            )));
        }
        Ok(())
    }
}

/// Batch processor settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub batch_size: usize,
    /// Initial semaphore capacity
    pub max_concurrency: usize,
    /// Pause between batches, 0 to disable
    pub batch_delay_ms: u64,
    pub adaptive: AdaptiveConcurrencyConfig,
    /// Passes made by `process_with_retry`, including the first
    pub retry_attempts: u32,
    /// Base of the exponential backoff between retry passes
    pub retry_base_delay_ms: u64,
    /// Item ceiling for chain discovery
    pub max_items: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            batch_delay_ms: DEFAULT_BATCH_DELAY_MS,
            adaptive: AdaptiveConcurrencyConfig::default(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            max_items: DEFAULT_MAX_ITEMS,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.batch_size == 0 {
            return Err(PipelineError::validation("batch.batch_size must be at least 1"));
        }
        if self.max_concurrency == 0 {
            return Err(PipelineError::validation(
                "batch.max_concurrency must be at least 1",
            ));
        }
        if self.retry_attempts == 0 {
            return Err(PipelineError::validation(
                "batch.retry_attempts must be at least 1",
            ));
        }
        if self.max_items == 0 {
            return Err(PipelineError::validation("batch.max_items must be at least 1"));
        }
        if self.adaptive.enabled {
            self.adaptive.validate()?;
        }
        Ok(())
    }
}

/// Top-level configuration for a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub batch: BatchConfig,
    pub navigator: NavigatorConfig,
    pub cache: CacheConfig,
    pub health: HealthConfig,
    /// Retry policy for individual remote calls inside a step
    pub remote_retry: RetryConfig,
    /// Where the file writer puts results
    pub output_dir: PathBuf,
    /// Gzip written files
    pub compress_output: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch: BatchConfig::default(),
            navigator: NavigatorConfig::default(),
            cache: CacheConfig::default(),
            health: HealthConfig::default(),
            remote_retry: RetryConfig::default(),
            output_dir: PathBuf::from("./output"),
            compress_output: false,
        }
    }
}

impl PipelineConfig {
    /// Validate every component config
    pub fn validate(&self) -> PipelineResult<()> {
        self.batch.validate()?;
        self.navigator.validate()?;
        self.cache.validate()?;
        self.health.validate()?;
        self.remote_retry.validate()?;
        Ok(())
    }

    /// Parse and validate a JSON document; missing fields take defaults
    pub fn from_json_str(json: &str) -> PipelineResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file
    pub async fn from_json_file(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            PipelineError::Io(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }
}
