//! Resilient multi-provider chapter pipeline
//!
//! Walks a chain of linked chapters, fetches each one, runs it through a
//! remote transformer (translation, speech synthesis) and writes the result.
//! The core is provider agnostic:
//!
//! - [`engine`]: resizable semaphore, retry executor, chain navigator and
//!   batch processor
//! - [`cache`]: namespaced TTL cache in front of remote calls
//! - [`health`]: per-provider health records and circuit breakers
//! - [`pipeline`]: collaborator traits and the chapter step built from them

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod pipeline;
pub mod utils;

pub use cache::{CacheManager, CacheNamespace, CacheStats};
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use engine::{
    AdaptiveSemaphore, BatchProcessor, BatchReport, ChainDiscovery, ChainLink, ChapterNavigator,
    ItemError, ItemOutcome, NavigationReport, NoOpProgress, ProgressReporter, RetryPolicy,
    with_retry,
};
pub use error::{FailureKind, PipelineError, PipelineResult};
pub use health::{CircuitState, HealthStatus, ProviderHealthMonitor};
pub use pipeline::{
    ChapterOutcome, ChapterPipeline, FetchedChapter, Fetcher, FetcherDiscovery, FileWriter,
    Transformer, Writer,
};
