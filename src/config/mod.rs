//! Configuration module for the chapter pipeline
//!
//! Per-component config structs with validated defaults, an aggregate
//! `PipelineConfig` loadable from JSON, and a fluent builder.

pub mod builder;
pub mod getters;
pub mod types;

pub use builder::PipelineConfigBuilder;
pub use types::{
    AdaptiveConcurrencyConfig, BatchConfig, CacheConfig, CircuitBreakerConfig, HealthConfig,
    NamespaceConfig, NavigatorConfig, PipelineConfig, RetryConfig,
};
