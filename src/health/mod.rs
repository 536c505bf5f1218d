//! Per-provider health tracking and circuit breaking

pub mod circuit_breaker;
pub mod monitor;
pub mod record;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
pub use monitor::{HealthReport, ProviderHealthMonitor, ProviderRanking};
pub use record::{HealthStatus, HourlyBucket, Percentiles, ProviderHealthRecord, ProviderHealthReport};
