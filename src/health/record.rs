//! Per-provider health record
//!
//! Cumulative counters, a bounded rolling window of response times, hourly
//! buckets, error tallies and the provider's circuit breaker. Status is
//! recomputed after every recorded outcome.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use super::circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
use crate::config::HealthConfig;

const CRITICAL_CONSECUTIVE_FAILURES: u32 = 10;
const CRITICAL_ERROR_RATE: f64 = 50.0;
const DEGRADED_CONSECUTIVE_FAILURES: u32 = 5;
const DEGRADED_ERROR_RATE: f64 = 25.0;
const WARNING_ERROR_RATE: f64 = 10.0;

/// Coarse provider health derived from error rate and failure streak
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Degraded,
    Critical,
}

impl HealthStatus {
    /// Classify by consecutive failures and error rate (percent)
    #[must_use]
    pub fn derive(consecutive_failures: u32, error_rate: f64) -> Self {
        if consecutive_failures >= CRITICAL_CONSECUTIVE_FAILURES
            || error_rate >= CRITICAL_ERROR_RATE
        {
            Self::Critical
        } else if consecutive_failures >= DEGRADED_CONSECUTIVE_FAILURES
            || error_rate >= DEGRADED_ERROR_RATE
        {
            Self::Degraded
        } else if error_rate >= WARNING_ERROR_RATE {
            Self::Warning
        } else {
            Self::Healthy
        }
    }
}

/// Counters for one wall-clock hour
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourlyBucket {
    pub hour: DateTime<Utc>,
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Response-time percentiles over the rolling window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Percentiles {
    pub p50: Duration,
    pub p90: Duration,
    pub p95: Duration,
    pub p99: Duration,
}

/// Serializable view of one provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealthReport {
    pub provider: String,
    pub status: HealthStatus,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub timeouts: u64,
    pub rate_limits: u64,
    pub retries: u64,
    pub consecutive_failures: u32,
    pub max_consecutive_failures: u32,
    /// Percent of requests that failed
    pub error_rate: f64,
    pub average_response_time: Duration,
    pub percentiles: Percentiles,
    pub errors_by_type: BTreeMap<String, u64>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub hourly: Vec<HourlyBucket>,
    pub circuit: BreakerSnapshot,
}

#[derive(Debug, Clone)]
pub struct ProviderHealthRecord {
    provider: String,
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    timeouts: u64,
    rate_limits: u64,
    retries: u64,
    consecutive_failures: u32,
    max_consecutive_failures: u32,
    response_times: VecDeque<Duration>,
    response_time_window: usize,
    hourly: VecDeque<HourlyBucket>,
    hourly_bucket_limit: usize,
    errors_by_type: BTreeMap<String, u64>,
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    status: HealthStatus,
    breaker: CircuitBreaker,
}

impl ProviderHealthRecord {
    #[must_use]
    pub fn new(provider: impl Into<String>, config: &HealthConfig) -> Self {
        Self {
            provider: provider.into(),
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            timeouts: 0,
            rate_limits: 0,
            retries: 0,
            consecutive_failures: 0,
            max_consecutive_failures: 0,
            response_times: VecDeque::with_capacity(config.response_time_window.min(1024)),
            response_time_window: config.response_time_window,
            hourly: VecDeque::new(),
            hourly_bucket_limit: config.hourly_bucket_limit,
            errors_by_type: BTreeMap::new(),
            last_success: None,
            last_failure: None,
            status: HealthStatus::Healthy,
            breaker: CircuitBreaker::new(config.circuit_breaker),
        }
    }

    pub fn record_success(&mut self, response_time: Duration) {
        self.total_requests += 1;
        self.successful_requests += 1;
        self.consecutive_failures = 0;
        self.last_success = Some(Utc::now());

        if self.response_times.len() >= self.response_time_window {
            self.response_times.pop_front();
        }
        self.response_times.push_back(response_time);

        self.bump_hourly(true);
        self.refresh_status();
        self.breaker.record_success(&self.provider);
    }

    pub fn record_failure(&mut self, error_type: &str, is_timeout: bool, is_rate_limit: bool) {
        self.total_requests += 1;
        self.failed_requests += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.max_consecutive_failures = self
            .max_consecutive_failures
            .max(self.consecutive_failures);
        self.last_failure = Some(Utc::now());

        *self.errors_by_type.entry(error_type.to_string()).or_insert(0) += 1;
        if is_timeout {
            self.timeouts += 1;
        }
        if is_rate_limit {
            self.rate_limits += 1;
        }

        self.bump_hourly(false);
        self.refresh_status();
        self.breaker.record_failure(&self.provider, error_type);
    }

    pub fn record_retry(&mut self) {
        self.retries += 1;
    }

    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    #[must_use]
    pub fn status(&self) -> HealthStatus {
        self.status
    }

    #[must_use]
    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    #[must_use]
    pub fn retries(&self) -> u64 {
        self.retries
    }

    /// Percent of requests that failed, 0 before the first request
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.failed_requests as f64 * 100.0 / self.total_requests as f64
        }
    }

    /// Fraction of requests that succeeded; an unused provider counts as 1.0
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }

    /// Mean over the rolling window
    #[must_use]
    pub fn average_response_time(&self) -> Duration {
        if self.response_times.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.response_times.iter().sum();
        total / self.response_times.len() as u32
    }

    /// Nearest-rank percentile over the rolling window
    #[must_use]
    pub fn percentile(&self, p: f64) -> Duration {
        let mut sorted: Vec<Duration> = self.response_times.iter().copied().collect();
        sorted.sort_unstable();
        nearest_rank(&sorted, p)
    }

    #[must_use]
    pub fn percentiles(&self) -> Percentiles {
        let mut sorted: Vec<Duration> = self.response_times.iter().copied().collect();
        sorted.sort_unstable();
        Percentiles {
            p50: nearest_rank(&sorted, 50.0),
            p90: nearest_rank(&sorted, 90.0),
            p95: nearest_rank(&sorted, 95.0),
            p99: nearest_rank(&sorted, 99.0),
        }
    }

    #[must_use]
    pub fn response_time_samples(&self) -> usize {
        self.response_times.len()
    }

    pub fn hourly_buckets(&self) -> impl Iterator<Item = &HourlyBucket> {
        self.hourly.iter()
    }

    /// Breaker state with any due Open to `HalfOpen` transition applied
    pub fn circuit_state(&mut self) -> CircuitState {
        self.breaker.state(&self.provider)
    }

    pub fn is_available(&mut self) -> bool {
        self.breaker.is_available(&self.provider)
    }

    #[must_use]
    pub fn report(&self) -> ProviderHealthReport {
        ProviderHealthReport {
            provider: self.provider.clone(),
            status: self.status,
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            failed_requests: self.failed_requests,
            timeouts: self.timeouts,
            rate_limits: self.rate_limits,
            retries: self.retries,
            consecutive_failures: self.consecutive_failures,
            max_consecutive_failures: self.max_consecutive_failures,
            error_rate: self.error_rate(),
            average_response_time: self.average_response_time(),
            percentiles: self.percentiles(),
            errors_by_type: self.errors_by_type.clone(),
            last_success: self.last_success,
            last_failure: self.last_failure,
            hourly: self.hourly.iter().cloned().collect(),
            circuit: self.breaker.snapshot(),
        }
    }

    fn refresh_status(&mut self) {
        self.status = HealthStatus::derive(self.consecutive_failures, self.error_rate());
    }

    fn bump_hourly(&mut self, success: bool) {
        let now = Utc::now();
        let hour = now.duration_trunc(TimeDelta::hours(1)).unwrap_or(now);

        if self.hourly.back().is_none_or(|bucket| bucket.hour != hour) {
            if self.hourly.len() >= self.hourly_bucket_limit {
                self.hourly.pop_front();
            }
            self.hourly.push_back(HourlyBucket {
                hour,
                requests: 0,
                successes: 0,
                failures: 0,
            });
        }

        if let Some(bucket) = self.hourly.back_mut() {
            bucket.requests += 1;
            if success {
                bucket.successes += 1;
            } else {
                bucket.failures += 1;
            }
        }
    }
}

fn nearest_rank(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
