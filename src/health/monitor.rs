//! Provider health monitor
//!
//! One [`ProviderHealthRecord`] per provider id in a `DashMap`, so concurrent
//! steps only contend on the shard holding their provider. The monitor only
//! observes: callers consult [`ProviderHealthMonitor::is_available`] or
//! [`ProviderHealthMonitor::select_provider`] before dispatching.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, info};
use serde::Serialize;
use std::cmp::Ordering;
use std::time::Duration;

use super::circuit_breaker::CircuitState;
use super::record::{HealthStatus, ProviderHealthRecord, ProviderHealthReport};
use crate::config::HealthConfig;
use crate::error::{PipelineError, PipelineResult};

/// Ranking inputs for one provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderRanking {
    pub provider: String,
    pub success_rate: f64,
    pub average_response_time: Duration,
    pub circuit_state: CircuitState,
    pub status: HealthStatus,
}

impl ProviderRanking {
    /// Success rate descending, then average response time ascending, then
    /// breaker state (closed before half-open before open)
    fn compare(&self, other: &Self) -> Ordering {
        other
            .success_rate
            .total_cmp(&self.success_rate)
            .then_with(|| self.average_response_time.cmp(&other.average_response_time))
            .then_with(|| self.circuit_state.cmp(&other.circuit_state))
            .then_with(|| self.provider.cmp(&other.provider))
    }
}

/// Serializable snapshot of every tracked provider
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub generated_at: DateTime<Utc>,
    pub providers: Vec<ProviderHealthReport>,
    pub open_circuits: Vec<String>,
    pub rankings: Vec<ProviderRanking>,
}

#[derive(Debug)]
pub struct ProviderHealthMonitor {
    records: DashMap<String, ProviderHealthRecord>,
    config: HealthConfig,
}

impl ProviderHealthMonitor {
    /// # Errors
    /// Returns a validation error for an invalid config.
    pub fn new(config: HealthConfig) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self {
            records: DashMap::new(),
            config,
        })
    }

    pub fn record_success(&self, provider: &str, response_time: Duration) {
        self.with_record(provider, |record| record.record_success(response_time));
    }

    pub fn record_failure(
        &self,
        provider: &str,
        error_type: &str,
        is_timeout: bool,
        is_rate_limit: bool,
    ) {
        self.with_record(provider, |record| {
            record.record_failure(error_type, is_timeout, is_rate_limit);
        });
    }

    /// Record a failure, deriving type, timeout and rate-limit flags from `error`
    pub fn record_error(&self, provider: &str, error: &PipelineError) {
        self.record_failure(
            provider,
            error.type_label(),
            error.is_timeout(),
            error.is_rate_limit(),
        );
    }

    pub fn record_retry(&self, provider: &str) {
        self.with_record(provider, ProviderHealthRecord::record_retry);
    }

    /// False only while the provider's breaker is open; unknown providers are available
    pub fn is_available(&self, provider: &str) -> bool {
        self.records
            .get_mut(provider)
            .is_none_or(|mut record| record.is_available())
    }

    pub fn circuit_state(&self, provider: &str) -> Option<CircuitState> {
        self.records
            .get_mut(provider)
            .map(|mut record| record.circuit_state())
    }

    #[must_use]
    pub fn status(&self, provider: &str) -> Option<HealthStatus> {
        self.records.get(provider).map(|record| record.status())
    }

    #[must_use]
    pub fn provider_report(&self, provider: &str) -> Option<ProviderHealthReport> {
        self.records.get(provider).map(|record| record.report())
    }

    /// Every tracked provider, best first
    pub fn rankings(&self) -> Vec<ProviderRanking> {
        let mut rankings: Vec<ProviderRanking> = self
            .records
            .iter_mut()
            .map(|mut entry| Self::ranking(entry.value_mut()))
            .collect();
        rankings.sort_by(ProviderRanking::compare);
        rankings
    }

    /// Best-ranked available provider among `candidates`
    ///
    /// Candidates never seen before rank as perfectly healthy.
    pub fn select_provider<S: AsRef<str>>(&self, candidates: &[S]) -> Option<String> {
        let selected = candidates
            .iter()
            .map(AsRef::as_ref)
            .filter(|provider| self.is_available(provider))
            .map(|provider| match self.records.get_mut(provider) {
                Some(mut record) => Self::ranking(&mut record),
                None => Self::ranking(&mut ProviderHealthRecord::new(provider, &self.config)),
            })
            .min_by(ProviderRanking::compare)
            .map(|ranking| ranking.provider);

        if selected.is_none() && !candidates.is_empty() {
            debug!("No available provider among {} candidates", candidates.len());
        }
        selected
    }

    /// Forget everything recorded for `provider`
    pub fn reset(&self, provider: &str) -> bool {
        let removed = self.records.remove(provider).is_some();
        if removed {
            info!("Reset health record for provider {provider}");
        }
        removed
    }

    pub fn reset_all(&self) {
        let count = self.records.len();
        self.records.clear();
        info!("Reset health records for {count} providers");
    }

    /// Providers whose breaker is currently open
    pub fn open_circuits(&self) -> Vec<String> {
        let mut open: Vec<String> = self
            .records
            .iter_mut()
            .filter_map(|mut entry| {
                (entry.value_mut().circuit_state() == CircuitState::Open)
                    .then(|| entry.key().clone())
            })
            .collect();
        open.sort();
        open
    }

    /// Count of providers in each breaker state as (closed, half-open, open)
    pub fn state_counts(&self) -> (usize, usize, usize) {
        let mut closed = 0;
        let mut half_open = 0;
        let mut open = 0;

        for mut entry in self.records.iter_mut() {
            match entry.value_mut().circuit_state() {
                CircuitState::Closed => closed += 1,
                CircuitState::HalfOpen => half_open += 1,
                CircuitState::Open => open += 1,
            }
        }

        (closed, half_open, open)
    }

    pub fn report(&self) -> HealthReport {
        let open_circuits = self.open_circuits();
        let rankings = self.rankings();
        let mut providers: Vec<ProviderHealthReport> =
            self.records.iter().map(|entry| entry.report()).collect();
        providers.sort_by(|a, b| a.provider.cmp(&b.provider));

        HealthReport {
            generated_at: Utc::now(),
            providers,
            open_circuits,
            rankings,
        }
    }

    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.records.len()
    }

    fn with_record(&self, provider: &str, update: impl FnOnce(&mut ProviderHealthRecord)) {
        let mut record = self
            .records
            .entry(provider.to_string())
            .or_insert_with(|| ProviderHealthRecord::new(provider, &self.config));
        update(&mut record);
    }

    fn ranking(record: &mut ProviderHealthRecord) -> ProviderRanking {
        ProviderRanking {
            provider: record.provider().to_string(),
            success_rate: record.success_rate(),
            average_response_time: record.average_response_time(),
            circuit_state: record.circuit_state(),
            status: record.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    fn monitor() -> ProviderHealthMonitor {
        ProviderHealthMonitor::new(HealthConfig::default()).expect("valid config")
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_blocks_after_five_failures() {
        let monitor = monitor();
        for _ in 0..5 {
            assert!(monitor.is_available("alpha"));
            monitor.record_failure("alpha", "network", false, false);
        }

        assert!(!monitor.is_available("alpha"));
        assert_eq!(monitor.circuit_state("alpha"), Some(CircuitState::Open));
        assert_eq!(monitor.open_circuits(), vec!["alpha".to_string()]);
        assert_eq!(monitor.state_counts(), (0, 0, 1));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(monitor.is_available("alpha"));
        assert_eq!(monitor.circuit_state("alpha"), Some(CircuitState::HalfOpen));
    }

    #[tokio::test]
    async fn test_record_error_derives_flags() {
        let monitor = monitor();
        monitor.record_error(
            "alpha",
            &PipelineError::operational(FailureKind::RateLimited, "429"),
        );
        monitor.record_retry("alpha");

        let report = monitor.provider_report("alpha").expect("tracked");
        assert_eq!(report.rate_limits, 1);
        assert_eq!(report.retries, 1);
        assert_eq!(report.errors_by_type.get("rate_limited"), Some(&1));
    }

    #[tokio::test]
    async fn test_rankings_prefer_success_then_speed() {
        let monitor = monitor();
        monitor.record_success("slow", Duration::from_millis(900));
        monitor.record_success("fast", Duration::from_millis(100));
        monitor.record_success("flaky", Duration::from_millis(10));
        monitor.record_failure("flaky", "network", false, false);

        let order: Vec<String> = monitor
            .rankings()
            .into_iter()
            .map(|ranking| ranking.provider)
            .collect();
        assert_eq!(order, vec!["fast", "slow", "flaky"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_provider_skips_open_circuits() {
        let monitor = monitor();
        monitor.record_success("alpha", Duration::from_millis(50));
        for _ in 0..5 {
            monitor.record_failure("beta", "timeout", true, false);
        }

        assert_eq!(
            monitor.select_provider(&["beta", "alpha"]),
            Some("alpha".to_string())
        );
        assert_eq!(monitor.select_provider(&["beta"]), None);
        // Unknown providers rank as healthy
        assert_eq!(
            monitor.select_provider(&["beta", "gamma"]),
            Some("gamma".to_string())
        );
    }

    #[tokio::test]
    async fn test_reset() {
        let monitor = monitor();
        monitor.record_success("alpha", Duration::from_millis(5));
        monitor.record_success("beta", Duration::from_millis(5));

        assert!(monitor.reset("alpha"));
        assert!(!monitor.reset("alpha"));
        assert_eq!(monitor.provider_count(), 1);

        monitor.reset_all();
        assert_eq!(monitor.provider_count(), 0);
        assert!(monitor.report().providers.is_empty());
    }
}
