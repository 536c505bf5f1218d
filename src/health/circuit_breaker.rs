//! Three-state circuit breaker for one provider
//!
//! - Closed: normal operation, calls proceed
//! - Open: too many failures, the provider should be skipped until the cooldown ends
//! - `HalfOpen`: cooldown elapsed, the next call is a probe
//!
//! The breaker only keeps state. Callers ask [`CircuitBreaker::is_available`]
//! before dispatching; nothing here blocks or fails a call. Open moves to
//! `HalfOpen` lazily, the first time the state is observed after the cooldown.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - calls proceed
    Closed,
    /// Cooldown over - the next call probes recovery
    HalfOpen,
    /// Failing - skip the provider
    Open,
}

impl CircuitState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::HalfOpen => "half_open",
            Self::Open => "open",
        }
    }
}

/// Serializable view of a breaker at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    /// Time since the breaker last opened
    pub open_for: Option<Duration>,
    /// Remaining cooldown while open
    pub retry_in: Option<Duration>,
}

/// Breaker state for a single provider
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    /// Failures since the breaker last closed
    failure_count: u32,
    opened_at: Option<Instant>,
    next_retry_at: Option<Instant>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            opened_at: None,
            next_retry_at: None,
        }
    }

    /// Current state, applying the Open to `HalfOpen` transition if due
    pub fn state(&mut self, provider: &str) -> CircuitState {
        if self.state == CircuitState::Open
            && self
                .next_retry_at
                .is_some_and(|retry_at| Instant::now() >= retry_at)
        {
            self.state = CircuitState::HalfOpen;
            info!(
                "Circuit breaker HALF-OPEN for provider {provider} after {:?} cooldown",
                self.opened_at.map(|at| at.elapsed()).unwrap_or_default()
            );
        }
        self.state
    }

    /// State without applying any pending transition
    #[must_use]
    pub fn raw_state(&self) -> CircuitState {
        self.state
    }

    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// False only while Open and cooling down
    pub fn is_available(&mut self, provider: &str) -> bool {
        self.state(provider) != CircuitState::Open
    }

    pub fn record_success(&mut self, provider: &str) {
        match self.state(provider) {
            CircuitState::Closed => {
                self.failure_count = 0;
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                self.close();
                info!("Circuit breaker CLOSED for provider {provider}");
            }
        }
    }

    pub fn record_failure(&mut self, provider: &str, error: &str) {
        self.failure_count = self.failure_count.saturating_add(1);

        match self.state(provider) {
            CircuitState::Closed if self.failure_count >= self.config.failure_threshold => {
                let cooldown = self.open();
                warn!(
                    "Circuit breaker OPEN for provider {provider} after {} failures, retry in {cooldown:?}. Last error: {error}",
                    self.failure_count
                );
            }
            CircuitState::Closed => {
                debug!(
                    "Circuit breaker failure for provider {provider} ({}/{}): {error}",
                    self.failure_count, self.config.failure_threshold
                );
            }
            CircuitState::HalfOpen => {
                let cooldown = self.open();
                warn!(
                    "Circuit breaker probe failed for provider {provider}, reopening for {cooldown:?}: {error}"
                );
            }
            CircuitState::Open => {
                debug!("Provider {provider} failed while its circuit is open: {error}");
            }
        }
    }

    /// Cooldown for the current failure count
    ///
    /// `base` at the first opening, doubling with every failure past the
    /// threshold, never above `max`.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        let base = self.config.base_cooldown();
        let max = self.config.max_cooldown();
        let excess = self
            .failure_count
            .saturating_sub(self.config.failure_threshold)
            .min(31);
        base.checked_mul(1u32 << excess).unwrap_or(max).min(max)
    }

    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = Instant::now();
        BreakerSnapshot {
            state: self.state,
            failure_count: self.failure_count,
            open_for: self.opened_at.map(|at| now.saturating_duration_since(at)),
            retry_in: match self.state {
                CircuitState::Open => self
                    .next_retry_at
                    .map(|at| at.saturating_duration_since(now)),
                _ => None,
            },
        }
    }

    fn open(&mut self) -> Duration {
        let now = Instant::now();
        let cooldown = self.cooldown();
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.next_retry_at = Some(now + cooldown);
        cooldown
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.opened_at = None;
        self.next_retry_at = None;
    }
}
