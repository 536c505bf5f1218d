//! Concurrency resizing decisions for the batch processor
//!
//! Pure function of the config, the current capacity and the semaphore's
//! observation window since the last check. Rules are evaluated in order and
//! the first match wins.

use super::semaphore::WindowStats;
use crate::config::AdaptiveConcurrencyConfig;

/// A capacity change and why it was made
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyAdjustment {
    pub old: usize,
    pub new: usize,
    pub reason: String,
}

/// Decide whether to resize from `current`
///
/// Returns `None` when no rule fires or the bounds make the change a no-op.
#[must_use]
pub fn evaluate(
    config: &AdaptiveConcurrencyConfig,
    current: usize,
    window: &WindowStats,
) -> Option<ConcurrencyAdjustment> {
    if window.acquisitions == 0 {
        return None;
    }

    let scale_up = |reason: String| {
        let new = current.saturating_add(config.step).min(config.max_concurrency);
        (new > current).then_some(ConcurrencyAdjustment {
            old: current,
            new,
            reason,
        })
    };

    if window.max_queue_length > config.queue_threshold
        && window.mean_utilization < config.low_utilization
    {
        return scale_up(format!(
            "queue reached {} with mean utilization {:.0}%",
            window.max_queue_length,
            window.mean_utilization * 100.0
        ));
    }

    if window.max_queue_length == 0 && window.mean_utilization > config.high_utilization {
        let new = current.saturating_sub(config.step).max(config.min_concurrency);
        return (new < current).then(|| ConcurrencyAdjustment {
            old: current,
            new,
            reason: format!(
                "no queueing with mean utilization {:.0}%",
                window.mean_utilization * 100.0
            ),
        });
    }

    if window.average_wait > config.wait_threshold() {
        return scale_up(format!(
            "average permit wait {:?} exceeds {:?}",
            window.average_wait,
            config.wait_threshold()
        ));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn window(max_queue_length: usize, mean_utilization: f64, wait_ms: u64) -> WindowStats {
        WindowStats {
            acquisitions: 10,
            max_queue_length,
            average_wait: Duration::from_millis(wait_ms),
            mean_utilization,
        }
    }

    #[test]
    fn test_backed_up_queue_scales_up() {
        let config = AdaptiveConcurrencyConfig::default();
        let adjustment = evaluate(&config, 4, &window(6, 0.5, 0)).expect("scale up");
        assert_eq!((adjustment.old, adjustment.new), (4, 5));
    }

    #[test]
    fn test_saturated_without_queue_scales_down() {
        let config = AdaptiveConcurrencyConfig::default();
        let adjustment = evaluate(&config, 4, &window(0, 0.95, 0)).expect("scale down");
        assert_eq!(adjustment.new, 3);
        // Already at the floor
        assert_eq!(evaluate(&config, 2, &window(0, 0.95, 0)), None);
    }

    #[test]
    fn test_long_waits_scale_up_to_cap() {
        let config = AdaptiveConcurrencyConfig::default();
        let adjustment = evaluate(&config, 19, &window(2, 0.8, 1500)).expect("scale up");
        assert_eq!(adjustment.new, 20);
        assert_eq!(evaluate(&config, 20, &window(2, 0.8, 1500)), None);
    }

    #[test]
    fn test_quiet_window_keeps_capacity() {
        let config = AdaptiveConcurrencyConfig::default();
        assert_eq!(evaluate(&config, 4, &window(2, 0.8, 10)), None);
        assert_eq!(
            evaluate(&config, 4, &WindowStats {
                acquisitions: 0,
                ..window(9, 0.1, 5000)
            }),
            None
        );
    }
}
