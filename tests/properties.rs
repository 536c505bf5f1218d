//! Property tests for the concurrency, cache and retry building blocks

use chapterflow::cache::TtlCache;
use chapterflow::{AdaptiveSemaphore, RetryPolicy};
use futures::future::join_all;
use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .expect("Failed to build runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn semaphore_never_exceeds_capacity(
        capacity in 1usize..6,
        sleeps in prop::collection::vec(0u64..50, 1..30),
    ) {
        let runtime = paused_runtime();
        let (peak, running_after) = runtime.block_on(async {
            let semaphore = AdaptiveSemaphore::new(capacity).expect("valid capacity");
            let active = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));

            let tasks = sleeps.iter().map(|&ms| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                semaphore.run(async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            });
            for result in join_all(tasks).await {
                result.expect("permit acquired");
            }
            (peak.load(Ordering::SeqCst), semaphore.running())
        });

        prop_assert!(peak <= capacity);
        prop_assert!(peak >= 1);
        prop_assert_eq!(running_after, 0);
    }

    #[test]
    fn cache_stays_within_size_and_keeps_latest(
        max_size in 1usize..8,
        keys in prop::collection::vec(0u8..20, 1..60),
    ) {
        let cache = TtlCache::new("prop", max_size, Duration::from_secs(3600))
            .expect("valid size");
        for (i, key) in keys.iter().enumerate() {
            cache.insert(key.to_string(), i);
            prop_assert!(cache.len() <= max_size);
        }

        let last_index = keys.len() - 1;
        let last_key = keys[last_index].to_string();
        prop_assert_eq!(cache.get(&last_key), Some(last_index));
    }

    #[test]
    fn retry_delays_never_shrink(
        base_ms in 1u64..5_000,
        multiplier in 1.0f64..4.0,
    ) {
        let policy = RetryPolicy::new(10, Duration::from_millis(base_ms), multiplier)
            .expect("valid policy");
        prop_assert_eq!(policy.delay_for_retry(1), Duration::from_millis(base_ms));
        for retry in 1..10 {
            prop_assert!(policy.delay_for_retry(retry) <= policy.delay_for_retry(retry + 1));
        }
    }
}
