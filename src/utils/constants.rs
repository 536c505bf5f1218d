//! Shared configuration constants for chapterflow
//!
//! Default values used by the configuration structs and components, kept in
//! one place so that defaults and documentation cannot drift apart.

/// Items per batch in the batch processor
pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Concurrent items per batch
pub const DEFAULT_MAX_CONCURRENCY: usize = 2;

/// Pause between consecutive batches
pub const DEFAULT_BATCH_DELAY_MS: u64 = 1000;

/// Adaptive concurrency is evaluated every this many batches
pub const DEFAULT_ADAPTIVE_CHECK_INTERVAL: usize = 2;

/// Adaptive concurrency never scales above this
pub const MAX_ADAPTIVE_CONCURRENCY: usize = 20;

/// Adaptive concurrency never scales below this
pub const MIN_ADAPTIVE_CONCURRENCY: usize = 2;

/// Queue length above which a batch counts as backed up
///
/// Heuristic carried over as a configurable default; tune per deployment.
pub const ADAPTIVE_QUEUE_THRESHOLD: usize = 5;

/// Utilization below which a backed-up semaphore is scaled up
pub const ADAPTIVE_LOW_UTILIZATION: f64 = 0.7;

/// Utilization above which an idle-queue semaphore is scaled down
pub const ADAPTIVE_HIGH_UTILIZATION: f64 = 0.9;

/// Average permit wait above which concurrency is increased
pub const ADAPTIVE_WAIT_THRESHOLD_MS: u64 = 1000;

/// Translation results: 2000 entries, 2 hours
pub const TRANSLATION_CACHE_SIZE: usize = 2000;
pub const TRANSLATION_CACHE_TTL_SECS: u64 = 2 * 60 * 60;

/// Generic API responses: 1000 entries, 1 hour
pub const API_CACHE_SIZE: usize = 1000;
pub const API_CACHE_TTL_SECS: u64 = 60 * 60;

/// Scraped chapter content: 500 entries, 24 hours
pub const CONTENT_CACHE_SIZE: usize = 500;
pub const CONTENT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

/// Interval of the background expiry sweep
pub const CACHE_SWEEP_INTERVAL_SECS: u64 = 5 * 60;

/// Breaker opens after this many failures while closed
pub const CIRCUIT_FAILURE_THRESHOLD: u32 = 5;

/// First cooldown after the breaker opens
pub const CIRCUIT_BASE_COOLDOWN_SECS: u64 = 60;

/// Upper bound for the exponential half-open cooldown
pub const CIRCUIT_MAX_COOLDOWN_SECS: u64 = 5 * 60;

/// Rolling response-time window per provider
pub const RESPONSE_TIME_WINDOW: usize = 1000;

/// Hourly buckets kept per provider (one week)
pub const HOURLY_BUCKET_LIMIT: usize = 168;

/// Retry executor defaults
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;
pub const DEFAULT_RETRY_MULTIPLIER: f64 = 1.5;

/// Navigation delay bounds
pub const NAV_MIN_DELAY_MS: u64 = 500;
pub const NAV_MAX_DELAY_MS: u64 = 10_000;
pub const NAV_BASE_DELAY_MS: u64 = 1000;

/// Navigation aborts once this many consecutive steps have failed
pub const NAV_MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Share of the average processing time used as the adaptive delay
pub const NAV_ADAPTIVE_DELAY_FACTOR: f64 = 0.2;

/// Hard ceiling on items per run
pub const DEFAULT_MAX_ITEMS: usize = 1000;

/// Longest error message stored in an item error record
pub const MAX_ERROR_MESSAGE_CHARS: usize = 500;
