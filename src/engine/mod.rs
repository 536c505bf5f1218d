//! Scheduling core: semaphore, retry executor, chain navigator and batch processor

pub mod adaptive;
pub mod batch;
pub mod navigator;
pub mod progress;
pub mod retry;
pub mod semaphore;
pub mod types;

pub use adaptive::ConcurrencyAdjustment;
pub use batch::BatchProcessor;
pub use navigator::{ChapterNavigator, FallbackRule, NavigatorState, SequentialFallback};
pub use progress::{ChannelProgress, NoOpProgress, ProgressEvent, ProgressReporter};
pub use retry::{RetryPolicy, with_retry, with_retry_notify};
pub use semaphore::{AdaptiveSemaphore, SemaphorePermit, SemaphoreStats, WindowStats};
pub use types::{
    BatchReport, ChainDiscovery, ChainLink, ItemError, ItemOutcome, NavigationReport, StopReason,
};
