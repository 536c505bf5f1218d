//! Resizable FIFO semaphore with occupancy statistics
//!
//! Wraps `tokio::sync::Semaphore` (which already grants permits in FIFO order)
//! and adds what the batch processor needs on top:
//! - runtime resizing, growing immediately and shrinking lazily
//! - running / queued counts, cumulative acquisitions and releases
//! - wait-time and utilization figures, both lifetime and per observation window
//!
//! Permits are RAII guards. Dropping one is the release, so a task run through
//! [`AdaptiveSemaphore::run`] frees its slot even if it errors or panics.

use log::{debug, info};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug)]
struct CapacityState {
    capacity: usize,
    /// Permits to discard on release instead of returning, left over from a
    /// shrink that could not take them back while they were held
    retiring: usize,
}

#[derive(Debug, Default)]
struct Window {
    acquisitions: u64,
    wait_nanos: u128,
    utilization_sum: f64,
    max_queue_length: usize,
}

#[derive(Debug)]
struct Inner {
    permits: Arc<Semaphore>,
    capacity: Mutex<CapacityState>,
    running: AtomicUsize,
    queued: AtomicUsize,
    total_acquired: AtomicU64,
    total_released: AtomicU64,
    max_queue_length: AtomicUsize,
    total_wait_nanos: AtomicU64,
    window: Mutex<Window>,
}

/// Point-in-time view of a semaphore
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct SemaphoreStats {
    pub capacity: usize,
    pub running: usize,
    pub queued: usize,
    pub total_acquired: u64,
    pub total_released: u64,
    pub max_queue_length: usize,
    pub average_wait: Duration,
    /// `running / capacity`
    pub utilization: f64,
}

/// Activity since the previous [`AdaptiveSemaphore::take_window`] call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub acquisitions: u64,
    pub max_queue_length: usize,
    pub average_wait: Duration,
    /// Mean of `running / capacity` sampled at every acquisition
    pub mean_utilization: f64,
}

/// Bounded, resizable permit pool
///
/// Cloning yields another handle to the same pool.
#[derive(Debug, Clone)]
pub struct AdaptiveSemaphore {
    inner: Arc<Inner>,
}

/// Held slot; released on drop
#[derive(Debug)]
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct SemaphorePermit {
    permit: Option<OwnedSemaphorePermit>,
    inner: Arc<Inner>,
}

impl Drop for SemaphorePermit {
    fn drop(&mut self) {
        self.inner.running.fetch_sub(1, Ordering::SeqCst);
        self.inner.total_released.fetch_add(1, Ordering::Relaxed);

        if let Some(permit) = self.permit.take() {
            let retire = {
                let mut cap = self.inner.capacity.lock();
                if cap.retiring > 0 {
                    cap.retiring -= 1;
                    true
                } else {
                    false
                }
            };
            if retire {
                permit.forget();
            } else {
                // Returning the permit hands it to the head of the wait queue
                drop(permit);
            }
        }
    }
}

/// Keeps `queued` accurate even if an acquiring future is dropped mid-wait
struct QueuedGuard<'a>(&'a AtomicUsize);

impl Drop for QueuedGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AdaptiveSemaphore {
    /// Create a semaphore with `capacity` permits
    ///
    /// # Errors
    /// Returns a validation error when `capacity` is zero.
    pub fn new(capacity: usize) -> PipelineResult<Self> {
        if capacity == 0 {
            return Err(PipelineError::validation(
                "semaphore capacity must be at least 1",
            ));
        }
        Ok(Self {
            inner: Arc::new(Inner {
                permits: Arc::new(Semaphore::new(capacity)),
                capacity: Mutex::new(CapacityState {
                    capacity,
                    retiring: 0,
                }),
                running: AtomicUsize::new(0),
                queued: AtomicUsize::new(0),
                total_acquired: AtomicU64::new(0),
                total_released: AtomicU64::new(0),
                max_queue_length: AtomicUsize::new(0),
                total_wait_nanos: AtomicU64::new(0),
                window: Mutex::new(Window::default()),
            }),
        })
    }

    /// Acquire a slot, queueing behind earlier waiters when none is free
    pub async fn acquire(&self) -> PipelineResult<SemaphorePermit> {
        let started = Instant::now();

        let (permit, queue_seen) = match Arc::clone(&self.inner.permits).try_acquire_owned() {
            Ok(permit) => (permit, 0),
            Err(_) => {
                let queued = self.inner.queued.fetch_add(1, Ordering::SeqCst) + 1;
                let _queued_guard = QueuedGuard(&self.inner.queued);
                self.inner
                    .max_queue_length
                    .fetch_max(queued, Ordering::Relaxed);

                let permit = Arc::clone(&self.inner.permits)
                    .acquire_owned()
                    .await
                    .map_err(|_| PipelineError::fatal("semaphore closed unexpectedly"))?;
                (permit, queued)
            }
        };

        let waited = started.elapsed();
        let running = self.inner.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.total_acquired.fetch_add(1, Ordering::Relaxed);
        self.inner
            .total_wait_nanos
            .fetch_add(u64::try_from(waited.as_nanos()).unwrap_or(u64::MAX), Ordering::Relaxed);

        let capacity = self.capacity();
        {
            let mut window = self.inner.window.lock();
            window.acquisitions += 1;
            window.wait_nanos += waited.as_nanos();
            window.utilization_sum += running as f64 / capacity as f64;
            window.max_queue_length = window.max_queue_length.max(queue_seen);
        }

        Ok(SemaphorePermit {
            permit: Some(permit),
            inner: Arc::clone(&self.inner),
        })
    }

    /// Run `task` while holding a slot
    ///
    /// The slot is released when the task finishes, fails, or unwinds.
    pub async fn run<F, T>(&self, task: F) -> PipelineResult<T>
    where
        F: Future<Output = T>,
    {
        let _permit = self.acquire().await?;
        Ok(task.await)
    }

    /// Change the number of slots
    ///
    /// Growing releases new permits at once, waking queued waiters. Shrinking
    /// removes idle permits immediately; permits currently held are retired as
    /// their holders release them.
    ///
    /// # Errors
    /// Returns a validation error when `new_capacity` is zero.
    pub fn resize(&self, new_capacity: usize) -> PipelineResult<()> {
        if new_capacity == 0 {
            return Err(PipelineError::validation(
                "semaphore capacity must be at least 1",
            ));
        }

        let mut cap = self.inner.capacity.lock();
        let old_capacity = cap.capacity;

        if new_capacity > old_capacity {
            let grow = new_capacity - old_capacity;
            let reclaimed = grow.min(cap.retiring);
            cap.retiring -= reclaimed;
            let added = grow - reclaimed;
            if added > 0 {
                self.inner.permits.add_permits(added);
            }
        } else if new_capacity < old_capacity {
            let shrink = old_capacity - new_capacity;
            let forgotten = self.inner.permits.forget_permits(shrink);
            cap.retiring += shrink - forgotten;
        }
        cap.capacity = new_capacity;

        debug!(
            "Semaphore resized {old_capacity} -> {new_capacity} (retiring {} held permits)",
            cap.retiring
        );
        Ok(())
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity.lock().capacity
    }

    #[must_use]
    pub fn running(&self) -> usize {
        self.inner.running.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.queued.load(Ordering::SeqCst)
    }

    /// Lifetime statistics
    #[must_use]
    pub fn stats(&self) -> SemaphoreStats {
        let capacity = self.capacity();
        let running = self.running();
        let total_acquired = self.inner.total_acquired.load(Ordering::Relaxed);
        let total_wait = self.inner.total_wait_nanos.load(Ordering::Relaxed);
        let average_wait = if total_acquired == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(total_wait / total_acquired)
        };

        SemaphoreStats {
            capacity,
            running,
            queued: self.queued(),
            total_acquired,
            total_released: self.inner.total_released.load(Ordering::Relaxed),
            max_queue_length: self.inner.max_queue_length.load(Ordering::Relaxed),
            average_wait,
            utilization: running as f64 / capacity as f64,
        }
    }

    /// Return and reset the statistics gathered since the last call
    pub fn take_window(&self) -> WindowStats {
        let window = std::mem::take(&mut *self.inner.window.lock());
        if window.acquisitions == 0 {
            return WindowStats {
                acquisitions: 0,
                max_queue_length: 0,
                average_wait: Duration::ZERO,
                mean_utilization: 0.0,
            };
        }

        let average_nanos = window.wait_nanos / u128::from(window.acquisitions);
        WindowStats {
            acquisitions: window.acquisitions,
            max_queue_length: window.max_queue_length,
            average_wait: Duration::from_nanos(u64::try_from(average_nanos).unwrap_or(u64::MAX)),
            mean_utilization: window.utilization_sum / window.acquisitions as f64,
        }
    }

    /// Log a one-line summary of the lifetime statistics
    pub fn log_stats(&self, label: &str) {
        let stats = self.stats();
        info!(
            "{label}: capacity {}, acquired {}, max queue {}, avg wait {:?}",
            stats.capacity, stats.total_acquired, stats.max_queue_length, stats.average_wait
        );
    }
}
