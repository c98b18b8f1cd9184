//! # Relay Configuration
//!
//! This module holds the knobs that shape the admission-and-dispatch pipeline:
//! how close together two actions may be, how many requests a one-second
//! window tolerates, and how much fallback capacity sits behind the executor.
//!
//! ## Key Concepts
//!
//! ### Two-Tier Admission
//!
//! ```text
//!     Incoming command
//!          │
//!          ▼
//!     ┌──────────────────────────┐
//!     │ min_interval (20ms)      │ ← cheap cooldown, rejects auto-repeat
//!     └────────────┬─────────────┘
//!                  ▼
//!     ┌──────────────────────────┐
//!     │ sliding window (1s)      │ ← only engages under sustained floods
//!     │ ceiling: 40, flood: 35   │
//!     │ retains at most 50 times │
//!     └──────────────────────────┘
//! ```
//!
//! ### Fallback Capacity
//!
//! ```text
//!     queue_capacity: 20 ──► commands waiting for a retry
//!     workers: 4 ──────────► threads draining that queue
//! ```

use super::error::ConfigError;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Span of the sliding rate window.
///
/// Timestamps older than this (relative to the newest arrival) are evicted
/// before each admission decision.
pub const SLIDING_WINDOW: Duration = Duration::from_secs(1);

/// Memory ordering strategy for the atomic counters in the stats aggregator.
///
/// ## Quick Guide
///
/// - `Relaxed` when counters are only ever read for dashboards
/// - `AcquireRelease` (default) for most deployments
/// - `Sequential` when debugging counter interleavings
///
/// ## Example
///
/// ```rust
/// use keyrelay::{MemoryOrdering, RelayConfig};
///
/// let config = RelayConfig::default().with_ordering(MemoryOrdering::Relaxed);
/// assert_eq!(config.ordering, MemoryOrdering::Relaxed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryOrdering {
    /// Fastest, no ordering between counters.
    Relaxed,

    /// Acquire on loads, release on stores, acq-rel on read-modify-write.
    #[default]
    AcquireRelease,

    /// Sequential consistency everywhere.
    Sequential,
}

impl MemoryOrdering {
    /// Ordering for plain loads (snapshot reads).
    #[inline(always)]
    pub(crate) fn load(&self) -> Ordering {
        match self {
            Self::Relaxed => Ordering::Relaxed,
            Self::AcquireRelease => Ordering::Acquire,
            Self::Sequential => Ordering::SeqCst,
        }
    }

    /// Ordering for read-modify-write operations (increments and resets).
    #[inline(always)]
    pub(crate) fn rmw(&self) -> Ordering {
        match self {
            Self::Relaxed => Ordering::Relaxed,
            Self::AcquireRelease => Ordering::AcqRel,
            Self::Sequential => Ordering::SeqCst,
        }
    }
}

/// Configuration for a [`Dispatcher`](crate::Dispatcher) and everything it owns.
///
/// ## Defaults
///
/// ```text
///     ┌────────────────────────────────────┐
///     │ min_interval: 20ms                 │
///     │ max_requests_per_second: 40        │
///     │ flood_threshold: 35                │
///     │ window_capacity: 50                │
///     │ queue_capacity: 20                 │
///     │ workers: 4                         │
///     └────────────────────────────────────┘
/// ```
///
/// ## Examples
///
/// ```rust
/// use keyrelay::RelayConfig;
/// use std::time::Duration;
///
/// let config = RelayConfig::default()
///     .with_min_interval(Duration::from_millis(50))
///     .with_queue_capacity(8)
///     .with_workers(2);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Smallest gap allowed between two accepted actions.
    ///
    /// Anything closer to the previous accepted action is reported as
    /// `Throttled` without touching the sliding window.
    pub min_interval: Duration,

    /// Ceiling on requests observed within [`SLIDING_WINDOW`].
    pub max_requests_per_second: usize,

    /// Hard overflow threshold; the window must exceed both this and the
    /// ceiling before a request is `RateLimited`.
    pub flood_threshold: usize,

    /// Maximum number of timestamps the window retains.
    pub window_capacity: usize,

    /// Number of commands the overflow queue can buffer.
    pub queue_capacity: usize,

    /// Size of the fallback worker pool.
    pub workers: usize,

    /// Atomic ordering used by the stats counters.
    pub ordering: MemoryOrdering,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(20),
            max_requests_per_second: 40,
            flood_threshold: 35,
            window_capacity: 50,
            queue_capacity: 20,
            workers: 4,
            ordering: MemoryOrdering::AcquireRelease,
        }
    }
}

impl RelayConfig {
    /// Sets the minimum interval between accepted actions.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Sets the per-second ceiling and the flood threshold together.
    ///
    /// # Example
    ///
    /// ```rust
    /// use keyrelay::RelayConfig;
    ///
    /// let config = RelayConfig::default().with_rate_limit(60, 50);
    /// assert_eq!(config.max_requests_per_second, 60);
    /// assert_eq!(config.flood_threshold, 50);
    /// ```
    pub fn with_rate_limit(mut self, max_requests_per_second: usize, flood_threshold: usize) -> Self {
        self.max_requests_per_second = max_requests_per_second;
        self.flood_threshold = flood_threshold;
        self
    }

    /// Sets how many timestamps the sliding window retains.
    pub fn with_window_capacity(mut self, capacity: usize) -> Self {
        self.window_capacity = capacity;
        self
    }

    /// Sets the overflow queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the worker pool size.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the memory ordering used by the stats counters.
    pub fn with_ordering(mut self, ordering: MemoryOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Number of requests per window at which `RateLimited` starts firing.
    ///
    /// The window has to exceed both the ceiling and the flood threshold, so
    /// the effective limit is the larger of the two.
    pub fn effective_limit(&self) -> usize {
        self.max_requests_per_second.max(self.flood_threshold)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if:
    /// - `max_requests_per_second` is 0
    /// - `window_capacity` does not exceed the effective limit
    /// - `queue_capacity` is 0
    /// - `workers` is 0
    ///
    /// # Example
    ///
    /// ```rust
    /// use keyrelay::RelayConfig;
    ///
    /// let config = RelayConfig::default().with_workers(0);
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_requests_per_second == 0 {
            return Err(ConfigError::ZeroRateLimit);
        }

        // A window that can never hold more than the limit never rate limits.
        let limit = self.effective_limit();
        if self.window_capacity <= limit {
            return Err(ConfigError::WindowTooSmall {
                capacity: self.window_capacity,
                limit,
            });
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }

        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_ordering() {
        let ordering = MemoryOrdering::AcquireRelease;
        assert_eq!(ordering.load(), Ordering::Acquire);
        assert_eq!(ordering.rmw(), Ordering::AcqRel);

        assert_eq!(MemoryOrdering::Relaxed.load(), Ordering::Relaxed);
        assert_eq!(MemoryOrdering::Relaxed.rmw(), Ordering::Relaxed);
        assert_eq!(MemoryOrdering::Sequential.load(), Ordering::SeqCst);
        assert_eq!(MemoryOrdering::Sequential.rmw(), Ordering::SeqCst);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_interval, Duration::from_millis(20));
        assert_eq!(config.effective_limit(), 40);
    }

    #[test]
    fn test_config_validation() {
        let zero_rate = RelayConfig::default().with_rate_limit(0, 0);
        assert!(matches!(zero_rate.validate(), Err(ConfigError::ZeroRateLimit)));

        let small_window = RelayConfig::default().with_window_capacity(40);
        assert!(matches!(
            small_window.validate(),
            Err(ConfigError::WindowTooSmall { capacity: 40, limit: 40 })
        ));

        let zero_queue = RelayConfig::default().with_queue_capacity(0);
        assert!(matches!(zero_queue.validate(), Err(ConfigError::ZeroQueueCapacity)));

        let zero_workers = RelayConfig::default().with_workers(0);
        assert!(matches!(zero_workers.validate(), Err(ConfigError::ZeroWorkers)));
    }

    #[test]
    fn test_flood_threshold_above_ceiling() {
        // The window has to hold more than the larger of the two numbers.
        let config = RelayConfig::default().with_rate_limit(10, 45);
        assert_eq!(config.effective_limit(), 45);
        assert!(config.validate().is_ok());

        let config = config.with_window_capacity(45);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_with_ordering() {
        let config = RelayConfig::default().with_ordering(MemoryOrdering::Sequential);
        assert_eq!(config.ordering, MemoryOrdering::Sequential);
    }
}
