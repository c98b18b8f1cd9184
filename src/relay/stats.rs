//! # Stats Aggregator
//!
//! Concurrent counters for every request outcome, plus the derived figures the
//! HTTP surface and the monitor report.
//!
//! ## Counters
//!
//! ```text
//!     total_requests ──────► every call to Dispatcher::handle
//!     successful_actions ──► executed (direct, or later by a worker)
//!     throttled_requests ──► Throttled + RateLimited
//!     errors ──────────────► InvalidCommand + failed worker retries
//!     queue_full ──────────► Busy
//! ```
//!
//! Each counter is its own atomic, so an increment can never be observed half
//! applied. `reset()` swaps every counter to zero; an increment racing the
//! reset lands either before it (and is cleared) or after it (and survives).

use super::config::MemoryOrdering;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

/// Names of the individual counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    /// Requests received.
    TotalRequests,
    /// Actions performed.
    SuccessfulActions,
    /// Requests rejected by admission.
    ThrottledRequests,
    /// Invalid commands and failed retries.
    Errors,
    /// Requests turned away because the overflow queue was full.
    QueueFull,
}

impl Counter {
    /// Every counter, in report order.
    pub const ALL: [Counter; 5] = [
        Counter::TotalRequests,
        Counter::SuccessfulActions,
        Counter::ThrottledRequests,
        Counter::Errors,
        Counter::QueueFull,
    ];

    /// Field name used in JSON reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Counter::TotalRequests => "total_requests",
            Counter::SuccessfulActions => "successful_actions",
            Counter::ThrottledRequests => "throttled_requests",
            Counter::Errors => "errors",
            Counter::QueueFull => "queue_full",
        }
    }
}

/// Thread-safe outcome counters.
///
/// # Example
///
/// ```rust
/// use keyrelay::{Counter, MemoryOrdering, StatsAggregator};
///
/// let stats = StatsAggregator::new(MemoryOrdering::AcquireRelease);
/// stats.increment(Counter::TotalRequests);
/// stats.increment(Counter::SuccessfulActions);
///
/// let snapshot = stats.snapshot();
/// assert_eq!(snapshot.total_requests, 1);
/// assert_eq!(snapshot.success_rate(), 1.0);
///
/// stats.reset();
/// assert_eq!(stats.snapshot().total_requests, 0);
/// ```
#[derive(Debug, Default)]
pub struct StatsAggregator {
    total_requests: AtomicU64,
    successful_actions: AtomicU64,
    throttled_requests: AtomicU64,
    errors: AtomicU64,
    queue_full: AtomicU64,
    ordering: MemoryOrdering,
}

impl StatsAggregator {
    /// Creates a zeroed aggregator.
    pub fn new(ordering: MemoryOrdering) -> Self {
        Self {
            ordering,
            ..Default::default()
        }
    }

    #[inline]
    fn slot(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::TotalRequests => &self.total_requests,
            Counter::SuccessfulActions => &self.successful_actions,
            Counter::ThrottledRequests => &self.throttled_requests,
            Counter::Errors => &self.errors,
            Counter::QueueFull => &self.queue_full,
        }
    }

    /// Adds one to `counter` and returns the new value.
    #[inline]
    pub fn increment(&self, counter: Counter) -> u64 {
        self.slot(counter).fetch_add(1, self.ordering.rmw()) + 1
    }

    /// Current value of a single counter.
    #[inline]
    pub fn get(&self, counter: Counter) -> u64 {
        self.slot(counter).load(self.ordering.load())
    }

    /// Copies every counter into an immutable snapshot.
    pub fn snapshot(&self) -> StatsSnapshot {
        let ordering = self.ordering.load();
        StatsSnapshot {
            total_requests: self.total_requests.load(ordering),
            successful_actions: self.successful_actions.load(ordering),
            throttled_requests: self.throttled_requests.load(ordering),
            errors: self.errors.load(ordering),
            queue_full: self.queue_full.load(ordering),
        }
    }

    /// Zeroes every counter and returns the values that were cleared.
    pub fn reset(&self) -> StatsSnapshot {
        let ordering = self.ordering.rmw();
        StatsSnapshot {
            total_requests: self.total_requests.swap(0, ordering),
            successful_actions: self.successful_actions.swap(0, ordering),
            throttled_requests: self.throttled_requests.swap(0, ordering),
            errors: self.errors.swap(0, ordering),
            queue_full: self.queue_full.swap(0, ordering),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Requests received.
    pub total_requests: u64,
    /// Actions performed.
    pub successful_actions: u64,
    /// Requests rejected by admission.
    pub throttled_requests: u64,
    /// Invalid commands and failed retries.
    pub errors: u64,
    /// Requests turned away with `Busy`.
    pub queue_full: u64,
}

impl StatsSnapshot {
    /// Value of a single counter.
    pub fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::TotalRequests => self.total_requests,
            Counter::SuccessfulActions => self.successful_actions,
            Counter::ThrottledRequests => self.throttled_requests,
            Counter::Errors => self.errors,
            Counter::QueueFull => self.queue_full,
        }
    }

    #[inline]
    fn ratio(&self, part: u64) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            part as f64 / self.total_requests as f64
        }
    }

    /// Fraction of requests that ended in a performed action.
    ///
    /// Returns 0.0 before the first request.
    #[inline]
    pub fn success_rate(&self) -> f64 {
        self.ratio(self.successful_actions)
    }

    /// Fraction of requests rejected by admission.
    #[inline]
    pub fn throttle_ratio(&self) -> f64 {
        self.ratio(self.throttled_requests)
    }

    /// Fraction of requests counted as errors.
    #[inline]
    pub fn error_ratio(&self) -> f64 {
        self.ratio(self.errors)
    }

    /// Fraction of requests answered with `Busy`.
    #[inline]
    pub fn queue_full_ratio(&self) -> f64 {
        self.ratio(self.queue_full)
    }

    /// Average request rate over `uptime`.
    pub fn requests_per_second(&self, uptime: Duration) -> f64 {
        let secs = uptime.as_secs_f64();
        if secs > 0.0 {
            self.total_requests as f64 / secs
        } else {
            0.0
        }
    }

    /// Coarse health assessment from the outcome ratios.
    ///
    /// - **Critical**: more than 5% `Busy`, or more than half errors
    /// - **Degraded**: more than 30% throttled, or more than 10% errors
    /// - **Healthy**: otherwise
    pub fn health_status(&self) -> HealthStatus {
        if self.queue_full_ratio() > 0.05 || self.error_ratio() > 0.5 {
            HealthStatus::Critical
        } else if self.throttle_ratio() > 0.3 || self.error_ratio() > 0.1 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Human-readable multi-line report.
    ///
    /// # Example Output
    ///
    /// ```text
    /// Relay Stats:
    /// ├─ Requests:
    /// │  ├─ Total: 120
    /// │  ├─ Successful: 100 (83.33%)
    /// │  ├─ Throttled: 15 (12.50%)
    /// │  ├─ Errors: 3 (2.50%)
    /// │  └─ Queue Full: 2 (1.67%)
    /// └─ Health: ✅ Healthy
    /// ```
    pub fn summary(&self) -> String {
        format!(
            "Relay Stats:\n\
             ├─ Requests:\n\
             │  ├─ Total: {}\n\
             │  ├─ Successful: {} ({:.2}%)\n\
             │  ├─ Throttled: {} ({:.2}%)\n\
             │  ├─ Errors: {} ({:.2}%)\n\
             │  └─ Queue Full: {} ({:.2}%)\n\
             └─ Health: {}",
            self.total_requests,
            self.successful_actions,
            self.success_rate() * 100.0,
            self.throttled_requests,
            self.throttle_ratio() * 100.0,
            self.errors,
            self.error_ratio() * 100.0,
            self.queue_full,
            self.queue_full_ratio() * 100.0,
            self.health_status()
        )
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// Health indicator derived from a [`StatsSnapshot`].
///
/// ```text
///     Healthy ──────► commands are getting through
///        │
///     Degraded ─────► clients are being throttled or sending junk
///        │
///     Critical ─────► fallback capacity exhausted or mostly errors
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Operating normally.
    Healthy,
    /// Noticeable throttling or errors.
    Degraded,
    /// Requests are being dropped.
    Critical,
}

impl HealthStatus {
    /// Returns true for anything but `Healthy`.
    pub fn is_unhealthy(&self) -> bool {
        !matches!(self, Self::Healthy)
    }

    /// Operator hint for the status.
    pub fn suggested_action(&self) -> &'static str {
        match self {
            Self::Healthy => "No action needed",
            Self::Degraded => "Check client send rate or payloads",
            Self::Critical => "Immediate action required: executor failing or queue saturated",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "✅ Healthy"),
            Self::Degraded => write!(f, "⚠️ Degraded"),
            Self::Critical => write!(f, "🔴 Critical"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn snapshot(total: u64, ok: u64, throttled: u64, errors: u64, full: u64) -> StatsSnapshot {
        StatsSnapshot {
            total_requests: total,
            successful_actions: ok,
            throttled_requests: throttled,
            errors,
            queue_full: full,
        }
    }

    #[test]
    fn test_increment_and_snapshot() {
        let stats = StatsAggregator::new(MemoryOrdering::default());

        assert_eq!(stats.increment(Counter::TotalRequests), 1);
        assert_eq!(stats.increment(Counter::TotalRequests), 2);
        stats.increment(Counter::Errors);

        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.get(Counter::SuccessfulActions), 0);
        assert_eq!(stats.get(Counter::TotalRequests), 2);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let stats = StatsAggregator::new(MemoryOrdering::Sequential);
        for counter in Counter::ALL {
            stats.increment(counter);
        }

        let cleared = stats.reset();
        assert_eq!(cleared, snapshot(1, 1, 1, 1, 1));
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let stats = Arc::new(StatsAggregator::new(MemoryOrdering::AcquireRelease));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = stats.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.increment(Counter::TotalRequests);
                        stats.increment(Counter::SuccessfulActions);
                    }
                })
            })
            .collect();

        // Read while writers are running; values only ever grow.
        let mut last = 0;
        for _ in 0..100 {
            let seen = stats.snapshot().total_requests;
            assert!(seen >= last);
            last = seen;
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 8000);
        assert_eq!(snap.successful_actions, 8000);
    }

    #[test]
    fn test_reset_races_increments() {
        let stats = Arc::new(StatsAggregator::new(MemoryOrdering::AcquireRelease));

        let writer = {
            let stats = stats.clone();
            thread::spawn(move || {
                for _ in 0..10_000 {
                    stats.increment(Counter::Errors);
                }
            })
        };

        let mut cleared = 0;
        for _ in 0..50 {
            cleared += stats.reset().errors;
        }
        writer.join().unwrap();
        cleared += stats.reset().errors;

        // Every increment was cleared by exactly one reset.
        assert_eq!(cleared, 10_000);
    }

    #[test]
    fn test_derived_rates() {
        let snap = snapshot(100, 80, 15, 3, 2);

        assert_eq!(snap.success_rate(), 0.8);
        assert_eq!(snap.throttle_ratio(), 0.15);
        assert_eq!(snap.requests_per_second(Duration::from_secs(50)), 2.0);
        assert_eq!(snap.requests_per_second(Duration::ZERO), 0.0);
        assert_eq!(StatsSnapshot::default().success_rate(), 0.0);
    }

    #[test]
    fn test_health_status() {
        assert_eq!(snapshot(100, 95, 5, 0, 0).health_status(), HealthStatus::Healthy);
        assert_eq!(snapshot(100, 60, 40, 0, 0).health_status(), HealthStatus::Degraded);
        assert_eq!(snapshot(100, 80, 0, 0, 20).health_status(), HealthStatus::Critical);
        assert_eq!(StatsSnapshot::default().health_status(), HealthStatus::Healthy);

        assert!(!HealthStatus::Healthy.is_unhealthy());
        assert!(HealthStatus::Degraded.is_unhealthy());
        assert!(HealthStatus::Critical.suggested_action().contains("Immediate"));
    }

    #[test]
    fn test_summary_and_json() {
        let snap = snapshot(120, 100, 15, 3, 2);

        let summary = snap.summary();
        assert!(summary.contains("Total: 120"));
        assert!(summary.contains("Queue Full: 2"));
        assert_eq!(format!("{}", snap), summary);

        let json = serde_json::to_value(snap).unwrap();
        assert_eq!(json["total_requests"], 120);
        assert_eq!(json["queue_full"], 2);
        assert_eq!(json.as_object().unwrap().len(), 5);
    }
}
