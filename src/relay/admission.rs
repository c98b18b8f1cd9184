//! # Admission Gate
//!
//! Decides, per incoming command, whether it may proceed to execution.
//!
//! ## Two Tiers
//!
//! ```text
//!     admit(now)
//!        │
//!        ▼
//!     now - last_action < min_interval? ──Yes──► Throttled (window untouched)
//!        │ No
//!        ▼
//!     push now, evict entries older than now - 1s
//!        │
//!        ▼
//!     len > ceiling AND len > flood? ──Yes──► RateLimited
//!        │ No
//!        ▼
//!     last_action = now ──► Allowed
//! ```
//!
//! The cooldown rejects back-to-back duplicate presses cheaply; the window
//! only bites under sustained flooding, so interactive latency stays flat.
//!
//! ## Serialization
//!
//! Both tiers run under one `parking_lot::Mutex`. Two callers can never both
//! observe "enough time has passed" before either records its action.

use super::config::{RelayConfig, SLIDING_WINDOW};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The command may proceed.
    Allowed,

    /// Arrived inside the cooldown after the previous accepted action.
    Throttled,

    /// The sliding window is flooded.
    RateLimited,
}

impl Decision {
    /// Returns `true` for [`Decision::Allowed`].
    #[inline]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// Process-wide state mutated by every admission check.
#[derive(Debug)]
struct AdmissionState {
    /// When the last accepted action was admitted.
    last_action: Option<Instant>,

    /// Recent arrivals that passed the cooldown, oldest first.
    recent: VecDeque<Instant>,
}

/// Two-tier admission gate: a minimum interval plus a sliding-window rate check.
///
/// # Example
///
/// ```rust
/// use keyrelay::{AdmissionGate, Decision, RelayConfig};
/// use std::time::{Duration, Instant};
///
/// let gate = AdmissionGate::new(&RelayConfig::default());
/// let t0 = Instant::now();
///
/// assert_eq!(gate.admit(t0), Decision::Allowed);
/// assert_eq!(gate.admit(t0 + Duration::from_millis(10)), Decision::Throttled);
/// assert_eq!(gate.admit(t0 + Duration::from_millis(25)), Decision::Allowed);
/// ```
#[derive(Debug)]
pub struct AdmissionGate {
    state: Mutex<AdmissionState>,
    min_interval: Duration,
    max_per_window: usize,
    flood_threshold: usize,
    window_capacity: usize,
}

impl AdmissionGate {
    /// Creates a gate from the admission fields of `config`.
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            state: Mutex::new(AdmissionState {
                last_action: None,
                recent: VecDeque::with_capacity(config.window_capacity),
            }),
            min_interval: config.min_interval,
            max_per_window: config.max_requests_per_second,
            flood_threshold: config.flood_threshold,
            window_capacity: config.window_capacity,
        }
    }

    /// Runs both admission tiers for an arrival at `now`.
    ///
    /// Callers racing on the gate are serialized; an arrival whose `now` is
    /// earlier than the last accepted action counts as zero elapsed time and
    /// is throttled.
    pub fn admit(&self, now: Instant) -> Decision {
        let mut state = self.state.lock();

        if let Some(last) = state.last_action {
            if now.saturating_duration_since(last) < self.min_interval {
                debug!("Throttled: inside {:?} cooldown", self.min_interval);
                return Decision::Throttled;
            }
        }

        if state.recent.len() == self.window_capacity {
            state.recent.pop_front();
        }
        state.recent.push_back(now);

        while let Some(&oldest) = state.recent.front() {
            if now.saturating_duration_since(oldest) > SLIDING_WINDOW {
                state.recent.pop_front();
            } else {
                break;
            }
        }

        let len = state.recent.len();
        if len > self.max_per_window && len > self.flood_threshold {
            debug!("Rate limited: {} requests in the last {:?}", len, SLIDING_WINDOW);
            return Decision::RateLimited;
        }

        state.last_action = Some(now);
        Decision::Allowed
    }

    /// Convenience wrapper for `admit(Instant::now())`.
    #[inline]
    pub fn admit_now(&self) -> Decision {
        self.admit(Instant::now())
    }

    /// Number of timestamps currently held in the sliding window.
    pub fn window_len(&self) -> usize {
        self.state.lock().recent.len()
    }
}
