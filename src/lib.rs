//! # KeyRelay - Rate-Limited Remote Key Injection
//!
//! A small service that accepts remote "press a key" commands and turns them
//! into synthetic keystrokes on the host, protected by a two-tier admission
//! gate so a noisy client can never flood the desktop with input.
//!
//! ## How a Command Flows
//!
//! ```text
//!     POST /comando {"comando": "primary"}
//!                │
//!                ▼
//!     ┌──────────────────────┐
//!     │  Parse               │  "primary" / "saltar"   → Primary
//!     │                      │  "secondary" / "agachar" → Secondary
//!     └──────────┬───────────┘
//!                ▼
//!     ┌──────────────────────┐
//!     │  Admission           │  cooldown (20ms) then sliding window (1s)
//!     └──────────┬───────────┘
//!                ▼
//!     ┌──────────────────────┐   fails   ┌─────────────────────┐
//!     │  Direct execution    │ ────────► │ Bounded queue (20)  │
//!     │  (xdotool key ...)   │           │ + worker pool (4)   │
//!     └──────────┬───────────┘           └─────────────────────┘
//!                ▼
//!          ok / queued / throttled / rate_limited / busy
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use keyrelay::{DryRunExecutor, Outcome, RelayBuilder};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let dispatcher = RelayBuilder::new()
//!     .min_interval(Duration::from_millis(200))
//!     .workers(2)
//!     .queue_capacity(8)
//!     .build(Arc::new(DryRunExecutor))?;
//! dispatcher.start()?;
//!
//! assert!(dispatcher.handle("saltar").is_accepted());
//! // A second press inside the cooldown is dropped.
//! assert_eq!(dispatcher.handle("agachar"), Outcome::Throttled);
//!
//! dispatcher.shutdown();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Admission
//!
//! Two checks run under a single lock, in order:
//!
//! 1. **Cooldown**: a request within `min_interval` of the last accepted
//!    action is `Throttled` and leaves no trace in the window.
//! 2. **Sliding window**: if more than the per-second ceiling (or the flood
//!    threshold, whichever is larger) of admitted requests fall inside the
//!    last second, the request is `RateLimited`.
//!
//! Everything else is `Allowed` and becomes the new reference point for the
//! cooldown.
//!
//! ## Thread Safety
//!
//! [`Dispatcher`] is `Send + Sync`; share it via [`SharedDispatcher`]. The
//! HTTP layer in [`server`] does exactly that across its handler threads.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    missing_debug_implementations
)]
#![forbid(unsafe_code)]

// Internal module
mod relay;

pub mod server;

// Public re-exports
pub use relay::{
    current_time_ms, report, unix_timestamp, ActionExecutor, AdmissionGate, Command, CommandError,
    ConfigError, Counter, Decision, Dispatcher, DryRunExecutor, ExecutionError, HealthStatus,
    MemoryOrdering, Method, Monitor, Outcome, OverflowQueue, ProcessExecutor, RelayConfig,
    ServerError, StatsAggregator, StatsSnapshot, WorkerPool, DEFAULT_ACTION_TIMEOUT,
    DEFAULT_MONITOR_INTERVAL, SLIDING_WINDOW,
};
pub use server::RelayServer;

/// A dispatcher wrapped in `Arc` for sharing between the HTTP handlers,
/// the monitor, and the caller.
///
/// # Example
/// ```rust
/// use keyrelay::{Dispatcher, DryRunExecutor, RelayConfig, SharedDispatcher};
/// use std::sync::Arc;
///
/// let shared: SharedDispatcher =
///     Arc::new(Dispatcher::new(RelayConfig::default(), Arc::new(DryRunExecutor))?);
///
/// let clone = shared.clone();
/// std::thread::spawn(move || {
///     clone.handle("primary");
/// })
/// .join()
/// .unwrap();
///
/// assert_eq!(shared.stats().total_requests, 1);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub type SharedDispatcher = std::sync::Arc<Dispatcher>;

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum supported Rust version.
///
/// 1.74 is required by clap 4.5.
pub const MSRV: &str = "1.74.0";

/// Prelude module for convenient imports.
///
/// ```rust
/// use keyrelay::prelude::*;
/// ```
pub mod prelude {
    //! Common imports for embedding the relay.
    //!
    //! # Example
    //! ```rust
    //! use keyrelay::prelude::*;
    //! use std::sync::Arc;
    //!
    //! let dispatcher = RelayBuilder::new().build(Arc::new(DryRunExecutor)).unwrap();
    //! let status = HealthStatus::Healthy;
    //! ```

    pub use crate::{
        ActionExecutor, Command, Dispatcher, DryRunExecutor, HealthStatus, MemoryOrdering,
        Method, Outcome, ProcessExecutor, RelayBuilder, RelayConfig, SharedDispatcher,
        StatsSnapshot,
    };
}

/// Fluent construction of a [`Dispatcher`].
///
/// Defaults match [`RelayConfig::default`]: 20ms cooldown, 40 requests per
/// second, flood threshold 35, window capacity 50, queue capacity 20, and
/// 4 workers.
///
/// # Example
///
/// ```rust
/// use keyrelay::{DryRunExecutor, MemoryOrdering, RelayBuilder};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let dispatcher = RelayBuilder::new()
///     .min_interval(Duration::from_millis(50))
///     .rate_limit(20, 15)
///     .window_capacity(30)
///     .memory_ordering(MemoryOrdering::Sequential)
///     .build(Arc::new(DryRunExecutor))?;
///
/// assert_eq!(dispatcher.config().effective_limit(), 20);
///
/// // Invalid settings are rejected up front.
/// let result = RelayBuilder::new().workers(0).build(Arc::new(DryRunExecutor));
/// assert!(result.is_err());
/// # Ok::<(), keyrelay::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct RelayBuilder {
    config: RelayConfig,
}

impl RelayBuilder {
    /// Creates a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration.
    pub fn from_config(config: RelayConfig) -> Self {
        Self { config }
    }

    /// Minimum spacing between accepted actions.
    pub fn min_interval(mut self, interval: std::time::Duration) -> Self {
        self.config = self.config.with_min_interval(interval);
        self
    }

    /// Per-second ceiling and flood threshold for the sliding window.
    ///
    /// The window trips once it holds more than the larger of the two.
    pub fn rate_limit(mut self, max_requests_per_second: usize, flood_threshold: usize) -> Self {
        self.config = self
            .config
            .with_rate_limit(max_requests_per_second, flood_threshold);
        self
    }

    /// Maximum timestamps retained by the sliding window.
    pub fn window_capacity(mut self, capacity: usize) -> Self {
        self.config = self.config.with_window_capacity(capacity);
        self
    }

    /// Capacity of the overflow queue.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config = self.config.with_queue_capacity(capacity);
        self
    }

    /// Number of fallback worker threads.
    pub fn workers(mut self, workers: usize) -> Self {
        self.config = self.config.with_workers(workers);
        self
    }

    /// Memory ordering for the stats counters.
    pub fn memory_ordering(mut self, ordering: MemoryOrdering) -> Self {
        self.config = self.config.with_ordering(ordering);
        self
    }

    /// Validates the configuration and builds an idle dispatcher.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any limit is zero or the window cannot
    /// hold enough timestamps to enforce the rate limit.
    pub fn build(
        self,
        executor: std::sync::Arc<dyn ActionExecutor>,
    ) -> Result<Dispatcher, ConfigError> {
        Dispatcher::new(self.config, executor)
    }
}
