//! # Dispatcher
//!
//! Receives a raw command string and drives it through the pipeline:
//!
//! ```text
//!     handle(raw)
//!        │  total_requests += 1
//!        ▼
//!     parse ──invalid──► InvalidCommand        (errors += 1)
//!        │
//!        ▼
//!     admission ──Throttled / RateLimited──►   (throttled_requests += 1)
//!        │ Allowed
//!        ▼
//!     executor ──Ok──► Accepted(direct)        (successful_actions += 1)
//!        │ Err
//!        ▼
//!     overflow queue ──Ok──► Accepted(queued)  (a worker records the result)
//!        │ full
//!        ▼
//!     Busy                                     (queue_full += 1)
//! ```
//!
//! A failed direct attempt is never surfaced when the queue accepts the
//! command; callers only see a definitive failure when no recovery path exists.

use super::admission::{AdmissionGate, Decision};
use super::command::Command;
use super::config::RelayConfig;
use super::error::{CommandError, ConfigError};
use super::executor::ActionExecutor;
use super::overflow::{OverflowQueue, WorkerPool};
use super::stats::{Counter, StatsAggregator, StatsSnapshot};
use super::utils::unix_timestamp;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How an accepted command was fulfilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Executed inside the request call.
    Direct,
    /// Handed to the worker pool after a failed direct attempt.
    Queued,
}

impl Method {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Direct => "direct",
            Method::Queued => "queued",
        }
    }
}

/// Terminal result of [`Dispatcher::handle`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The command was executed or queued for execution.
    Accepted {
        /// Command that was accepted.
        command: Command,
        /// Direct or queued.
        method: Method,
        /// Admission time as UNIX seconds.
        timestamp: f64,
    },

    /// Inside the cooldown after the previous accepted action.
    Throttled,

    /// The sliding window is flooded.
    RateLimited,

    /// Direct execution failed and the overflow queue was full.
    Busy,

    /// The payload did not name a known command.
    InvalidCommand(CommandError),

    /// The transport could not extract a command from the request at all.
    Malformed(String),
}

impl Outcome {
    /// Returns `true` for [`Outcome::Accepted`].
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted { .. })
    }

    /// Fulfillment method, for accepted outcomes.
    pub fn method(&self) -> Option<Method> {
        match self {
            Outcome::Accepted { method, .. } => Some(*method),
            _ => None,
        }
    }
}

/// Orchestrates admission, execution, fallback, and accounting.
///
/// A dispatcher is created idle; [`Dispatcher::start`] spawns the worker
/// pool that drains the overflow queue.
///
/// # Example
///
/// ```rust
/// use keyrelay::{Dispatcher, DryRunExecutor, Method, Outcome, RelayConfig};
/// use std::sync::Arc;
///
/// let dispatcher = Dispatcher::new(RelayConfig::default(), Arc::new(DryRunExecutor))?;
/// dispatcher.start()?;
///
/// let outcome = dispatcher.handle("primary");
/// assert_eq!(outcome.method(), Some(Method::Direct));
///
/// assert!(matches!(dispatcher.handle("jump"), Outcome::InvalidCommand(_)));
/// dispatcher.shutdown();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Dispatcher {
    config: RelayConfig,
    gate: AdmissionGate,
    executor: Arc<dyn ActionExecutor>,
    queue: OverflowQueue,
    stats: Arc<StatsAggregator>,
    pool: Mutex<Option<WorkerPool>>,
    started_at: Instant,
}

impl Dispatcher {
    /// Validates `config` and builds an idle dispatcher.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] from [`RelayConfig::validate`].
    pub fn new(config: RelayConfig, executor: Arc<dyn ActionExecutor>) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            gate: AdmissionGate::new(&config),
            queue: OverflowQueue::new(config.queue_capacity),
            stats: Arc::new(StatsAggregator::new(config.ordering)),
            pool: Mutex::new(None),
            started_at: Instant::now(),
            executor,
            config,
        })
    }

    /// Spawns the fallback worker pool. Does nothing if already running.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if a worker thread cannot be spawned.
    pub fn start(&self) -> io::Result<()> {
        let mut pool = self.pool.lock();
        if pool.is_none() {
            *pool = Some(WorkerPool::start(
                self.config.workers,
                &self.queue,
                self.executor.clone(),
                self.stats.clone(),
            )?);
        }
        Ok(())
    }

    /// Stops the worker pool. Queued commands are abandoned.
    pub fn shutdown(&self) {
        // Take the pool out first so the lock is not held while joining.
        let pool = self.pool.lock().take();
        if let Some(pool) = pool {
            pool.shutdown();
        }
    }

    /// Runs `raw` through the pipeline, using the current time for admission.
    pub fn handle(&self, raw: &str) -> Outcome {
        self.handle_at(raw, Instant::now())
    }

    /// Runs `raw` through the pipeline with an explicit admission time.
    pub fn handle_at(&self, raw: &str, now: Instant) -> Outcome {
        self.stats.increment(Counter::TotalRequests);

        let command = match raw.parse::<Command>() {
            Ok(command) => command,
            Err(err) => {
                self.stats.increment(Counter::Errors);
                debug!(label = err.as_label(), "Rejected payload: {}", err);
                return Outcome::InvalidCommand(err);
            }
        };

        match self.gate.admit(now) {
            Decision::Allowed => {}
            Decision::Throttled => {
                self.stats.increment(Counter::ThrottledRequests);
                return Outcome::Throttled;
            }
            Decision::RateLimited => {
                self.stats.increment(Counter::ThrottledRequests);
                return Outcome::RateLimited;
            }
        }

        let timestamp = unix_timestamp();
        match self.executor.execute(command) {
            Ok(()) => {
                let total = self.stats.increment(Counter::SuccessfulActions);
                info!("{}! (total: {})", command.as_str().to_uppercase(), total);
                Outcome::Accepted {
                    command,
                    method: Method::Direct,
                    timestamp,
                }
            }
            Err(err) => {
                if self.queue.enqueue(command) {
                    debug!(error = %err, "Direct {} failed, queued for retry", command);
                    Outcome::Accepted {
                        command,
                        method: Method::Queued,
                        timestamp,
                    }
                } else {
                    self.stats.increment(Counter::QueueFull);
                    warn!(error = %err, "Direct {} failed and overflow queue is full", command);
                    Outcome::Busy
                }
            }
        }
    }

    /// Accounts for a request whose body could not be read as a command.
    pub fn reject_malformed(&self, reason: impl Into<String>) -> Outcome {
        self.stats.increment(Counter::TotalRequests);
        self.stats.increment(Counter::Errors);
        let reason = reason.into();
        debug!("Malformed request: {}", reason);
        Outcome::Malformed(reason)
    }

    /// Current counter values.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Zeroes every counter.
    pub fn reset_stats(&self) -> StatsSnapshot {
        let cleared = self.stats.reset();
        info!("Stats reset ({} requests cleared)", cleared.total_requests);
        cleared
    }

    /// Commands waiting in the overflow queue.
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Workers currently executing a queued command.
    pub fn active_workers(&self) -> usize {
        self.pool.lock().as_ref().map_or(0, WorkerPool::active)
    }

    /// Worker threads running, 0 before [`Dispatcher::start`].
    pub fn worker_threads(&self) -> usize {
        self.pool.lock().as_ref().map_or(0, WorkerPool::size)
    }

    /// Time since the dispatcher was created. Not affected by stat resets.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Configuration in effect.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::error::ExecutionError;
    use crate::relay::executor::DryRunExecutor;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct Flaky {
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    impl ActionExecutor for Flaky {
        fn execute(&self, _cmd: Command) -> Result<(), ExecutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(ExecutionError::Unavailable("forced".into()))
            } else {
                Ok(())
            }
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn dispatcher_with(config: RelayConfig) -> (Dispatcher, Arc<Flaky>) {
        let executor = Arc::new(Flaky::default());
        let dispatcher = Dispatcher::new(config, executor.clone()).unwrap();
        (dispatcher, executor)
    }

    #[test]
    fn test_direct_execution() {
        let (dispatcher, executor) = dispatcher_with(RelayConfig::default());

        let outcome = dispatcher.handle("secondary");
        match outcome {
            Outcome::Accepted { command, method, timestamp } => {
                assert_eq!(command, Command::Secondary);
                assert_eq!(method, Method::Direct);
                assert!(timestamp > 0.0);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let stats = dispatcher.stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.successful_actions, 1);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_command() {
        let (dispatcher, executor) = dispatcher_with(RelayConfig::default());

        let outcome = dispatcher.handle("jump");
        assert_eq!(
            outcome,
            Outcome::InvalidCommand(CommandError::Unrecognized("jump".into()))
        );

        let stats = dispatcher.stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_command_does_not_consume_cooldown() {
        let (dispatcher, _) = dispatcher_with(RelayConfig::default());
        let t0 = Instant::now();

        assert!(matches!(dispatcher.handle_at("", t0), Outcome::InvalidCommand(_)));
        assert!(dispatcher.handle_at("primary", t0 + ms(1)).is_accepted());
    }

    #[test]
    fn test_throttled_short_circuits_executor() {
        let (dispatcher, executor) = dispatcher_with(RelayConfig::default());
        let t0 = Instant::now();

        assert!(dispatcher.handle_at("primary", t0).is_accepted());
        assert_eq!(dispatcher.handle_at("primary", t0 + ms(10)), Outcome::Throttled);

        let stats = dispatcher.stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.throttled_requests, 1);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rate_limited_counts_as_throttled() {
        let config = RelayConfig::default().with_min_interval(ms(5));
        let (dispatcher, _) = dispatcher_with(config);
        let t0 = Instant::now();

        let outcomes: Vec<Outcome> = (0..50)
            .map(|i| dispatcher.handle_at("primary", t0 + ms(i * 10)))
            .collect();

        let accepted = outcomes.iter().filter(|o| o.is_accepted()).count();
        let limited = outcomes
            .iter()
            .filter(|o| **o == Outcome::RateLimited)
            .count();
        assert_eq!(accepted, 40);
        assert_eq!(limited, 10);

        let stats = dispatcher.stats();
        assert_eq!(stats.throttled_requests, 10);
        assert_eq!(stats.successful_actions, 40);
    }

    #[test]
    fn test_failure_falls_back_then_busy() {
        let config = RelayConfig::default().with_queue_capacity(1);
        let (dispatcher, executor) = dispatcher_with(config);
        executor.fail.store(true, Ordering::SeqCst);
        let t0 = Instant::now();

        // No workers started, so nothing drains the queue.
        let first = dispatcher.handle_at("primary", t0);
        let second = dispatcher.handle_at("primary", t0 + ms(30));

        assert_eq!(first.method(), Some(Method::Queued));
        assert_eq!(second, Outcome::Busy);

        let stats = dispatcher.stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.queue_full, 1);
        assert_eq!(stats.errors, 0);
        assert_eq!(dispatcher.queue_depth(), 1);
    }

    #[test]
    fn test_malformed_is_counted_as_error() {
        let (dispatcher, _) = dispatcher_with(RelayConfig::default());

        let outcome = dispatcher.reject_malformed("missing comando");
        assert_eq!(outcome, Outcome::Malformed("missing comando".into()));

        let stats = dispatcher.stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.errors, 1);
    }

    #[test]
    fn test_reset_keeps_uptime() {
        let dispatcher =
            Dispatcher::new(RelayConfig::default(), Arc::new(DryRunExecutor)).unwrap();
        dispatcher.handle("primary");

        let before = dispatcher.uptime();
        let cleared = dispatcher.reset_stats();

        assert_eq!(cleared.total_requests, 1);
        assert_eq!(dispatcher.stats(), StatsSnapshot::default());
        assert!(dispatcher.uptime() >= before);
    }

    #[test]
    fn test_start_is_idempotent() {
        let dispatcher =
            Dispatcher::new(RelayConfig::default().with_workers(2), Arc::new(DryRunExecutor))
                .unwrap();
        assert_eq!(dispatcher.worker_threads(), 0);

        dispatcher.start().unwrap();
        dispatcher.start().unwrap();
        assert_eq!(dispatcher.worker_threads(), 2);

        dispatcher.shutdown();
        assert_eq!(dispatcher.worker_threads(), 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = Dispatcher::new(
            RelayConfig::default().with_workers(0),
            Arc::new(DryRunExecutor),
        );
        assert!(matches!(result, Err(ConfigError::ZeroWorkers)));
    }
}
