//! # Relay Module
//!
//! The admission-and-dispatch pipeline. Each submodule owns one stage.
//!
//! ## Module Structure
//!
//! ```text
//!     relay/
//!     ├── mod.rs          (You are here - Module organization)
//!     ├── config.rs       (Limits, capacities, memory ordering)
//!     ├── command.rs      (Closed command enum, boundary parsing)
//!     ├── admission.rs    (Cooldown + sliding window gate)
//!     ├── executor.rs     (Host side effect behind a trait)
//!     ├── overflow.rs     (Bounded queue + fallback worker pool)
//!     ├── stats.rs        (Outcome counters, health)
//!     ├── dispatcher.rs   (Orchestration)
//!     ├── monitor.rs      (Periodic stats logging)
//!     ├── error.rs        (Error taxonomy)
//!     └── utils.rs        (Clock helpers)
//! ```
//!
//! ## Architecture Flow
//!
//! ```text
//!     Raw command
//!          │
//!          ▼
//!     ┌────────────┐
//!     │ Dispatcher │ ◄── parse, count, route
//!     └─────┬──────┘
//!           ▼
//!     ┌────────────┐
//!     │ Admission  │ ◄── Throttled / RateLimited short-circuit
//!     └─────┬──────┘
//!           ▼
//!     ┌────────────┐      failure      ┌──────────────┐
//!     │ Executor   │ ────────────────► │ Overflow +   │
//!     └─────┬──────┘                   │ Worker Pool  │
//!           │                          └──────┬───────┘
//!           ▼                                 ▼
//!     ┌──────────────────────────────────────────────┐
//!     │                    Stats                     │
//!     └──────────────────────────────────────────────┘
//! ```

mod admission;
mod command;
mod config;
mod dispatcher;
mod error;
mod executor;
mod monitor;
mod overflow;
mod stats;
mod utils;

/// Configuration types and limits
pub use config::{MemoryOrdering, RelayConfig, SLIDING_WINDOW};

/// Validated commands
pub use command::Command;

/// Admission gate
pub use admission::{AdmissionGate, Decision};

/// Host action executors
pub use executor::{ActionExecutor, DryRunExecutor, ProcessExecutor, DEFAULT_ACTION_TIMEOUT};

/// Fallback queue and workers
pub use overflow::{OverflowQueue, WorkerPool};

/// Counters and health
pub use stats::{Counter, HealthStatus, StatsAggregator, StatsSnapshot};

/// Orchestration
pub use dispatcher::{Dispatcher, Method, Outcome};

/// Periodic reporting
pub use monitor::{report, Monitor, DEFAULT_MONITOR_INTERVAL};

/// Error taxonomy
pub use error::{CommandError, ConfigError, ExecutionError, ServerError};

/// Clock helpers
pub use utils::{current_time_ms, unix_timestamp};
