//! Error types for the relay.
//!
//! - [`CommandError`]: a payload that does not name a known command.
//! - [`ExecutionError`]: the host action could not be performed.
//! - [`ConfigError`]: an invalid [`RelayConfig`](crate::RelayConfig).
//! - [`ServerError`]: the HTTP transport could not start or serve.
//!
//! Each type provides `as_label()` for stable log fields.

use std::time::Duration;
use thiserror::Error;

/// A raw command string that could not be turned into a [`Command`](crate::Command).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The payload was empty.
    #[error("empty command")]
    Empty,

    /// The payload named something other than a known command.
    #[error("unrecognized command: {0:?}")]
    Unrecognized(String),
}

impl CommandError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            CommandError::Empty => "command_empty",
            CommandError::Unrecognized(_) => "command_unrecognized",
        }
    }
}

/// # Errors produced while performing a host action.
///
/// Partial side effects are possible when any of these is returned.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The key-injection program could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that was being launched.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The program ran but reported failure.
    #[error("{program} exited with status {code:?}")]
    Exited {
        /// Program that was run.
        program: String,
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
    },

    /// The program did not finish before the deadline and was killed.
    #[error("{program} timed out after {after:?}")]
    Timeout {
        /// Program that was run.
        program: String,
        /// Deadline that was exceeded.
        after: Duration,
    },

    /// The action surface is temporarily unavailable.
    #[error("action surface unavailable: {0}")]
    Unavailable(String),
}

impl ExecutionError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ExecutionError::Spawn { .. } => "execution_spawn",
            ExecutionError::Exited { .. } => "execution_exited",
            ExecutionError::Timeout { .. } => "execution_timeout",
            ExecutionError::Unavailable(_) => "execution_unavailable",
        }
    }
}

/// Invalid relay configuration.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `max_requests_per_second` was zero.
    #[error("max_requests_per_second must be greater than 0")]
    ZeroRateLimit,

    /// The sliding window cannot hold enough timestamps to ever rate limit.
    #[error("window_capacity ({capacity}) must exceed the effective rate limit ({limit})")]
    WindowTooSmall {
        /// Configured window capacity.
        capacity: usize,
        /// Larger of the ceiling and the flood threshold.
        limit: usize,
    },

    /// `queue_capacity` was zero.
    #[error("queue_capacity must be greater than 0")]
    ZeroQueueCapacity,

    /// `workers` was zero.
    #[error("workers must be greater than 0")]
    ZeroWorkers,
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::ZeroRateLimit => "config_zero_rate_limit",
            ConfigError::WindowTooSmall { .. } => "config_window_too_small",
            ConfigError::ZeroQueueCapacity => "config_zero_queue_capacity",
            ConfigError::ZeroWorkers => "config_zero_workers",
        }
    }
}

/// Errors raised by the HTTP transport.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {reason}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Reason reported by the transport.
        reason: String,
    },

    /// I/O failure while serving.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ServerError::Bind { .. } => "server_bind",
            ServerError::Io(_) => "server_io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(CommandError::Empty.as_label(), "command_empty");
        assert_eq!(
            CommandError::Unrecognized("jump".into()).as_label(),
            "command_unrecognized"
        );
        assert_eq!(
            ExecutionError::Unavailable("display".into()).as_label(),
            "execution_unavailable"
        );
        assert_eq!(ConfigError::ZeroWorkers.as_label(), "config_zero_workers");
    }

    #[test]
    fn test_messages() {
        let err = CommandError::Unrecognized("jump".into());
        assert_eq!(err.to_string(), "unrecognized command: \"jump\"");

        let err = ExecutionError::Timeout {
            program: "xdotool".into(),
            after: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "xdotool timed out after 250ms");

        let err = ConfigError::WindowTooSmall { capacity: 10, limit: 40 };
        assert!(err.to_string().contains("window_capacity (10)"));
    }
}
