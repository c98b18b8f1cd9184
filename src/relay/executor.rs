//! # Action Executors
//!
//! The side effect behind a command sits behind [`ActionExecutor`]. The
//! dispatcher and the worker pool only see success or an [`ExecutionError`].
//!
//! ```text
//!     Command::Primary   ──► ProcessExecutor ──► `xdotool key space`
//!     Command::Secondary ──► ProcessExecutor ──► `xdotool key Down`
//!
//!     any Command        ──► DryRunExecutor  ──► log line only
//! ```

use super::command::Command;
use super::error::ExecutionError;
use std::fmt;
use std::process::{Child, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default deadline for one key-injection call.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_millis(250);

/// How often a running child is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Performs the host side effect for a validated command.
///
/// Implementations must be shareable across request threads and worker
/// threads, must convert every failure into an [`ExecutionError`], and must
/// return within a bounded time.
pub trait ActionExecutor: Send + Sync + fmt::Debug {
    /// Performs the action for `cmd`.
    fn execute(&self, cmd: Command) -> Result<(), ExecutionError>;
}

/// Runs an external key-injection program for each command.
///
/// # Example
///
/// ```rust,no_run
/// use keyrelay::{ActionExecutor, Command, ProcessExecutor};
///
/// let executor = ProcessExecutor::xdotool();
/// executor.execute(Command::Primary)?;
/// # Ok::<(), keyrelay::ExecutionError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: String,
    args: Vec<String>,
    primary_key: String,
    secondary_key: String,
    timeout: Duration,
}

impl ProcessExecutor {
    /// Creates an executor that runs `program <args..> <key>`.
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        primary_key: impl Into<String>,
        secondary_key: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            primary_key: primary_key.into(),
            secondary_key: secondary_key.into(),
            timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }

    /// `xdotool key space` for primary, `xdotool key Down` for secondary.
    pub fn xdotool() -> Self {
        Self::new("xdotool", vec!["key".to_string()], "space", "Down")
    }

    /// Sets the deadline after which the child is killed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Key name passed to the program for `cmd`.
    pub fn key_for(&self, cmd: Command) -> &str {
        match cmd {
            Command::Primary => &self.primary_key,
            Command::Secondary => &self.secondary_key,
        }
    }

    fn wait_with_deadline(&self, mut child: Child) -> Result<(), ExecutionError> {
        let deadline = Instant::now() + self.timeout;

        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return Ok(()),
                Ok(Some(status)) => {
                    return Err(ExecutionError::Exited {
                        program: self.program.clone(),
                        code: status.code(),
                    })
                }
                Ok(None) if Instant::now() >= deadline => {
                    // Kill can fail if the child exited in between; reaping covers both.
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ExecutionError::Timeout {
                        program: self.program.clone(),
                        after: self.timeout,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => {
                    let _ = child.kill();
                    return Err(ExecutionError::Spawn {
                        program: self.program.clone(),
                        source,
                    });
                }
            }
        }
    }
}

impl ActionExecutor for ProcessExecutor {
    fn execute(&self, cmd: Command) -> Result<(), ExecutionError> {
        let key = self.key_for(cmd);
        debug!("Running {} {:?} {}", self.program, self.args, key);

        let child = std::process::Command::new(&self.program)
            .args(&self.args)
            .arg(key)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ExecutionError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let result = self.wait_with_deadline(child);
        if let Err(err) = &result {
            warn!(error = %err, label = err.as_label(), "Key injection failed for {}", cmd);
        }
        result
    }
}

/// Logs each action and reports success without touching the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunExecutor;

impl ActionExecutor for DryRunExecutor {
    fn execute(&self, cmd: Command) -> Result<(), ExecutionError> {
        info!("[dry-run] {}", cmd.as_str().to_uppercase());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_always_succeeds() {
        let executor = DryRunExecutor;
        for cmd in Command::ALL {
            assert!(executor.execute(cmd).is_ok());
        }
    }

    #[test]
    fn test_key_mapping() {
        let executor = ProcessExecutor::xdotool();
        assert_eq!(executor.key_for(Command::Primary), "space");
        assert_eq!(executor.key_for(Command::Secondary), "Down");
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let executor = ProcessExecutor::new(
            "keyrelay-definitely-not-installed",
            Vec::new(),
            "a",
            "b",
        );

        let err = executor.execute(Command::Primary).unwrap_err();
        assert!(matches!(err, ExecutionError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_program() {
        // `true` ignores its arguments and exits 0.
        let executor = ProcessExecutor::new("true", Vec::new(), "space", "Down");
        assert!(executor.execute(Command::Primary).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_program() {
        let executor = ProcessExecutor::new("false", Vec::new(), "space", "Down");
        let err = executor.execute(Command::Secondary).unwrap_err();
        assert!(matches!(err, ExecutionError::Exited { code: Some(1), .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_slow_program_is_killed() {
        // `sleep 5` via the primary key slot.
        let executor = ProcessExecutor::new("sleep", Vec::new(), "5", "5")
            .with_timeout(Duration::from_millis(50));

        let start = Instant::now();
        let err = executor.execute(Command::Primary).unwrap_err();

        assert!(matches!(err, ExecutionError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
