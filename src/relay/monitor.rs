//! # Monitor
//!
//! A background thread that periodically logs the dispatcher's stats. It only
//! reads; nothing in the pipeline depends on it.

use super::dispatcher::Dispatcher;
use std::io;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Default reporting interval.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(30);

/// Handle to a running monitor thread.
///
/// # Example
///
/// ```rust
/// use keyrelay::{Dispatcher, DryRunExecutor, Monitor, RelayConfig};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let dispatcher = Arc::new(Dispatcher::new(RelayConfig::default(), Arc::new(DryRunExecutor))?);
/// let monitor = Monitor::start(dispatcher.clone(), Duration::from_secs(30))?;
///
/// // Later, to stop the thread:
/// monitor.stop();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Monitor {
    handle: thread::JoinHandle<()>,
    stop_tx: mpsc::Sender<()>,
}

impl Monitor {
    /// Spawns the `keyrelay-monitor` thread, reporting every `interval`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the thread cannot be spawned.
    pub fn start(dispatcher: Arc<Dispatcher>, interval: Duration) -> io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("keyrelay-monitor".to_string())
            .spawn(move || {
                info!("Started monitor (interval: {:?})", interval);

                loop {
                    match stop_rx.recv_timeout(interval) {
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                            info!("Monitor stopping");
                            break;
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => report(&dispatcher),
                    }
                }
            })?;

        Ok(Self { handle, stop_tx })
    }

    /// Signals the thread to stop and waits for it.
    pub fn stop(self) {
        // The thread also stops if the sender is dropped, so a failed send is fine.
        let _ = self.stop_tx.send(());
        if self.handle.join().is_err() {
            warn!("Monitor thread panicked");
        }
    }
}

/// Logs one report for `dispatcher`.
pub fn report(dispatcher: &Dispatcher) {
    let stats = dispatcher.stats();
    let uptime = dispatcher.uptime();

    info!(
        "Uptime {:.0}s | {:.2} req/s | queue {}/{} | active workers {}\n{}",
        uptime.as_secs_f64(),
        stats.requests_per_second(uptime),
        dispatcher.queue_depth(),
        dispatcher.config().queue_capacity,
        dispatcher.active_workers(),
        stats.summary()
    );

    let health = stats.health_status();
    if health.is_unhealthy() {
        warn!("Relay {}: {}", health, health.suggested_action());
    }
}
