//! # Overflow Queue and Worker Pool
//!
//! When a direct execution fails, the command is parked in a bounded queue
//! and retried by a fixed pool of background threads.
//!
//! ```text
//!     request thread                       worker threads
//!     ──────────────                       ──────────────
//!     enqueue(cmd) ──try_send──► [ ▢ ▢ ▢ ▢ ] ──recv──► keypress-0 ──► executor
//!          │                     capacity N  ──recv──► keypress-1 ──► executor
//!          ▼                                 ──recv──► ...
//!     false when full (never blocks)
//! ```
//!
//! The queue is a `crossbeam` bounded channel: FIFO among queued items,
//! non-blocking `try_send` for producers, blocking `recv` for consumers.
//! Shutdown disconnects a second channel that every worker selects on, so
//! idle workers wake immediately and pending items are abandoned.

use super::command::Command;
use super::executor::ActionExecutor;
use super::stats::{Counter, StatsAggregator};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Bounded FIFO buffer of commands awaiting a fallback attempt.
///
/// # Example
///
/// ```rust
/// use keyrelay::{Command, OverflowQueue};
///
/// let queue = OverflowQueue::new(1);
/// assert!(queue.enqueue(Command::Primary));
/// assert!(!queue.enqueue(Command::Secondary)); // full, returns immediately
/// assert_eq!(queue.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct OverflowQueue {
    tx: Sender<Command>,
    rx: Receiver<Command>,
    capacity: usize,
}

impl OverflowQueue {
    /// Creates a queue holding at most `capacity` commands.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = channel::bounded(capacity);
        Self { tx, rx, capacity }
    }

    /// Appends `cmd` without blocking. Returns `false` if the queue is full.
    #[inline]
    pub fn enqueue(&self, cmd: Command) -> bool {
        match self.tx.try_send(cmd) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            // The queue holds its own receiver, so this cannot happen while it lives.
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Number of queued commands.
    #[inline]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns `true` when nothing is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Fixed capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Consumer end, handed to worker threads.
    pub(crate) fn receiver(&self) -> Receiver<Command> {
        self.rx.clone()
    }
}

/// Fixed-size set of threads draining an [`OverflowQueue`].
///
/// Workers run until [`WorkerPool::shutdown`] is called or the pool is
/// dropped. Completion is recorded in the stats aggregator only; the caller
/// that enqueued the command is never told how the retry went.
#[derive(Debug)]
pub struct WorkerPool {
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    busy: Arc<AtomicUsize>,
    size: usize,
}

impl WorkerPool {
    /// Spawns `size` workers named `keypress-<n>` consuming from `queue`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if a thread cannot be spawned. Workers started
    /// before the failure are shut down.
    pub fn start(
        size: usize,
        queue: &OverflowQueue,
        executor: Arc<dyn ActionExecutor>,
        stats: Arc<StatsAggregator>,
    ) -> io::Result<Self> {
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        let pool = Self {
            handles: Mutex::new(Vec::with_capacity(size)),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            busy: Arc::new(AtomicUsize::new(0)),
            size,
        };

        for id in 0..size {
            let worker = Worker {
                id,
                jobs: queue.receiver(),
                shutdown: shutdown_rx.clone(),
                executor: executor.clone(),
                stats: stats.clone(),
                busy: pool.busy.clone(),
            };

            let spawned = thread::Builder::new()
                .name(format!("keypress-{}", id))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => pool.handles.lock().push(handle),
                Err(err) => {
                    pool.shutdown();
                    return Err(err);
                }
            }
        }

        info!("Started {} fallback workers", size);
        Ok(pool)
    }

    /// Number of worker threads.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of workers currently executing a command.
    #[inline]
    pub fn active(&self) -> usize {
        self.busy.load(Ordering::Acquire)
    }

    /// Signals every worker to stop and joins them.
    ///
    /// Idle workers exit immediately; a worker mid-execution finishes that
    /// one command first, which the executor bounds. Queued commands are
    /// abandoned. Calling this more than once is a no-op.
    pub fn shutdown(&self) {
        // Dropping the only sender disconnects the shutdown channel.
        if self.shutdown_tx.lock().take().is_none() {
            return;
        }

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("Fallback worker panicked before shutdown");
            }
        }
        info!("Fallback workers stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    id: usize,
    jobs: Receiver<Command>,
    shutdown: Receiver<()>,
    executor: Arc<dyn ActionExecutor>,
    stats: Arc<StatsAggregator>,
    busy: Arc<AtomicUsize>,
}

impl Worker {
    fn run(self) {
        debug!("Worker {} waiting for commands", self.id);

        loop {
            channel::select! {
                recv(self.shutdown) -> _ => break,
                recv(self.jobs) -> job => match job {
                    Ok(cmd) => self.process(cmd),
                    Err(_) => break,
                },
            }
        }

        debug!("Worker {} exiting", self.id);
    }

    fn process(&self, cmd: Command) {
        self.busy.fetch_add(1, Ordering::AcqRel);
        let result = self.executor.execute(cmd);
        self.busy.fetch_sub(1, Ordering::AcqRel);

        match result {
            Ok(()) => {
                let total = self.stats.increment(Counter::SuccessfulActions);
                info!("{}! via worker {} (total: {})", cmd.as_str().to_uppercase(), self.id, total);
            }
            Err(err) => {
                self.stats.increment(Counter::Errors);
                warn!(error = %err, label = err.as_label(), "Queued {} failed on worker {}", cmd, self.id);
            }
        }
    }
}
