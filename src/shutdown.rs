//! Final flush on the way out of the process
//!
//! `main` creates a [`FlushGuard`] as soon as the cache exists and keeps it
//! until the very end. Finishing it explicitly, returning early with an
//! error, or unwinding from a panic all run the same bounded flush, so the
//! updates made since the last autosave reach the store.
//!
//! [`ShutdownSignal`] turns SIGINT and SIGTERM into a normal return from the
//! event loop, so the guard gets to run instead of the process being killed.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError};
use tracing::{error, info};

use crate::cache::{FlushReport, UserCache};

/// How long the final flush may block exit when none is configured
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of the final flush
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Completed(FlushReport),
    /// The flush was still running when the timeout elapsed. It keeps going
    /// on its own thread but exit is no longer held up.
    TimedOut,
    Failed(String),
    /// An earlier call already ran the final flush.
    AlreadyFlushed,
}

/// Scoped guarantee that dirty users are flushed before exit.
pub struct FlushGuard {
    cache: Option<Arc<UserCache>>,
    timeout: Duration,
}

impl FlushGuard {
    pub fn new(cache: Arc<UserCache>, timeout: Duration) -> Self {
        Self {
            cache: Some(cache),
            timeout,
        }
    }

    /// Run the final flush now. Later calls, and the drop, do nothing.
    pub fn flush(&mut self) -> ShutdownOutcome {
        let Some(cache) = self.cache.take() else {
            return ShutdownOutcome::AlreadyFlushed;
        };

        let started = Instant::now();
        let dirty = cache.dirty_count();
        info!(dirty, "Saving all users before exit");

        let (tx, rx) = channel::bounded(1);
        let spawned = thread::Builder::new()
            .name("final-flush".to_string())
            .spawn(move || {
                let report = cache.flush_dirty();
                let _ = tx.send(report);
            });

        let outcome = match spawned {
            Ok(_) => match rx.recv_timeout(self.timeout) {
                Ok(report) => ShutdownOutcome::Completed(report),
                Err(RecvTimeoutError::Timeout) => ShutdownOutcome::TimedOut,
                Err(RecvTimeoutError::Disconnected) => {
                    ShutdownOutcome::Failed("flush thread panicked".to_string())
                }
            },
            Err(e) => ShutdownOutcome::Failed(format!("could not start flush thread: {e}")),
        };

        match &outcome {
            ShutdownOutcome::Completed(report) if report.failed == 0 => {
                info!(saved = report.saved, elapsed = ?started.elapsed(), "All users saved");
            }
            ShutdownOutcome::Completed(report) => {
                error!(
                    saved = report.saved,
                    failed = report.failed,
                    "Some users could not be saved before exit"
                );
            }
            ShutdownOutcome::TimedOut => {
                error!(timeout = ?self.timeout, "Final flush timed out, exiting anyway");
            }
            ShutdownOutcome::Failed(reason) => {
                error!(%reason, "Final flush failed");
            }
            ShutdownOutcome::AlreadyFlushed => {}
        }

        outcome
    }

    /// Flush and release the guard.
    pub fn finish(mut self) -> ShutdownOutcome {
        self.flush()
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        if self.cache.is_some() {
            self.flush();
        }
    }
}

/// Listens for the signals that should end the process gracefully.
///
/// Handlers are registered in [`ShutdownSignal::new`], so a signal that
/// arrives while the caller is busy elsewhere is delivered by the next
/// [`ShutdownSignal::recv`].
pub struct ShutdownSignal {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(windows)]
    ctrl_c: tokio::signal::windows::CtrlC,
}

impl ShutdownSignal {
    /// Must be called from within a tokio runtime.
    #[cfg(unix)]
    pub fn new() -> io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(windows)]
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    /// Wait for the next signal and return its name.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }

    #[cfg(windows)]
    pub async fn recv(&mut self) -> &'static str {
        self.ctrl_c.recv().await;
        "Ctrl-C"
    }
}
