//! Periodic write-back of dirty users
//!
//! The scheduler wakes once per interval and hands a flush pass to the
//! blocking pool, since store writes are synchronous. It stops when the
//! shutdown channel flips to `true` or its sender is dropped; a pass that
//! is already running always finishes first.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::cache::{FlushReport, UserCache};

/// Flush interval used when none is configured
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

pub struct FlushScheduler {
    cache: Arc<UserCache>,
    interval: Duration,
}

impl FlushScheduler {
    pub fn new(cache: Arc<UserCache>, interval: Duration) -> Self {
        Self { cache, interval }
    }

    /// Run the loop on the current tokio runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval = ?self.interval, "Autosave scheduler started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }

        info!("Autosave scheduler stopped");
    }

    async fn sweep(&self) {
        let cache = Arc::clone(&self.cache);
        match tokio::task::spawn_blocking(move || cache.flush_dirty()).await {
            Ok(report) => log_report(&report),
            Err(e) => error!(error = %e, "Autosave pass panicked"),
        }
    }
}

fn log_report(report: &FlushReport) {
    if report.failed > 0 {
        warn!(
            saved = report.saved,
            failed = report.failed,
            "Autosave finished with failures"
        );
    } else if report.saved > 0 {
        info!(saved = report.saved, "Saved unsaved users");
    } else {
        debug!("Autosave found nothing to save");
    }
}
