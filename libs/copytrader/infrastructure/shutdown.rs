//! Graceful shutdown management

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::time::sleep;
use tracing::{info, warn};

/// Manages graceful shutdown for long-running processes
pub struct ShutdownManager {
    flag: Arc<AtomicBool>,
}

impl ShutdownManager {
    /// Create a new shutdown manager with running state
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Spawn a handler for SIGINT/SIGTERM that triggers shutdown
    pub fn spawn_signal_handler(&self) {
        let flag = Arc::clone(&self.flag);
        tokio::spawn(async move {
            let ctrl_c = signal::ctrl_c();

            #[cfg(unix)]
            {
                let mut sigterm =
                    signal::unix::signal(signal::unix::SignalKind::terminate())
                        .expect("failed to install SIGTERM handler");
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }

            #[cfg(not(unix))]
            {
                let _ = ctrl_c.await;
            }

            info!("");
            info!("Received shutdown signal");
            info!("Shutting down gracefully...");
            flag.store(false, Ordering::Release);
        });
    }

    /// Check if the process should continue running
    pub fn is_running(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Trigger shutdown programmatically
    pub fn trigger(&self) {
        self.flag.store(false, Ordering::Release);
    }

    /// Get a clone of the shutdown flag for passing to async tasks
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Sleep for a duration, but wake early if shutdown is triggered
    pub async fn interruptible_sleep(&self, duration: Duration) {
        let check_interval = Duration::from_millis(50);
        let mut elapsed = Duration::ZERO;

        while elapsed < duration && self.is_running() {
            sleep(check_interval).await;
            elapsed += check_interval;
        }
    }

    /// Wait until `in_flight` reports zero, up to `bound`.
    ///
    /// Returns true if the drain completed; false if the bound elapsed with
    /// work still in flight (caller should exit non-zero with a diagnostic).
    pub async fn drain(&self, in_flight: impl Fn() -> usize, bound: Duration) -> bool {
        let check_interval = Duration::from_millis(100);
        let mut elapsed = Duration::ZERO;

        while elapsed < bound {
            let remaining = in_flight();
            if remaining == 0 {
                return true;
            }
            sleep(check_interval).await;
            elapsed += check_interval;
        }

        warn!("Shutdown drain exceeded {:?} with {} tick(s) in flight", bound, in_flight());
        false
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_stops_running() {
        let mgr = ShutdownManager::new();
        assert!(mgr.is_running());
        mgr.trigger();
        assert!(!mgr.is_running());
    }

    #[tokio::test]
    async fn test_drain_completes_when_idle() {
        let mgr = ShutdownManager::new();
        assert!(mgr.drain(|| 0, Duration::from_millis(200)).await);
    }

    #[tokio::test]
    async fn test_drain_times_out_with_work_in_flight() {
        let mgr = ShutdownManager::new();
        assert!(!mgr.drain(|| 1, Duration::from_millis(200)).await);
    }
}
