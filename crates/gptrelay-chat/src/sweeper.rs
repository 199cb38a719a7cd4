//! Expiry sweeper: periodic eviction of sessions past their deadline.
//!
//! Runs for the life of the process alongside message handling. Each tick
//! calls [`SessionStore::remove_expired`] once.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info};

use crate::store::SessionStore;

/// Default interval: 10 seconds.
pub const DEFAULT_SWEEP_INTERVAL_S: u64 = 10;

/// Shortest allowed interval.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub struct ExpirySweeper {
    store: Arc<SessionStore>,
    interval: Duration,
    shutdown: Notify,
}

impl ExpirySweeper {
    /// Create a sweeper; `interval` defaults to [`DEFAULT_SWEEP_INTERVAL_S`]
    /// and is never shorter than [`MIN_SWEEP_INTERVAL`].
    pub fn new(store: Arc<SessionStore>, interval: Option<Duration>) -> Self {
        Self {
            store,
            interval: interval
                .unwrap_or(Duration::from_secs(DEFAULT_SWEEP_INTERVAL_S))
                .max(MIN_SWEEP_INTERVAL),
            shutdown: Notify::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run the sweep loop. Returns when `stop()` is called.
    ///
    /// The first sweep happens one interval after start.
    pub async fn start(&self) {
        info!(interval_s = self.interval.as_secs(), "expiry sweeper started");

        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }
                _ = self.shutdown.notified() => {
                    info!("expiry sweeper shutting down");
                    return;
                }
            }
        }
    }

    /// Stop the sweep loop.
    ///
    /// A stop issued before `start()` is remembered, so `start()` then
    /// returns immediately.
    pub fn stop(&self) {
        info!("stopping expiry sweeper");
        self.shutdown.notify_one();
    }

    /// Run one sweep now. Returns how many sessions were evicted.
    pub fn tick(&self) -> usize {
        let removed = self.store.remove_expired();
        if removed > 0 {
            info!(removed, remaining = self.store.len(), "evicted expired sessions");
        } else {
            debug!("sweep: nothing expired");
        }
        removed
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
