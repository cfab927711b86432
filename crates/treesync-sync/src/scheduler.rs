//! Sync scheduler - repeats engine cycles at a fixed interval
//!
//! The [`SyncScheduler`] drives the [`SyncEngine`] until its
//! `CancellationToken` fires. The interval is measured from the start of one
//! cycle to the start of the next, so a slow cycle shortens the following
//! sleep instead of delaying the schedule.
//!
//! ## Flow
//!
//! ```text
//! Idle ──→ Scanning ──→ Diffing ──→ Applying ──→ Sleeping ──┐
//!              ▲                                            │
//!              └────────────────────────────────────────────┘
//!                         (cancel) ──→ Stopped
//! ```
//!
//! A stop request is honoured before each cycle and while sleeping; a cycle
//! that is already running always finishes.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use treesync_core::domain::CycleReport;

use crate::engine::SyncEngine;

/// Lifecycle state of the scheduler loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Scanning,
    Diffing,
    Applying,
    Sleeping,
    /// Terminal; only reached after cancellation
    Stopped,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Scanning => "scanning",
            SchedulerState::Diffing => "diffing",
            SchedulerState::Applying => "applying",
            SchedulerState::Sleeping => "sleeping",
            SchedulerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Runs sync cycles periodically until cancelled
pub struct SyncScheduler {
    engine: SyncEngine,
    interval: Duration,
    shutdown: CancellationToken,
    state_tx: watch::Sender<SchedulerState>,
}

impl SyncScheduler {
    /// Creates a new `SyncScheduler`
    ///
    /// # Arguments
    /// * `engine` - Engine that performs each cycle
    /// * `interval` - Time between the starts of consecutive cycles
    /// * `shutdown` - Token that stops the loop when cancelled
    pub fn new(engine: SyncEngine, interval: Duration, shutdown: CancellationToken) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Idle);

        info!(
            interval_ms = millis(interval),
            source = %engine.source_root().display(),
            dest = %engine.dest_root().display(),
            "Creating sync scheduler"
        );

        Self {
            engine,
            interval,
            shutdown,
            state_tx,
        }
    }

    /// Returns a receiver that observes every state transition
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    /// Current state of the loop
    pub fn state(&self) -> SchedulerState {
        *self.state_tx.borrow()
    }

    fn publish(&self, state: SchedulerState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Scheduler state changed");
        }
    }

    /// Runs a single cycle without sleeping
    pub async fn run_once(&self) -> CycleReport {
        let report = self
            .engine
            .run_cycle_observed(|state| self.publish(state))
            .await;
        self.publish(SchedulerState::Idle);
        report
    }

    /// Main loop: runs cycles until the shutdown token is cancelled
    ///
    /// `on_cycle_complete` receives each cycle's report as soon as the cycle
    /// finishes. Returns the number of completed cycles.
    pub async fn run<F>(&self, mut on_cycle_complete: F) -> u64
    where
        F: FnMut(CycleReport) + Send,
    {
        info!("Sync scheduler starting");
        let mut completed: u64 = 0;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let cycle_start = Instant::now();
            let report = self
                .engine
                .run_cycle_observed(|state| self.publish(state))
                .await;
            completed += 1;
            on_cycle_complete(report);

            // sleep_until returns at once for a deadline in the past, so an
            // overrunning cycle is followed immediately by the next one
            let next_start = cycle_start + self.interval;
            if next_start <= Instant::now() {
                debug!(
                    overrun_ms = millis(Instant::now() - next_start),
                    "Cycle exceeded interval, starting next cycle immediately"
                );
            }

            self.publish(SchedulerState::Sleeping);
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested while sleeping");
                    break;
                }
                _ = tokio::time::sleep_until(next_start) => {}
            }
        }

        self.publish(SchedulerState::Stopped);
        info!(cycles = completed, "Sync scheduler stopped");
        completed
    }
}

// ============================================================================
// Unit tests
// ============================================================================

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
