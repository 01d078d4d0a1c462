//! Background rebalancer for the slot engine.
//!
//! A spawned task periodically calls [`SlotHash::rebalance`] on a shared
//! table, skipping ticks that land inside a configured forbidden window
//! (expressed as offsets from UTC midnight). Stopping is a watch-channel
//! signal: idempotent, never blocking, and honored at the next tick
//! boundary — an in-progress pass always finishes.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use keel_types::Node;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::slot::SlotHash;

const SECONDS_PER_DAY: u64 = 86_400;

/// A `[start, end)` time-of-day range during which rebalancing must not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Offset from UTC midnight at which the window opens.
    pub start: Duration,
    /// Offset from UTC midnight at which the window closes (exclusive).
    pub end: Duration,
}

impl TimeWindow {
    /// Whether a time-of-day offset falls inside the window.
    pub fn contains(&self, time_of_day: Duration) -> bool {
        self.start <= time_of_day && time_of_day < self.end
    }
}

/// Rebalancer task parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceConfig {
    /// Delay between rebalance passes.
    pub interval: Duration,
    /// Maximum slot moves per pass.
    pub batch_size: usize,
    /// Time-of-day ranges during which passes are skipped.
    pub forbidden_windows: Vec<TimeWindow>,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            batch_size: 5,
            forbidden_windows: Vec::new(),
        }
    }
}

/// Handle to a running rebalancer task.
pub struct RebalancerHandle {
    stop_tx: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl RebalancerHandle {
    /// Signal the task to stop at its next tick boundary.
    ///
    /// Safe to call any number of times, including after the task has
    /// already exited.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Whether the background task is still running.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Spawn the rebalancer over a shared slot table.
///
/// The caller keeps dispatching and mutating through the same
/// `Arc<RwLock<…>>`; each pass takes the write lock only for the duration
/// of one bounded batch.
pub fn spawn<N>(table: Arc<RwLock<SlotHash<N>>>, config: RebalanceConfig) -> RebalancerHandle
where
    N: Node + Send + Sync + 'static,
{
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        let mut tick = interval_at(Instant::now() + config.interval, config.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_ms = config.interval.as_millis() as u64,
            batch = config.batch_size,
            "slot rebalancer started"
        );
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let now = time_of_day();
                    if config.forbidden_windows.iter().any(|w| w.contains(now)) {
                        debug!("rebalance tick skipped inside forbidden window");
                        continue;
                    }
                    let moved = table.write().await.rebalance(config.batch_size);
                    if moved > 0 {
                        debug!(moved, "rebalance pass moved slots");
                    }
                }
                _ = stop_rx.changed() => {
                    info!("slot rebalancer stopped");
                    return;
                }
            }
        }
    });
    RebalancerHandle { stop_tx, task }
}

/// Offset from the most recent UTC midnight.
fn time_of_day() -> Duration {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    Duration::from_secs(since_epoch.as_secs() % SECONDS_PER_DAY)
}
