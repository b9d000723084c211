/// Fixed-interval poll task
///
/// Runs on the tokio runtime, fetches the latest log entries each tick and
/// overwrites the shared reading slot the UI thread takes from. A tick
/// never overlaps the previous one: the fetch is awaited before the next
/// tick is taken, and ticks missed while a slow request was outstanding
/// are skipped.

use crate::gateway::{ControlApi, GatewayError, Reading};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Called after a reading has been stored so the UI wakes up to draw it.
pub type RepaintFn = Arc<dyn Fn() + Send + Sync>;

/// Most recent reading not yet shown. A newer reading replaces an
/// unconsumed one, so a stalled UI never builds a backlog.
pub type ReadingSlot = Arc<Mutex<Option<Reading>>>;

/// Take the pending reading, if any, leaving the slot empty.
pub fn take_reading_from_slot(slot: &ReadingSlot) -> Option<Reading> {
    slot.lock().ok().and_then(|mut pending| pending.take())
}

#[derive(Debug)]
pub enum TickOutcome {
    Updated(Reading),
    Empty,
    Failed(GatewayError),
}

/// One poll tick: fetch and pick element 0.
pub async fn poll_once(api: &dyn ControlApi) -> TickOutcome {
    match api.fetch_latest().await.and_then(|entries| Reading::latest(&entries)) {
        Ok(Some(reading)) => TickOutcome::Updated(reading),
        Ok(None) => TickOutcome::Empty,
        Err(e) => TickOutcome::Failed(e),
    }
}

#[derive(Debug, Default)]
pub struct PollStats {
    ticks: AtomicU64,
    updates: AtomicU64,
    failures: AtomicU64,
}

impl PollStats {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Handle to a running poll task. Dropping it stops the task.
pub struct Poller {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
    stats: Arc<PollStats>,
}

impl Poller {
    pub fn start(
        runtime: &Handle,
        api: Arc<dyn ControlApi>,
        interval: Duration,
        slot: Weak<Mutex<Option<Reading>>>,
        repaint: RepaintFn,
    ) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let stats = Arc::new(PollStats::default());
        let task_stats = Arc::clone(&stats);

        let handle = runtime.spawn(async move {
            info!(target: "poller", "Poll task started ({}ms interval)", interval.as_millis());
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {}
                }
                task_stats.ticks.fetch_add(1, Ordering::Relaxed);

                let outcome = tokio::select! {
                    _ = stop_rx.changed() => break,
                    outcome = poll_once(api.as_ref()) => outcome,
                };

                match outcome {
                    TickOutcome::Updated(reading) => {
                        task_stats.updates.fetch_add(1, Ordering::Relaxed);
                        debug!(target: "poller", "Latest value {:.2} (tag {:?})", reading.value, reading.tag);
                        let Some(slot) = slot.upgrade() else {
                            debug!(target: "poller", "Dashboard gone, stopping poll task");
                            break;
                        };
                        if let Ok(mut pending) = slot.lock() {
                            *pending = Some(reading);
                        }
                        repaint();
                    }
                    TickOutcome::Empty => {
                        debug!(target: "poller", "Log list empty, nothing to display");
                    }
                    TickOutcome::Failed(e) => {
                        task_stats.failures.fetch_add(1, Ordering::Relaxed);
                        warn!(target: "poller", "Update failed: {}", e);
                    }
                }
            }
            info!(target: "poller", "Poll task stopped");
        });

        Self { stop_tx, handle, stats }
    }

    /// Signal the task to stop. An in-flight request is abandoned.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stats(&self) -> Arc<PollStats> {
        Arc::clone(&self.stats)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}
