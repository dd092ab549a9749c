//! Cancellable display clock.
//!
//! The clock only broadcasts tick counts; it performs no I/O and triggers no
//! recomputation itself. Consumers subscribe and re-derive projections from
//! the snapshot on every tick, so a missed or delayed tick can never cause
//! drift.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Periodic wall-clock ticker with explicit start/stop/reset.
///
/// Ticks are published as a monotonically increasing counter on a watch
/// channel. Stopping aborts the ticking task; dropping the clock stops it.
pub struct GameClock {
    period: Duration,
    ticks: watch::Sender<u64>,
    task: Option<JoinHandle<()>>,
}

impl GameClock {
    /// Display clocks default to one tick per second.
    pub const DISPLAY_PERIOD: Duration = Duration::from_secs(1);

    /// Create a stopped clock with the given period.
    pub fn new(period: Duration) -> Self {
        let (ticks, _) = watch::channel(0);
        Self {
            period,
            ticks,
            task: None,
        }
    }

    /// Start ticking. No-op if already running.
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        let tx = self.ticks.clone();
        let period = self.period;
        self.task = Some(tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            loop {
                let _ = interval.tick().await;
                tx.send_modify(|n| *n += 1);
            }
        }));
        debug!(period_ms = self.period.as_millis() as u64, "clock started");
    }

    /// Stop ticking. The counter keeps its value; no further ticks arrive.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("clock stopped");
        }
    }

    /// Restart the cadence from now.
    pub fn reset(&mut self) {
        self.stop();
        self.start();
    }

    /// Whether the clock is currently ticking.
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Subscribe to tick counts. `changed().await` wakes on every tick.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.ticks.subscribe()
    }
}

impl Drop for GameClock {
    fn drop(&mut self) {
        self.stop();
    }
}
