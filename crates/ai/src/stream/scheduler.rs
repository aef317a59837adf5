//! Global batch scheduler.
//!
//! One background task ticks on a fixed interval and processes a batch for
//! every active stream. Starting and stopping it affects all streams at once.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::processor::StreamAnalytics;

/// Handle to a running batch loop.
#[derive(Debug)]
pub(crate) struct BatchScheduler {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl BatchScheduler {
    /// Spawn the loop. It holds only a weak reference to the engine and
    /// exits on its own once the engine is dropped.
    pub(crate) fn start(runtime: &Handle, engine: Weak<StreamAnalytics>, period: Duration) -> Self {
        let shutdown = Arc::new(Notify::new());
        let signal = Arc::clone(&shutdown);

        let task = runtime.spawn(async move {
            tracing::info!(interval_ms = period.as_millis() as u64, "batch processing started");

            // First batch one full period after start.
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = signal.notified() => {
                        tracing::info!("batch processing stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(engine) = engine.upgrade() else {
                            tracing::debug!("stream analytics dropped, batch loop exiting");
                            break;
                        };
                        let results = engine.process_all_batches();
                        tracing::debug!(batches = results.len(), "batch tick processed");
                    }
                }
            }
        });

        Self { shutdown, task }
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Ask the loop to exit after the tick in progress, if any.
    pub(crate) fn stop(self) {
        // Stores a permit when the loop is mid-tick.
        self.shutdown.notify_one();
    }
}
