//! Background snapshot timer
//!
//! [`SnapshotScheduler`] asks the case store to record a queue snapshot on a
//! fixed interval. Start and stop are explicit and idempotent; stopping
//! cancels the timer task, including a snapshot still in flight, and waits
//! for it to exit. Each snapshot is bounded by the query timeout.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::database::{self, CaseStore, QueueSnapshot};
use crate::error::Result;

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct SnapshotScheduler {
    store: Arc<dyn CaseStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    query_timeout: Duration,
    running: Mutex<Option<Running>>,
}

impl SnapshotScheduler {
    pub fn new(
        store: Arc<dyn CaseStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        query_timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            interval,
            query_timeout,
            running: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Record one snapshot now
    pub async fn run_once(&self) -> Result<QueueSnapshot> {
        database::with_timeout(
            self.query_timeout,
            "record snapshot",
            self.store.record_snapshot(self.clock.now()),
        )
        .await
    }

    /// Start the timer. Returns false if it was already running.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            debug!("Snapshot scheduler already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let store = self.store.clone();
        let clock = self.clock.clone();
        let period = self.interval;
        let query_timeout = self.query_timeout;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let snapshot = database::with_timeout(
                            query_timeout,
                            "record snapshot",
                            store.record_snapshot(clock.now()),
                        );
                        tokio::select! {
                            _ = token.cancelled() => break,
                            result = snapshot => match result {
                                Ok(snapshot) => debug!(
                                    "📸 Recorded queue snapshot {} ({} active)",
                                    snapshot.id, snapshot.active_cases
                                ),
                                Err(e) => warn!("⚠️ Queue snapshot failed: {}", e),
                            },
                        }
                    }
                }
            }
            debug!("Snapshot timer exited");
        });

        *running = Some(Running { cancel, handle });
        info!("⏰ Snapshot scheduler started (every {:?})", period);
        true
    }

    /// Stop the timer and wait for the task to finish. Returns false if it was
    /// not running.
    pub async fn stop(&self) -> bool {
        let taken = self.running.lock().take();
        let Some(running) = taken else {
            return false;
        };

        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            if !e.is_cancelled() {
                warn!("Snapshot timer ended abnormally: {}", e);
            }
        }
        info!("🛑 Snapshot scheduler stopped");
        true
    }
}

impl Drop for SnapshotScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
            running.handle.abort();
        }
    }
}
