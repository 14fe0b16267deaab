//! Engine facade wiring store, scheduler, analytics and snapshots together

use std::sync::Arc;

use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::QueueEngineConfig;
use crate::database::{self, CaseStore, StoreStats};
use crate::error::{QueueError, Result};
use crate::monitoring::{AnalyticsEngine, SnapshotScheduler};
use crate::queue::QueueScheduler;

/// A fully assembled triage queue
///
/// Construct one at process start, hand out references to the
/// [`QueueScheduler`], and call [`TriageEngine::shutdown`] before exit.
pub struct TriageEngine {
    config: QueueEngineConfig,
    scheduler: Arc<QueueScheduler>,
    analytics: AnalyticsEngine,
    snapshots: SnapshotScheduler,
}

impl TriageEngine {
    /// Connect the configured backend and start the engine on the system clock
    pub async fn new(config: QueueEngineConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn with_clock(config: QueueEngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let store = database::connect(&config.database).await?;
        Self::with_store(config, store, clock).await
    }

    /// Build on an existing store, e.g. one shared with other engines
    pub async fn with_store(
        config: QueueEngineConfig,
        store: Arc<dyn CaseStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let scheduler = Arc::new(QueueScheduler::with_clock(store.clone(), &config, clock.clone()).await?);
        let analytics = AnalyticsEngine::new(scheduler.clone(), config.snapshots.history_limit);
        let snapshots = SnapshotScheduler::new(
            store,
            clock,
            config.snapshots.interval,
            config.database.query_timeout,
        );

        if config.snapshots.enabled {
            snapshots.start();
        }

        info!("🎯 Triage engine ready");
        Ok(Self {
            config,
            scheduler,
            analytics,
            snapshots,
        })
    }

    pub fn config(&self) -> &QueueEngineConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<QueueScheduler> {
        &self.scheduler
    }

    pub fn analytics(&self) -> &AnalyticsEngine {
        &self.analytics
    }

    pub fn snapshots(&self) -> &SnapshotScheduler {
        &self.snapshots
    }

    /// A store that does not answer within the query timeout is unhealthy
    pub async fn health_check(&self) -> Result<bool> {
        let check = self.scheduler.store().health_check();
        match database::with_timeout(self.scheduler.query_timeout(), "health check", check).await {
            Err(QueueError::StorageUnavailable(_)) => Ok(false),
            other => other,
        }
    }

    /// Aggregates computed directly by the store
    pub async fn queue_stats(&self) -> Result<StoreStats> {
        let now = self.scheduler.clock().now();
        database::with_timeout(
            self.scheduler.query_timeout(),
            "load queue stats",
            self.scheduler.store().get_queue_stats(now),
        )
        .await
    }

    /// Stop background work. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.snapshots.stop().await;
        info!("👋 Triage engine shut down");
    }
}
