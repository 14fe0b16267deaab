//! # Triage Queue
//!
//! Priority queue and intake scheduler for legal-assistance cases. Cases are
//! triaged by urgency, held in a priority-ordered line backed by durable
//! storage, given wait-time estimates, and handed off to responders.
//!
//! ## Features
//!
//! - **Strict ordering**: highest priority first, first-in-first-out within a level
//! - **Indexed heap**: O(log n) insert, assignment and reprioritization
//! - **Durable storage**: SQLite (file or in-memory) and PostgreSQL backends
//! - **At-most-once assignment**: guarded in storage, safe across instances
//! - **Wait-time estimates**: pluggable table with time-of-day and weekend factors
//! - **Analytics**: priority and situation breakdowns, bottlenecks, snapshot history
//!
//! ## Architecture
//!
//! - [`case`]: case records and priority levels
//! - [`queue`]: the in-memory index, the scheduler and wait-time policy
//! - [`database`]: the storage trait and its two backends
//! - [`monitoring`]: analytics, periodic snapshots and queue events
//! - [`engine`]: a facade assembling all of the above from one config
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use triage_queue::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let engine = TriageEngine::new(QueueEngineConfig::in_memory()).await?;
//!     let queue = engine.scheduler();
//!
//!     queue.add_case(NewCase::new("case-1", "URGENT", "user-7", "police")).await?;
//!     queue.add_case(NewCase::new("case-2", "HIGH", "user-9", "eviction")).await?;
//!
//!     if let Some(next) = queue.get_next_case().await? {
//!         queue.assign_case(&next.case_id, "lawyer-1").await?;
//!     }
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod case;
pub mod clock;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod logging;
pub mod monitoring;
pub mod queue;

pub use case::{CaseRecord, NewCase, Priority, PriorityCounts};
pub use config::QueueEngineConfig;
pub use engine::TriageEngine;
pub use error::{QueueError, Result};
pub use queue::QueueScheduler;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::case::{CaseRecord, NewCase, Priority, PriorityCounts};
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::{
        CacheConfig, DatabaseConfig, QueueEngineConfig, SnapshotConfig, StorageBackend,
    };
    pub use crate::database::{
        CaseStore, PostgresCaseStore, QueueSnapshot, ResponderPerformance, SqliteCaseStore,
        StoreStats,
    };
    pub use crate::engine::TriageEngine;
    pub use crate::error::{QueueError, Result};
    pub use crate::logging::{setup_logging, LoggingConfig};
    pub use crate::monitoring::{AnalyticsEngine, QueueAnalytics, QueueEvent, SnapshotScheduler};
    pub use crate::queue::{LongestWaiting, QueueScheduler, QueueStatus, WaitTimePolicy};
}
