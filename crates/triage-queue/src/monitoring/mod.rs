//! Queue monitoring: analytics, periodic snapshots and state events

pub mod analytics;
pub mod events;
pub mod snapshot;

pub use analytics::{AnalyticsEngine, Bottleneck, LiveBreakdown, QueueAnalytics, WaitSummary};
pub use events::QueueEvent;
pub use snapshot::SnapshotScheduler;
