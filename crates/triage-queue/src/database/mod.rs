//! Durable case storage
//!
//! [`CaseStore`] is the persistence seam of the queue. Two backends implement
//! it: [`SqliteCaseStore`] (embedded, single file or in-memory) and
//! [`PostgresCaseStore`] (client-server). [`connect`] picks one from
//! [`DatabaseConfig`] once, at construction.
//!
//! Timestamps cross the storage boundary as epoch milliseconds and case
//! metadata as a JSON text blob.

pub mod postgres;
pub mod schema;
pub mod sqlite;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::case::{CaseRecord, Priority, PriorityCounts};
use crate::config::{DatabaseConfig, StorageBackend};
use crate::error::{QueueError, Result};

pub use postgres::PostgresCaseStore;
pub use sqlite::SqliteCaseStore;

/// Storage operations the scheduler and analytics rely on
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;

    /// Insert a new active case. Fails with `DuplicateCase` when the id exists.
    async fn add_case(&self, case: &CaseRecord) -> Result<()>;

    /// Change the priority of an active case. `ranked_at` is applied only when
    /// the stored level actually changes. Returns the record as stored after
    /// the update, or `None` when no active case matches.
    async fn update_case_priority(
        &self,
        case_id: &str,
        priority: Priority,
        ranked_at: DateTime<Utc>,
    ) -> Result<Option<CaseRecord>>;

    /// Atomically assign an active case and record the history entry.
    /// Returns false when the case is unknown or no longer active.
    async fn assign_case(&self, case_id: &str, responder_id: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Resolve the open assignment of a case. Returns false when there is none.
    async fn complete_assignment(&self, case_id: &str, at: DateTime<Utc>) -> Result<bool>;

    async fn get_case(&self, case_id: &str) -> Result<Option<CaseRecord>>;

    /// Active cases in dequeue order
    async fn get_active_cases(&self) -> Result<Vec<CaseRecord>>;

    /// Compute and append one snapshot in a single statement
    async fn record_snapshot(&self, at: DateTime<Utc>) -> Result<QueueSnapshot>;

    /// Most recent snapshots first
    async fn get_snapshot_history(&self, limit: u32) -> Result<Vec<QueueSnapshot>>;

    async fn get_responder_performance(&self, responder_id: Option<&str>) -> Result<Vec<ResponderPerformance>>;

    /// Current aggregate state computed in storage
    async fn get_queue_stats(&self, at: DateTime<Utc>) -> Result<StoreStats>;

    async fn health_check(&self) -> Result<bool>;
}

/// Point-in-time queue summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub id: i64,
    pub taken_at: DateTime<Utc>,
    pub total_cases: u64,
    pub active_cases: u64,
    pub resolved_cases: u64,
    pub active_by_priority: PriorityCounts,
    /// `None` when no case was waiting
    pub avg_wait_minutes: Option<f64>,
    /// `None` when no assignment had been resolved
    pub avg_resolution_minutes: Option<f64>,
}

/// Aggregate assignment figures for one responder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponderPerformance {
    pub responder_id: String,
    pub total_cases: u64,
    pub resolved_cases: u64,
    pub avg_resolution_minutes: Option<f64>,
}

/// Live aggregates computed by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_cases: u64,
    pub active_cases: u64,
    pub active_by_priority: PriorityCounts,
    pub avg_wait_minutes: Option<f64>,
}

/// Open the configured backend and make sure its schema exists
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn CaseStore>> {
    let store: Arc<dyn CaseStore> = match &config.backend {
        StorageBackend::Sqlite { path } => Arc::new(SqliteCaseStore::connect(path, config).await?),
        StorageBackend::Postgres { url } => Arc::new(PostgresCaseStore::connect(url, config).await?),
    };
    info!("🗄️ Case store ready ({})", store.backend_name());
    Ok(store)
}

/// Bound a storage call by `limit`. An elapsed limit is `StorageUnavailable`
/// and drops the in-flight call.
pub async fn with_timeout<T>(
    limit: Duration,
    operation: &str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            warn!("❌ Storage call '{}' failed: {}", operation, e);
            Err(e)
        }
        Err(_) => {
            warn!("⏱️ Storage call '{}' timed out after {:?}", operation, limit);
            Err(QueueError::unavailable(format!("{operation} timed out after {limit:?}")))
        }
    }
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| QueueError::storage(format!("timestamp out of range: {ms}")))
}

fn to_count(value: i64) -> u64 {
    value.max(0) as u64
}

/// `cases` row as both backends return it
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CaseRow {
    pub case_id: String,
    pub priority: String,
    pub enqueued_at: i64,
    pub ranked_at: i64,
    pub requester_id: String,
    pub situation_type: String,
    pub metadata: String,
    pub assigned_responder_id: Option<String>,
    pub active: bool,
}

impl TryFrom<CaseRow> for CaseRecord {
    type Error = QueueError;

    fn try_from(row: CaseRow) -> Result<Self> {
        let priority = row.priority.parse::<Priority>().map_err(|_| {
            QueueError::storage(format!("case {} has malformed priority {:?}", row.case_id, row.priority))
        })?;
        let metadata = serde_json::from_str(&row.metadata).map_err(|e| {
            QueueError::storage(format!("case {} has malformed metadata: {}", row.case_id, e))
        })?;

        Ok(CaseRecord {
            priority,
            enqueued_at: from_millis(row.enqueued_at)?,
            ranked_at: from_millis(row.ranked_at)?,
            metadata,
            case_id: row.case_id,
            requester_id: row.requester_id,
            situation_type: row.situation_type,
            assigned_responder_id: row.assigned_responder_id,
            active: row.active,
        })
    }
}

pub(crate) fn encode_metadata(case: &CaseRecord) -> Result<String> {
    serde_json::to_string(&case.metadata)
        .map_err(|e| QueueError::invalid_input(format!("metadata is not serializable: {e}")))
}

/// `queue_snapshots` row
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SnapshotRow {
    pub id: i64,
    pub taken_at: i64,
    pub total_cases: i64,
    pub active_cases: i64,
    pub resolved_cases: i64,
    pub urgent_count: i64,
    pub high_count: i64,
    pub medium_count: i64,
    pub low_count: i64,
    pub avg_wait_minutes: Option<f64>,
    pub avg_resolution_minutes: Option<f64>,
}

impl TryFrom<SnapshotRow> for QueueSnapshot {
    type Error = QueueError;

    fn try_from(row: SnapshotRow) -> Result<Self> {
        Ok(QueueSnapshot {
            id: row.id,
            taken_at: from_millis(row.taken_at)?,
            total_cases: to_count(row.total_cases),
            active_cases: to_count(row.active_cases),
            resolved_cases: to_count(row.resolved_cases),
            active_by_priority: PriorityCounts {
                urgent: to_count(row.urgent_count),
                high: to_count(row.high_count),
                medium: to_count(row.medium_count),
                low: to_count(row.low_count),
            },
            avg_wait_minutes: row.avg_wait_minutes,
            avg_resolution_minutes: row.avg_resolution_minutes,
        })
    }
}

/// Per-responder aggregate row
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PerformanceRow {
    pub responder_id: String,
    pub total_cases: i64,
    pub resolved_cases: i64,
    pub avg_resolution_minutes: Option<f64>,
}

impl From<PerformanceRow> for ResponderPerformance {
    fn from(row: PerformanceRow) -> Self {
        ResponderPerformance {
            responder_id: row.responder_id,
            total_cases: to_count(row.total_cases),
            resolved_cases: to_count(row.resolved_cases),
            avg_resolution_minutes: row.avg_resolution_minutes,
        }
    }
}

/// Live aggregate row
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct StatsRow {
    pub total_cases: i64,
    pub active_cases: i64,
    pub urgent_count: i64,
    pub high_count: i64,
    pub medium_count: i64,
    pub low_count: i64,
    pub avg_wait_minutes: Option<f64>,
}

impl From<StatsRow> for StoreStats {
    fn from(row: StatsRow) -> Self {
        StoreStats {
            total_cases: to_count(row.total_cases),
            active_cases: to_count(row.active_cases),
            active_by_priority: PriorityCounts {
                urgent: to_count(row.urgent_count),
                high: to_count(row.high_count),
                medium: to_count(row.medium_count),
                low: to_count(row.low_count),
            },
            avg_wait_minutes: row.avg_wait_minutes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(priority: &str, metadata: &str) -> CaseRow {
        CaseRow {
            case_id: "case-1".to_string(),
            priority: priority.to_string(),
            enqueued_at: 1_700_000_000_000,
            ranked_at: 1_700_000_000_000,
            requester_id: "requester".to_string(),
            situation_type: "eviction".to_string(),
            metadata: metadata.to_string(),
            assigned_responder_id: None,
            active: true,
        }
    }

    #[test]
    fn test_case_row_conversion() {
        let case = CaseRecord::try_from(row("HIGH", r#"{"lang":"es"}"#)).unwrap();
        assert_eq!(case.priority, Priority::High);
        assert_eq!(case.metadata["lang"], "es");
        assert_eq!(to_millis(case.enqueued_at), 1_700_000_000_000);
    }

    #[test]
    fn test_malformed_rows_are_storage_errors() {
        assert!(matches!(
            CaseRecord::try_from(row("SOON", "null")),
            Err(QueueError::Storage(_))
        ));
        assert!(matches!(
            CaseRecord::try_from(row("LOW", "{not json")),
            Err(QueueError::Storage(_))
        ));
    }
}
