//! Embedded SQLite backend

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, error, info};

use super::schema::SQLITE_SCHEMA;
use super::{
    encode_metadata, to_millis, CaseRow, CaseStore, PerformanceRow, QueueSnapshot,
    ResponderPerformance, SnapshotRow, StatsRow, StoreStats,
};
use crate::case::{CaseRecord, Priority};
use crate::config::{DatabaseConfig, SQLITE_IN_MEMORY};
use crate::error::{QueueError, Result};

const CASE_COLUMNS: &str = "case_id, priority, enqueued_at, ranked_at, requester_id, \
     situation_type, metadata, assigned_responder_id, active";

const SNAPSHOT_COLUMNS: &str = "id, taken_at, total_cases, active_cases, resolved_cases, \
     urgent_count, high_count, medium_count, low_count, avg_wait_minutes, avg_resolution_minutes";

/// SQLite-backed case store
#[derive(Clone)]
pub struct SqliteCaseStore {
    pool: SqlitePool,
}

impl SqliteCaseStore {
    /// Open (or create) the database at `path`; `:memory:` gives a private
    /// in-memory database pinned to one connection.
    pub async fn connect(path: &str, config: &DatabaseConfig) -> Result<Self> {
        let pool = if path == SQLITE_IN_MEMORY {
            info!("🗄️ Creating in-memory SQLite case store");
            let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
            // Every new connection would see an empty database
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .acquire_timeout(config.query_timeout)
                .connect_with(options)
                .await?
        } else {
            info!("🗄️ Opening SQLite case store at: {}", path);
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(config.query_timeout);
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(config.query_timeout)
                .connect_with(options)
                .await?
        };

        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    /// Throwaway store for tests and demos
    pub async fn in_memory() -> Result<Self> {
        Self::connect(SQLITE_IN_MEMORY, &DatabaseConfig::sqlite(SQLITE_IN_MEMORY)).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn initialize_schema(&self) -> Result<()> {
        debug!("📋 Creating SQLite case store schema");
        for statement in SQLITE_SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CaseStore for SqliteCaseStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn add_case(&self, case: &CaseRecord) -> Result<()> {
        let metadata = encode_metadata(case)?;
        let result = sqlx::query(
            r#"
            INSERT INTO cases (case_id, priority, enqueued_at, ranked_at, requester_id,
                situation_type, metadata, assigned_responder_id, active)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (case_id) DO NOTHING
            "#,
        )
        .bind(&case.case_id)
        .bind(case.priority.as_str())
        .bind(to_millis(case.enqueued_at))
        .bind(to_millis(case.ranked_at))
        .bind(&case.requester_id)
        .bind(&case.situation_type)
        .bind(metadata)
        .bind(&case.assigned_responder_id)
        .bind(case.active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::duplicate(&case.case_id));
        }
        debug!("Stored case {}", case.case_id);
        Ok(())
    }

    async fn update_case_priority(
        &self,
        case_id: &str,
        priority: Priority,
        ranked_at: DateTime<Utc>,
    ) -> Result<Option<CaseRecord>> {
        let row = sqlx::query_as::<_, CaseRow>(&format!(
            r#"
            UPDATE cases
            SET ranked_at = CASE WHEN priority = ?1 THEN ranked_at ELSE ?2 END,
                priority = ?1
            WHERE case_id = ?3 AND active = 1
            RETURNING {CASE_COLUMNS}
            "#
        ))
        .bind(priority.as_str())
        .bind(to_millis(ranked_at))
        .bind(case_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CaseRecord::try_from).transpose()
    }

    async fn assign_case(&self, case_id: &str, responder_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE cases SET assigned_responder_id = ?, active = 0 WHERE case_id = ? AND active = 1",
        )
        .bind(responder_id)
        .bind(case_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            debug!("Case {} is not active, assignment skipped", case_id);
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO assignment_history (case_id, responder_id, assigned_at, status) \
             VALUES (?, ?, ?, 'assigned')",
        )
        .bind(case_id)
        .bind(responder_id)
        .bind(to_millis(at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn complete_assignment(&self, case_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE assignment_history SET status = 'resolved', resolved_at = ? \
             WHERE case_id = ? AND status = 'assigned'",
        )
        .bind(to_millis(at))
        .bind(case_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_case(&self, case_id: &str) -> Result<Option<CaseRecord>> {
        let row = sqlx::query_as::<_, CaseRow>(&format!(
            "SELECT {CASE_COLUMNS} FROM cases WHERE case_id = ?"
        ))
        .bind(case_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CaseRecord::try_from).transpose()
    }

    async fn get_active_cases(&self) -> Result<Vec<CaseRecord>> {
        let rows = sqlx::query_as::<_, CaseRow>(&format!(
            r#"
            SELECT {CASE_COLUMNS} FROM cases
            WHERE active = 1
            ORDER BY CASE priority
                    WHEN 'URGENT' THEN 4 WHEN 'HIGH' THEN 3 WHEN 'MEDIUM' THEN 2 ELSE 1
                END DESC,
                ranked_at ASC,
                case_id ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CaseRecord::try_from).collect()
    }

    async fn record_snapshot(&self, at: DateTime<Utc>) -> Result<QueueSnapshot> {
        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            r#"
            INSERT INTO queue_snapshots (taken_at, total_cases, active_cases, resolved_cases,
                urgent_count, high_count, medium_count, low_count,
                avg_wait_minutes, avg_resolution_minutes)
            SELECT ?1,
                COUNT(*),
                COALESCE(SUM(active), 0),
                COALESCE(SUM(1 - active), 0),
                COALESCE(SUM(CASE WHEN active = 1 AND priority = 'URGENT' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN active = 1 AND priority = 'HIGH' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN active = 1 AND priority = 'MEDIUM' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN active = 1 AND priority = 'LOW' THEN 1 ELSE 0 END), 0),
                AVG(CASE WHEN active = 1 THEN (?1 - enqueued_at) / 60000.0 END),
                (SELECT AVG((resolved_at - assigned_at) / 60000.0)
                    FROM assignment_history WHERE status = 'resolved')
            FROM cases
            RETURNING {SNAPSHOT_COLUMNS}
            "#
        ))
        .bind(to_millis(at))
        .fetch_one(&self.pool)
        .await?;

        QueueSnapshot::try_from(row)
    }

    async fn get_snapshot_history(&self, limit: u32) -> Result<Vec<QueueSnapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM queue_snapshots ORDER BY taken_at DESC, id DESC LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(QueueSnapshot::try_from).collect()
    }

    async fn get_responder_performance(&self, responder_id: Option<&str>) -> Result<Vec<ResponderPerformance>> {
        let rows = sqlx::query_as::<_, PerformanceRow>(
            r#"
            SELECT responder_id,
                COUNT(*) AS total_cases,
                COALESCE(SUM(CASE WHEN status = 'resolved' THEN 1 ELSE 0 END), 0) AS resolved_cases,
                AVG(CASE WHEN status = 'resolved' THEN (resolved_at - assigned_at) / 60000.0 END)
                    AS avg_resolution_minutes
            FROM assignment_history
            WHERE ?1 IS NULL OR responder_id = ?1
            GROUP BY responder_id
            ORDER BY responder_id
            "#,
        )
        .bind(responder_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ResponderPerformance::from).collect())
    }

    async fn get_queue_stats(&self, at: DateTime<Utc>) -> Result<StoreStats> {
        let row = sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT COUNT(*) AS total_cases,
                COALESCE(SUM(active), 0) AS active_cases,
                COALESCE(SUM(CASE WHEN active = 1 AND priority = 'URGENT' THEN 1 ELSE 0 END), 0) AS urgent_count,
                COALESCE(SUM(CASE WHEN active = 1 AND priority = 'HIGH' THEN 1 ELSE 0 END), 0) AS high_count,
                COALESCE(SUM(CASE WHEN active = 1 AND priority = 'MEDIUM' THEN 1 ELSE 0 END), 0) AS medium_count,
                COALESCE(SUM(CASE WHEN active = 1 AND priority = 'LOW' THEN 1 ELSE 0 END), 0) AS low_count,
                AVG(CASE WHEN active = 1 THEN (?1 - enqueued_at) / 60000.0 END) AS avg_wait_minutes
            FROM cases
            "#,
        )
        .bind(to_millis(at))
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStats::from(row))
    }

    async fn health_check(&self) -> Result<bool> {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => {
                debug!("💚 Database health check passed");
                Ok(true)
            }
            Err(e) => {
                error!("❌ Database health check failed: {}", e);
                Ok(false)
            }
        }
    }
}
