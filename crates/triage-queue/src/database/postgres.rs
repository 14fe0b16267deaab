//! PostgreSQL backend

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, error, info};

use super::schema::POSTGRES_SCHEMA;
use super::{
    encode_metadata, to_millis, CaseRow, CaseStore, PerformanceRow, QueueSnapshot,
    ResponderPerformance, SnapshotRow, StatsRow, StoreStats,
};
use crate::case::{CaseRecord, Priority};
use crate::config::DatabaseConfig;
use crate::error::{QueueError, Result};

const CASE_COLUMNS: &str = "case_id, priority, enqueued_at, ranked_at, requester_id, \
     situation_type, metadata, assigned_responder_id, active";

const SNAPSHOT_COLUMNS: &str = "id, taken_at, total_cases, active_cases, resolved_cases, \
     urgent_count, high_count, medium_count, low_count, avg_wait_minutes, avg_resolution_minutes";

/// PostgreSQL-backed case store, safe to share between scheduler instances
#[derive(Clone)]
pub struct PostgresCaseStore {
    pool: PgPool,
}

impl PostgresCaseStore {
    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self> {
        info!("🗄️ Connecting PostgreSQL case store");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.query_timeout)
            .connect(url)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn initialize_schema(&self) -> Result<()> {
        debug!("📋 Creating PostgreSQL case store schema");
        for statement in POSTGRES_SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CaseStore for PostgresCaseStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn add_case(&self, case: &CaseRecord) -> Result<()> {
        let metadata = encode_metadata(case)?;
        let result = sqlx::query(
            r#"
            INSERT INTO cases (case_id, priority, enqueued_at, ranked_at, requester_id,
                situation_type, metadata, assigned_responder_id, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
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
            SET ranked_at = CASE WHEN priority = $1 THEN ranked_at ELSE $2 END,
                priority = $1
            WHERE case_id = $3 AND active
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

        // Row lock; a concurrent assigner re-checks `active` after we commit
        let updated = sqlx::query(
            "UPDATE cases SET assigned_responder_id = $1, active = FALSE WHERE case_id = $2 AND active",
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
             VALUES ($1, $2, $3, 'assigned')",
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
            "UPDATE assignment_history SET status = 'resolved', resolved_at = $1 \
             WHERE case_id = $2 AND status = 'assigned'",
        )
        .bind(to_millis(at))
        .bind(case_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_case(&self, case_id: &str) -> Result<Option<CaseRecord>> {
        let row = sqlx::query_as::<_, CaseRow>(&format!(
            "SELECT {CASE_COLUMNS} FROM cases WHERE case_id = $1"
        ))
        .bind(case_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CaseRecord::try_from).transpose()
    }

    async fn get_active_cases(&self) -> Result<Vec<CaseRecord>> {
        // "C" collation keeps case_id ties in byte order, same as the index
        let rows = sqlx::query_as::<_, CaseRow>(&format!(
            r#"
            SELECT {CASE_COLUMNS} FROM cases
            WHERE active
            ORDER BY CASE priority
                    WHEN 'URGENT' THEN 4 WHEN 'HIGH' THEN 3 WHEN 'MEDIUM' THEN 2 ELSE 1
                END DESC,
                ranked_at ASC,
                case_id COLLATE "C" ASC
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
            SELECT $1::BIGINT,
                COUNT(*),
                COUNT(*) FILTER (WHERE active),
                COUNT(*) FILTER (WHERE NOT active),
                COUNT(*) FILTER (WHERE active AND priority = 'URGENT'),
                COUNT(*) FILTER (WHERE active AND priority = 'HIGH'),
                COUNT(*) FILTER (WHERE active AND priority = 'MEDIUM'),
                COUNT(*) FILTER (WHERE active AND priority = 'LOW'),
                (AVG(($1::BIGINT - enqueued_at) / 60000.0) FILTER (WHERE active))::DOUBLE PRECISION,
                (SELECT AVG((resolved_at - assigned_at) / 60000.0)::DOUBLE PRECISION
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
            "SELECT {SNAPSHOT_COLUMNS} FROM queue_snapshots ORDER BY taken_at DESC, id DESC LIMIT $1"
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
                COUNT(*) FILTER (WHERE status = 'resolved') AS resolved_cases,
                (AVG((resolved_at - assigned_at) / 60000.0) FILTER (WHERE status = 'resolved'))::DOUBLE PRECISION
                    AS avg_resolution_minutes
            FROM assignment_history
            WHERE $1::TEXT IS NULL OR responder_id = $1
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
                COUNT(*) FILTER (WHERE active) AS active_cases,
                COUNT(*) FILTER (WHERE active AND priority = 'URGENT') AS urgent_count,
                COUNT(*) FILTER (WHERE active AND priority = 'HIGH') AS high_count,
                COUNT(*) FILTER (WHERE active AND priority = 'MEDIUM') AS medium_count,
                COUNT(*) FILTER (WHERE active AND priority = 'LOW') AS low_count,
                (AVG(($1::BIGINT - enqueued_at) / 60000.0) FILTER (WHERE active))::DOUBLE PRECISION
                    AS avg_wait_minutes
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
