//! Table definitions for both storage backends
//!
//! Every statement is idempotent so the schema can be applied on each connect.

pub const SQLITE_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS cases (
        case_id TEXT PRIMARY KEY,
        priority TEXT NOT NULL CHECK (priority IN ('URGENT', 'HIGH', 'MEDIUM', 'LOW')),
        enqueued_at INTEGER NOT NULL,
        ranked_at INTEGER NOT NULL,
        requester_id TEXT NOT NULL,
        situation_type TEXT NOT NULL,
        metadata TEXT NOT NULL DEFAULT 'null',
        assigned_responder_id TEXT,
        active INTEGER NOT NULL DEFAULT 1
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_cases_active ON cases(active, priority, ranked_at)",
    r#"
    CREATE TABLE IF NOT EXISTS assignment_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        case_id TEXT NOT NULL REFERENCES cases(case_id),
        responder_id TEXT NOT NULL,
        assigned_at INTEGER NOT NULL,
        status TEXT NOT NULL DEFAULT 'assigned' CHECK (status IN ('assigned', 'resolved')),
        resolved_at INTEGER
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_assignment_case ON assignment_history(case_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_assignment_responder ON assignment_history(responder_id)",
    r#"
    CREATE TABLE IF NOT EXISTS queue_snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        taken_at INTEGER NOT NULL,
        total_cases INTEGER NOT NULL,
        active_cases INTEGER NOT NULL,
        resolved_cases INTEGER NOT NULL,
        urgent_count INTEGER NOT NULL,
        high_count INTEGER NOT NULL,
        medium_count INTEGER NOT NULL,
        low_count INTEGER NOT NULL,
        avg_wait_minutes REAL,
        avg_resolution_minutes REAL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_snapshots_taken ON queue_snapshots(taken_at)",
];

pub const POSTGRES_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS cases (
        case_id TEXT PRIMARY KEY,
        priority TEXT NOT NULL CHECK (priority IN ('URGENT', 'HIGH', 'MEDIUM', 'LOW')),
        enqueued_at BIGINT NOT NULL,
        ranked_at BIGINT NOT NULL,
        requester_id TEXT NOT NULL,
        situation_type TEXT NOT NULL,
        metadata TEXT NOT NULL DEFAULT 'null',
        assigned_responder_id TEXT,
        active BOOLEAN NOT NULL DEFAULT TRUE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_cases_active ON cases(active, priority, ranked_at)",
    r#"
    CREATE TABLE IF NOT EXISTS assignment_history (
        id BIGSERIAL PRIMARY KEY,
        case_id TEXT NOT NULL REFERENCES cases(case_id),
        responder_id TEXT NOT NULL,
        assigned_at BIGINT NOT NULL,
        status TEXT NOT NULL DEFAULT 'assigned' CHECK (status IN ('assigned', 'resolved')),
        resolved_at BIGINT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_assignment_case ON assignment_history(case_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_assignment_responder ON assignment_history(responder_id)",
    r#"
    CREATE TABLE IF NOT EXISTS queue_snapshots (
        id BIGSERIAL PRIMARY KEY,
        taken_at BIGINT NOT NULL,
        total_cases BIGINT NOT NULL,
        active_cases BIGINT NOT NULL,
        resolved_cases BIGINT NOT NULL,
        urgent_count BIGINT NOT NULL,
        high_count BIGINT NOT NULL,
        medium_count BIGINT NOT NULL,
        low_count BIGINT NOT NULL,
        avg_wait_minutes DOUBLE PRECISION,
        avg_resolution_minutes DOUBLE PRECISION
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_snapshots_taken ON queue_snapshots(taken_at)",
];
