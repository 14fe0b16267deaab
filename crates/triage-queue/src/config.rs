use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};
use crate::queue::WaitTimePolicy;

/// Path value that selects an in-memory SQLite database
pub const SQLITE_IN_MEMORY: &str = ":memory:";

/// Triage queue engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEngineConfig {
    /// Persistence backend and connection settings
    pub database: DatabaseConfig,

    /// In-memory index caching
    pub cache: CacheConfig,

    /// Periodic queue snapshots
    pub snapshots: SnapshotConfig,

    /// Wait-time estimation table and factors
    pub wait_time: WaitTimePolicy,
}

/// Which persistence engine backs the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageBackend {
    /// Embedded single-file store; `:memory:` for a throwaway database
    Sqlite { path: String },
    /// Client-server store
    Postgres { url: String },
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StorageBackend,

    /// Maximum pooled connections
    pub max_connections: u32,

    /// Upper bound for any single storage call
    pub query_timeout: Duration,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long the in-memory index is trusted before read queries rebuild it
    pub ttl: Duration,
}

/// Snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Start the background snapshot timer with the engine
    pub enabled: bool,

    /// Time between snapshots
    pub interval: Duration,

    /// Number of snapshots returned to analytics
    pub history_limit: u32,
}

impl QueueEngineConfig {
    /// Config backed by an in-memory SQLite database
    pub fn in_memory() -> Self {
        Self {
            database: DatabaseConfig::sqlite(SQLITE_IN_MEMORY),
            ..Self::default()
        }
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        match &self.database.backend {
            StorageBackend::Sqlite { path } if path.trim().is_empty() => {
                return Err(QueueError::config("sqlite path cannot be empty"));
            }
            StorageBackend::Postgres { url } if url.trim().is_empty() => {
                return Err(QueueError::config("postgres url cannot be empty"));
            }
            _ => {}
        }

        if self.database.max_connections == 0 {
            return Err(QueueError::config("max_connections must be greater than 0"));
        }

        if self.database.query_timeout.is_zero() {
            return Err(QueueError::config("query_timeout must be greater than 0"));
        }

        if self.snapshots.enabled && self.snapshots.interval.is_zero() {
            return Err(QueueError::config("snapshot interval must be greater than 0"));
        }

        let policy = &self.wait_time;
        if policy.business_start_hour > policy.business_end_hour
            || policy.business_end_hour > policy.evening_end_hour
            || policy.evening_end_hour > 23
        {
            return Err(QueueError::config(format!(
                "invalid hour window: business {}-{}, evening until {}",
                policy.business_start_hour, policy.business_end_hour, policy.evening_end_hour
            )));
        }

        if policy.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(QueueError::config(format!(
                "utc_offset_minutes out of range: {}",
                policy.utc_offset_minutes
            )));
        }

        if policy.uncertainty_cap < policy.uncertainty_base {
            return Err(QueueError::config("uncertainty_cap must be at least uncertainty_base"));
        }

        Ok(())
    }
}

impl Default for QueueEngineConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            snapshots: SnapshotConfig::default(),
            wait_time: WaitTimePolicy::default(),
        }
    }
}

impl DatabaseConfig {
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            backend: StorageBackend::Sqlite { path: path.into() },
            ..Self::default()
        }
    }

    pub fn postgres(url: impl Into<String>) -> Self {
        Self {
            backend: StorageBackend::Postgres { url: url.into() },
            ..Self::default()
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite {
                path: "triage_queue.db".to_string(),
            },
            max_connections: 10,
            query_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(3600), // hourly
            history_limit: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = QueueEngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.ttl, Duration::from_secs(60));
        assert_eq!(config.snapshots.history_limit, 30);
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = QueueEngineConfig::in_memory();
        config.database.max_connections = 0;
        assert!(matches!(config.validate(), Err(QueueError::Config(_))));

        let mut config = QueueEngineConfig::in_memory();
        config.database.backend = StorageBackend::Postgres { url: " ".to_string() };
        assert!(config.validate().is_err());

        let mut config = QueueEngineConfig::in_memory();
        config.wait_time.utc_offset_minutes = 24 * 60;
        assert!(config.validate().is_err());

        let mut config = QueueEngineConfig::in_memory();
        config.snapshots.interval = Duration::ZERO;
        assert!(config.validate().is_err());
        config.snapshots.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backend_serde_shape() {
        let json = serde_json::to_value(StorageBackend::Sqlite {
            path: SQLITE_IN_MEMORY.to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "sqlite");
        assert_eq!(json["path"], ":memory:");
    }
}
