use thiserror::Error;

/// Triage queue errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueueError {
    /// Priority string is not one of URGENT, HIGH, MEDIUM, LOW
    #[error("Invalid priority level: {0}")]
    InvalidPriority(String),

    /// A case with this id already exists
    #[error("Case already exists: {0}")]
    DuplicateCase(String),

    /// Unknown or inactive case
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage could not be reached or did not answer in time
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Any other storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl QueueError {
    /// Create a new InvalidPriority error
    pub fn invalid_priority<S: Into<String>>(msg: S) -> Self {
        Self::InvalidPriority(msg.into())
    }

    /// Create a new DuplicateCase error
    pub fn duplicate<S: Into<String>>(case_id: S) -> Self {
        Self::DuplicateCase(case_id.into())
    }

    /// Create a new NotFound error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new StorageUnavailable error
    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        Self::StorageUnavailable(msg.into())
    }

    /// Create a new Storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new Config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new InvalidInput error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether a caller may retry the operation with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }

    /// Whether the operation referenced an unknown or inactive case
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::StorageUnavailable(err.to_string()),
            other => Self::Storage(other.to_string()),
        }
    }
}

/// Result type for triage queue operations
pub type Result<T> = std::result::Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(QueueError::unavailable("db down").is_retryable());
        assert!(!QueueError::not_found("case-1").is_retryable());
        assert!(QueueError::not_found("case-1").is_not_found());
        assert!(!QueueError::duplicate("case-1").is_not_found());
    }

    #[test]
    fn test_sqlx_connectivity_maps_to_unavailable() {
        let err: QueueError = sqlx::Error::PoolTimedOut.into();
        assert!(err.is_retryable());

        let err: QueueError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, QueueError::Storage(_)));
    }
}
