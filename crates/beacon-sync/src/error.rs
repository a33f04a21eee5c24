//! Sync error types.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised by the cloud client and the two engines.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Cloud credentials are absent; engines skip their cycle.
    #[error("Cloud connection not configured")]
    NotConfigured,

    /// The request never produced an HTTP response (DNS, connect, timeout).
    #[error("Cloud request failed: {0}")]
    Network(String),

    /// A response arrived but could not be interpreted.
    #[error("Cloud response invalid: {0}")]
    InvalidResponse(String),

    /// An outbox payload that should be JSON is not.
    #[error("Invalid outbox payload: {0}")]
    InvalidPayload(String),

    #[error("Database error: {0}")]
    Database(String),

    /// Channel to a running engine task has closed.
    #[error("Engine channel closed: {0}")]
    ChannelClosed(String),
}

impl SyncError {
    /// True when retrying the same operation later could succeed.
    /// Configuration and payload problems are not retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Database(_))
    }
}

impl From<beacon_db::DbError> for SyncError {
    fn from(err: beacon_db::DbError) -> Self {
        SyncError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::InvalidPayload(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SyncError::Network("timeout".into()).is_retryable());
        assert!(!SyncError::NotConfigured.is_retryable());
        assert!(!SyncError::InvalidPayload("not json".into()).is_retryable());
    }
}
