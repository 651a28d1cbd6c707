//! Error types for the engine.

use outpost_queue::QueueError;
use outpost_storage::StorageError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur inside the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The network could not be reached at all.
    ///
    /// A completed HTTP response is never this error, whatever its status.
    #[error("network unreachable: {0}")]
    Network(String),

    /// The durable queue failed.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// A byte backend failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A named cache could not be read or written.
    #[error("cache error: {0}")]
    Cache(String),

    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A cache name that cannot be used as a store name.
    #[error("invalid cache name: {0:?}")]
    InvalidCacheName(String),

    /// The request could not be built or parsed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A client message could not be decoded.
    #[error("invalid client message: {0}")]
    InvalidMessage(String),

    /// Invalid lifecycle transition.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// The host refused to register a recovery trigger.
    #[error("background sync unavailable: {0}")]
    TriggerUnavailable(String),

    /// Another process holds the data directory.
    #[error("data directory is locked by another process")]
    DataDirLocked,
}

impl EngineError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates a cache error.
    pub fn cache(message: impl std::fmt::Display) -> Self {
        Self::Cache(message.to_string())
    }

    /// Returns true if this is a reachability failure rather than a local one.
    ///
    /// Reachability failures are recoverable: reads fall back to the cache and
    /// writes are queued. Everything else is a local storage problem.
    pub fn is_network(&self) -> bool {
        matches!(self, EngineError::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_classified() {
        assert!(EngineError::network("connection refused").is_network());
        assert!(!EngineError::cache("disk full").is_network());
        assert!(!EngineError::Queue(QueueError::Codec("bad".into())).is_network());
    }

    #[test]
    fn error_display() {
        let err = EngineError::InvalidStateTransition {
            from: "Parsed".into(),
            to: "Activated".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid state transition from \"Parsed\" to \"Activated\""
        );

        assert_eq!(
            EngineError::network("offline").to_string(),
            "network unreachable: offline"
        );
    }
}
