//! Error types for the durable queue.

use crate::mutation::MutationId;
use outpost_storage::StorageError;
use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can occur while reading or writing the queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The underlying byte log failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The log contains a record that cannot be trusted.
    #[error("queue log corrupted at offset {offset}: {message}")]
    Corrupted {
        /// Offset of the offending record.
        offset: u64,
        /// Description of the damage.
        message: String,
    },

    /// An entry payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// An entry with this id is already queued.
    #[error("mutation {0} is already queued")]
    DuplicateKey(MutationId),

    /// The log was written by a newer schema than this build understands.
    #[error("queue schema {stored} is newer than supported schema {supported}")]
    SchemaTooNew {
        /// Version recorded in the log.
        stored: u32,
        /// Highest version this build can read.
        supported: u32,
    },

    /// The entry is not a replayable mutation.
    #[error("invalid queue entry: {0}")]
    InvalidEntry(String),
}

impl QueueError {
    /// Creates a corruption error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl std::fmt::Display) -> Self {
        Self::Codec(message.to_string())
    }
}
