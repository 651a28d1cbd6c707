//! Messages from connected clients.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

/// A message posted to the controller by a connected page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Drain the mutation queue now, as the recovery trigger would.
    SyncMutations,
    /// Report how many mutations are waiting.
    QueueStatus,
}

impl ClientMessage {
    /// Decodes a JSON message such as `{"type":"SYNC_MUTATIONS"}`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidMessage`] for unknown or malformed messages.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        serde_json::from_str(json).map_err(|e| EngineError::InvalidMessage(e.to_string()))
    }
}

/// The controller's answer to a [`ClientMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientReply {
    /// A drain finished.
    Drained {
        /// Entries replayed.
        attempted: usize,
        /// Entries accepted and removed.
        succeeded: usize,
        /// Entries left queued.
        failed: usize,
    },
    /// Current queue depth.
    QueueStatus {
        /// Entries waiting for replay.
        pending: usize,
    },
}

impl ClientReply {
    /// Encodes the reply as JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_value(self).map(|v| v.to_string()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_messages() {
        assert_eq!(
            ClientMessage::from_json(r#"{"type":"SYNC_MUTATIONS"}"#).unwrap(),
            ClientMessage::SyncMutations
        );
        assert_eq!(
            ClientMessage::from_json(r#"{"type":"QUEUE_STATUS"}"#).unwrap(),
            ClientMessage::QueueStatus
        );
    }

    #[test]
    fn reject_unknown_messages() {
        assert!(matches!(
            ClientMessage::from_json(r#"{"type":"SKIP_WAITING"}"#),
            Err(EngineError::InvalidMessage(_))
        ));
        assert!(ClientMessage::from_json("not json").is_err());
    }

    #[test]
    fn encode_replies() {
        let reply = ClientReply::Drained {
            attempted: 3,
            succeeded: 2,
            failed: 1,
        };
        let value: serde_json::Value = serde_json::from_str(&reply.to_json()).unwrap();
        assert_eq!(value["type"], "DRAINED");
        assert_eq!(value["succeeded"], 2);

        let status: serde_json::Value =
            serde_json::from_str(&ClientReply::QueueStatus { pending: 4 }.to_json()).unwrap();
        assert_eq!(status, serde_json::json!({ "type": "QUEUE_STATUS", "pending": 4 }));
    }
}
