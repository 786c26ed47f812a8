//! WebSocket message types: envelope, commands, and events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

impl WsMessage {
    /// Builds a server message stamped now.
    #[must_use]
    pub fn new(id: impl Into<String>, msg_type: WsMessageType, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            msg_type,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Builds an event message with a fresh id.
    #[must_use]
    pub fn event(payload: serde_json::Value) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), WsMessageType::Event, payload)
    }

    /// Builds an error reply.
    #[must_use]
    pub fn error(id: impl Into<String>, code: u32, message: impl Into<String>) -> Self {
        Self::new(
            id,
            WsMessageType::Error,
            serde_json::json!({ "code": code, "message": message.into() }),
        )
    }

    /// Serializes the message; `None` only if a payload is not JSON-safe.
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client broadcast event.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands that a client can send over WebSocket, carried in the
/// envelope's `payload`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Subscribe to events of datasets.
    Subscribe {
        /// Dataset keys or patterns. `"*"` matches everything and a trailing
        /// `*` matches a prefix (e.g. `"history:*"`).
        datasets: Vec<String>,
    },
    /// Unsubscribe from datasets.
    Unsubscribe {
        /// Patterns previously subscribed.
        datasets: Vec<String>,
    },
    /// Start a refresh in the background; the report arrives as a response
    /// once it finishes.
    Refresh {
        /// Dataset key.
        dataset: String,
        /// Refresh even when fresh.
        #[serde(default)]
        force: bool,
    },
    /// Snapshot counts per venue.
    Status,
}
