use serde::Serialize;
use serde_json::{Map, Value};

use super::types::RoomKey;

/// Messages originated by the relay itself.
///
/// Everything else a client receives is a peer's frame relayed verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Sent once to a connection right after it joins its room
    Connected {
        #[serde(rename = "roomId")]
        room_id: RoomKey,
    },
    /// Sent once to the waiting member when the initiator completes the pair
    PeerReady,
}

/// Tag used in logs when a signaling object has no string `type` field.
pub const UNKNOWN_SIGNAL_TYPE: &str = "unknown";

#[derive(Debug, thiserror::Error)]
#[error("signaling frame is not a JSON object: {0}")]
pub struct SignalParseError(#[from] serde_json::Error);

/// What the relay learned from peeking at an inbound signaling frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalEnvelope {
    /// The declared `type` tag, or [`UNKNOWN_SIGNAL_TYPE`]
    pub message_type: String,
}

impl SignalEnvelope {
    /// Parse a frame just far enough to read its `type` tag.
    ///
    /// The frame must be a JSON object; arrays, scalars, and malformed text are
    /// rejected. Nothing else about the payload is checked.
    pub fn inspect(text: &str) -> Result<Self, SignalParseError> {
        let object: Map<String, Value> = serde_json::from_str(text)?;
        let message_type = object
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_SIGNAL_TYPE)
            .to_owned();
        Ok(Self { message_type })
    }
}
