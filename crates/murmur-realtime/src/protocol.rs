//! Wire shapes exchanged over a live connection.

use crate::error::RealtimeError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use murmur_storage::Message;
use serde::{Deserialize, Serialize};

/// The only inbound envelope type that is acted upon.
pub const MESSAGE_TYPE: &str = "message";

/// A discrete unit of data on a live connection, independent of the
/// underlying websocket implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text payload carrying a JSON envelope.
    Text(String),
    /// Binary payload (not part of the protocol, ignored).
    Binary(Bytes),
    /// Keepalive ping.
    Ping(Bytes),
    /// Liveness acknowledgement.
    Pong(Bytes),
    /// Close notification.
    Close,
}

impl Frame {
    /// Size of the frame payload in bytes.
    pub fn payload_len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(data) | Frame::Ping(data) | Frame::Pong(data) => data.len(),
            Frame::Close => 0,
        }
    }
}

/// Envelope sent by a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEnvelope {
    /// Envelope type. Only [`MESSAGE_TYPE`] is recognized.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Chat text.
    #[serde(default)]
    pub content: String,
}

/// Envelope delivered to every peer for each broadcast message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    /// Always [`MESSAGE_TYPE`].
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub sender: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for OutboundEnvelope {
    fn from(message: &Message) -> Self {
        Self {
            kind: MESSAGE_TYPE.to_string(),
            id: message.id.clone(),
            sender: message.sender.clone(),
            content: message.content.clone(),
            created_at: message.created_at,
        }
    }
}

/// Decodes an inbound text frame.
///
/// Returns the chat content for `"message"` envelopes and `None` for any
/// other type. Malformed JSON or an empty chat content is a protocol
/// violation.
pub fn decode_inbound(text: &str) -> Result<Option<String>, RealtimeError> {
    let envelope: InboundEnvelope =
        serde_json::from_str(text).map_err(|e| RealtimeError::Protocol(e.to_string()))?;

    if envelope.kind != MESSAGE_TYPE {
        return Ok(None);
    }

    if envelope.content.is_empty() {
        return Err(RealtimeError::Protocol("empty message content".to_string()));
    }

    Ok(Some(envelope.content))
}

/// Serializes the outbound envelope for a persisted message.
pub fn encode_outbound(message: &Message) -> Result<String, RealtimeError> {
    Ok(serde_json::to_string(&OutboundEnvelope::from(message))?)
}
