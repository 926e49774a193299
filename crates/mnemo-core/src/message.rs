//! WebSocket wire messages.
//!
//! Outbound traffic is always an [`Envelope`] (`{type, data, timestamp}`) or
//! a [`ChunkEnvelope`] wrapped inside one. Inbound text is parsed leniently
//! through [`Inbound::parse`]: unknown type tags are tolerated (the relay
//! loop logs and ignores them), while structurally malformed payloads are a
//! [`ProtocolError`] that terminates the session.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::now_rfc3339;

/// Known outbound/inbound message type tags.
pub mod tags {
    /// Sent once after a relay connection registers.
    pub const CONNECTION_ESTABLISHED: &str = "connection_established";
    /// Client-originated update, fanned out to sibling sessions.
    pub const MEMORY_UPDATE: &str = "memory_update";
    /// Acknowledgment returned to the sender of a `memory_update`.
    pub const MEMORY_UPDATE_ACK: &str = "memory_update_ack";
    /// Client liveness probe.
    pub const PING: &str = "ping";
    /// Reply to a ping, echoing the sender's timestamp.
    pub const PONG: &str = "pong";
    /// One slice of streamed memory content.
    pub const MEMORY_CHUNK: &str = "memory_chunk";
    /// Structured error notification.
    pub const ERROR: &str = "error";
}

/// A structurally invalid inbound payload.
///
/// Unknown type tags are *not* protocol errors; only payloads the relay
/// cannot interpret at all land here, and they terminate the session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The text frame was not valid JSON.
    #[error("malformed message payload: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The payload parsed but was not a JSON object.
    #[error("message payload is not an object")]
    NotAnObject,
}

/// Outbound tagged message: `{type, data, timestamp}`.
///
/// The timestamp is stamped at construction time, i.e. at send time for
/// broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type tag (see [`tags`]).
    #[serde(rename = "type")]
    pub message_type: String,
    /// Tag-specific payload.
    pub data: Value,
    /// RFC 3339 UTC send time.
    pub timestamp: String,
}

impl Envelope {
    /// Build an envelope stamped with the current time.
    #[must_use]
    pub fn new(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            message_type: message_type.into(),
            data,
            timestamp: now_rfc3339(),
        }
    }

    /// Serialize to the wire string.
    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Parsed inbound message, by type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `memory_update` with its data payload (`{}` when absent).
    MemoryUpdate {
        /// Update payload, forwarded verbatim to sibling sessions.
        data: Value,
    },
    /// `ping` with the sender-provided timestamp, echoed back verbatim
    /// (`null` when the sender omitted it).
    Ping {
        /// Sender timestamp, opaque to the server.
        timestamp: Value,
    },
    /// Any other (or missing) type tag. Logged and ignored by the relay.
    Unknown {
        /// The unrecognized tag, empty when the payload carried none.
        tag: String,
    },
}

impl Inbound {
    /// Parse one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(map) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        let tag = map.get("type").and_then(Value::as_str).unwrap_or_default();
        match tag {
            tags::MEMORY_UPDATE => Ok(Self::MemoryUpdate {
                data: map.get("data").cloned().unwrap_or_else(|| Value::Object(Default::default())),
            }),
            tags::PING => Ok(Self::Ping {
                timestamp: map.get("timestamp").cloned().unwrap_or(Value::Null),
            }),
            other => Ok(Self::Unknown { tag: other.to_string() }),
        }
    }
}

/// One slice of a chunked content stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkEnvelope {
    /// Chunk id, `{session_id}_{index}` (`{session_id}_error` for the
    /// terminal error chunk).
    pub id: String,
    /// Slice of the streamed content, or the error description.
    pub content: String,
    /// `memory_chunk`, or `error` for the terminal failure chunk.
    #[serde(rename = "type")]
    pub kind: String,
    /// True exactly on the final chunk of the stream.
    pub done: bool,
    /// Position and provenance of this chunk.
    pub metadata: ChunkMetadata,
}

/// Position and provenance of a [`ChunkEnvelope`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// 1-indexed position within the stream (absent on error chunks).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_number: Option<usize>,
    /// Total number of chunks in the stream (absent on error chunks).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    /// Session the stream was addressed to.
    pub session_id: String,
    /// Present and true on the terminal error chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
    /// RFC 3339 UTC stamp taken when the chunk was produced.
    pub timestamp: String,
}

impl ChunkEnvelope {
    /// Build the chunk at `index` (0-based) of `total` chunks.
    #[must_use]
    pub fn chunk(session_id: &str, index: usize, total: usize, content: String) -> Self {
        Self {
            id: format!("{session_id}_{index}"),
            content,
            kind: tags::MEMORY_CHUNK.to_string(),
            done: index + 1 == total,
            metadata: ChunkMetadata {
                chunk_number: Some(index + 1),
                total_chunks: Some(total),
                session_id: session_id.to_string(),
                error: None,
                timestamp: now_rfc3339(),
            },
        }
    }

    /// Build the terminal error chunk for a failed stream.
    #[must_use]
    pub fn error(session_id: &str, message: String) -> Self {
        Self {
            id: format!("{session_id}_error"),
            content: message,
            kind: tags::ERROR.to_string(),
            done: true,
            metadata: ChunkMetadata {
                chunk_number: None,
                total_chunks: None,
                session_id: session_id.to_string(),
                error: Some(true),
                timestamp: now_rfc3339(),
            },
        }
    }
}

/// Split `content` into chunks of at most `chunk_size` characters.
///
/// Splitting is by character, never inside a UTF-8 code point. A
/// `chunk_size` of zero is clamped to one.
#[must_use]
pub fn chunk_content(content: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut len = 0;
    for ch in content.chars() {
        current.push(ch);
        len += 1;
        if len == chunk_size {
            chunks.push(std::mem::take(&mut current));
            len = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
