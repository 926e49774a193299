//! # mnemo-core
//!
//! Shared types for the mnemo memory coordination service:
//!
//! - [`Identity`]: authenticated caller derived from a token
//! - [`message`]: WebSocket wire envelopes, inbound parsing, chunk envelopes
//! - [`gateway`]: the [`MemoryGateway`] collaborator contract and its records
//!
//! This crate carries no I/O of its own — the server crate wires these types
//! to axum handlers and the gateway implementations.

pub mod gateway;
pub mod identity;
pub mod message;

pub use gateway::{GatewayError, MemoryGateway, MemoryRecord, MemoryRelation, MessageItem};
pub use identity::Identity;
pub use message::{ChunkEnvelope, ChunkMetadata, Envelope, Inbound, ProtocolError, chunk_content};

/// Current time as an RFC 3339 UTC string, the wire timestamp format used
/// by every outbound message.
#[must_use]
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
