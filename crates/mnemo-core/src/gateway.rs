//! The memory-store collaborator contract.
//!
//! Everything behind this trait — embeddings, vector search, graph storage,
//! persistence format — is an external service's business. The coordination
//! layer only routes requests through it and surfaces its failures
//! unchanged (no retry policy of its own).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Failure reported by the memory store collaborator.
///
/// Logged with full context at the call site and re-raised unchanged; the
/// coordination layer adds no retry policy around the collaborator.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request never produced a usable response (connect, timeout, I/O).
    #[error("memory store request failed: {0}")]
    Transport(String),
    /// The store responded but the payload could not be interpreted.
    #[error("memory store returned an invalid response: {0}")]
    InvalidResponse(String),
    /// The store rejected the request outright.
    #[error("memory store rejected the request ({status}): {message}")]
    Rejected {
        /// Upstream HTTP status (0 when not applicable).
        status: u16,
        /// Upstream error description.
        message: String,
    },
}

/// One conversational message inside a memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageItem {
    /// Speaker role (`user`, `assistant`, `system`, ...).
    pub role: String,
    /// Message text.
    pub content: String,
}

/// A stored memory as returned by the collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Stable memory identifier.
    pub id: String,
    /// Flattened textual content.
    #[serde(default)]
    pub content: String,
    /// Original messages, kept for reconstruction.
    #[serde(default)]
    pub messages: Vec<MessageItem>,
    /// Store-defined metadata (user/agent ids, record type, ...).
    #[serde(default)]
    pub metadata: Value,
    /// Similarity score, present on search results only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// A relation edge between two memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRelation {
    /// Source memory id.
    pub source_id: String,
    /// Target memory id.
    pub target_id: String,
    /// Relation kind (`bridge`, `suggestion`, ...).
    pub relation_type: String,
    /// Store-defined metadata.
    #[serde(default)]
    pub metadata: Value,
}

/// Opaque persistence/search collaborator.
///
/// All methods are potentially slow, fallible network calls; callers must
/// never assume synchronous low-latency behavior. Absent records are an
/// explicit `None`/empty result, not an error.
#[async_trait]
pub trait MemoryGateway: Send + Sync {
    /// Store a new memory built from `messages` and `metadata`.
    async fn add(
        &self,
        messages: Vec<MessageItem>,
        metadata: Value,
    ) -> Result<MemoryRecord, GatewayError>;

    /// Update an existing memory. `None` when no record has that id.
    async fn update(
        &self,
        id: &str,
        updates: Value,
    ) -> Result<Option<MemoryRecord>, GatewayError>;

    /// Fetch one memory by id. `None` when absent.
    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>, GatewayError>;

    /// Similarity search with store-interpreted `filters`.
    async fn search(
        &self,
        query: &str,
        filters: &Value,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, GatewayError>;

    /// Change history of one memory, as opaque store events.
    async fn history(&self, id: &str) -> Result<Vec<Value>, GatewayError>;

    /// Relation edges touching one memory.
    async fn relations(&self, id: &str) -> Result<Vec<MemoryRelation>, GatewayError>;

    /// Release store-side resources on shutdown.
    async fn cleanup(&self) -> Result<(), GatewayError>;
}
