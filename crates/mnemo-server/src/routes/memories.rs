//! Memory CRUD, search, history, relations, suggestions, compression, and
//! the chunk-stream trigger.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use futures::StreamExt;
use mnemo_core::{Identity, MemoryRecord, MessageItem};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

fn default_metadata() -> Value {
    json!({})
}

/// Body of `POST /api/v1/memories`.
#[derive(Debug, Deserialize)]
pub struct CreateMemoryRequest {
    /// Conversation messages to store.
    pub messages: Vec<MessageItem>,
    /// Store-defined metadata, `{}` when omitted.
    #[serde(default = "default_metadata")]
    pub metadata: Value,
}

/// `POST /api/v1/memories`
pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<CreateMemoryRequest>,
) -> Result<Json<MemoryRecord>, ApiError> {
    let mut metadata = body.metadata;
    if metadata.get("user_id").is_none() {
        if let Value::Object(map) = &mut metadata {
            let _ = map.insert("user_id".to_string(), json!(identity.user_id));
        }
    }
    let record = state.gateway.add(body.messages, metadata).await?;
    info!(memory_id = %record.id, user_id = %identity.user_id, "memory created");
    Ok(Json(record))
}

/// `PUT /api/v1/memories/{id}`
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(updates): Json<Value>,
) -> Result<Json<MemoryRecord>, ApiError> {
    state
        .gateway
        .update(&id, updates)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("memory {id} not found")))
}

/// `GET /api/v1/memories/{id}`
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MemoryRecord>, ApiError> {
    state
        .gateway
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("memory {id} not found")))
}

fn default_limit() -> usize {
    10
}

/// Query string of `GET /api/v1/memories`.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    /// Free-text query, empty matches on filters alone.
    #[serde(default)]
    pub query: String,
    /// Restrict to one user's memories.
    pub user_id: Option<String>,
    /// Restrict to one agent's memories.
    pub agent_id: Option<String>,
    /// Restrict to one run.
    pub run_id: Option<String>,
    /// Maximum results.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// `GET /api/v1/memories?query=&user_id=&agent_id=&run_id=&limit=`
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>, ApiError> {
    let filters = json!({
        "user_id": params.user_id,
        "agent_id": params.agent_id,
        "run_id": params.run_id,
    });
    let results = state
        .gateway
        .search(&params.query, &filters, params.limit)
        .await?;
    Ok(Json(json!({"query": params.query, "results": results})))
}

/// `GET /api/v1/memories/{id}/history`
pub async fn history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let history = state.gateway.history(&id).await?;
    Ok(Json(json!({"memory_id": id, "history": history})))
}

/// `GET /api/v1/memories/{id}/relations`
pub async fn relations(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let relations = state.gateway.relations(&id).await?;
    Ok(Json(json!({"memory_id": id, "relations": relations})))
}

fn default_suggestion_limit() -> usize {
    5
}

/// Query string of `GET /api/v1/memories/{id}/suggestions`.
#[derive(Debug, Deserialize)]
pub struct SuggestionParams {
    /// Maximum suggestions.
    #[serde(default = "default_suggestion_limit")]
    pub limit: usize,
}

/// `GET /api/v1/memories/{id}/suggestions?limit=`
///
/// Content-similarity neighbors of one memory, the memory itself excluded.
pub async fn suggestions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SuggestionParams>,
) -> Result<Json<Value>, ApiError> {
    let record = state
        .gateway
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("memory {id} not found")))?;

    // Over-fetch by one so the seed's own hit can be dropped.
    let hits = state
        .gateway
        .search(&record.content, &json!({}), params.limit + 1)
        .await?;
    let suggestions: Vec<MemoryRecord> = hits
        .into_iter()
        .filter(|hit| hit.id != id)
        .take(params.limit)
        .collect();
    Ok(Json(json!({"memory_id": id, "suggestions": suggestions})))
}

/// `POST /api/v1/memories/{id}/compress`
///
/// Merges a memory with everything related to it into one new compressed
/// record linked back to its sources.
pub async fn compress(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = state
        .gateway
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("memory {id} not found")))?;

    let mut source_ids = vec![id.clone()];
    let mut contents = vec![record.content.clone()];
    for edge in state.gateway.relations(&id).await? {
        let other = if edge.source_id == id {
            edge.target_id
        } else {
            edge.source_id
        };
        if let Some(related) = state.gateway.get(&other).await? {
            contents.push(related.content);
            source_ids.push(other);
        }
    }

    let compressed = state
        .gateway
        .add(
            vec![MessageItem {
                role: "system".to_string(),
                content: contents.join("\n\n"),
            }],
            json!({
                "type": "compressed",
                "user_id": identity.user_id,
                "related_to": source_ids,
                "relation_type": "compressed_from",
            }),
        )
        .await?;
    info!(memory_id = %id, compressed_id = %compressed.id, sources = source_ids.len(), "memory compressed");
    Ok(Json(json!({
        "memory_id": id,
        "compressed_id": compressed.id,
        "source_count": source_ids.len(),
        "record": compressed,
    })))
}

/// Query string of `GET /api/v1/memories/{id}/stream`.
#[derive(Debug, Deserialize)]
pub struct StreamParams {
    /// Session addressed by the pushed chunks.
    pub session_id: String,
    /// Override the configured chunk size.
    pub chunk_size: Option<usize>,
}

/// `GET /api/v1/memories/{id}/stream?session_id=`
///
/// Triggers chunked delivery of one memory's content. Chunks are pushed to
/// the caller's live WebSocket connections and simultaneously returned
/// here as newline-delimited JSON (the pull path).
pub async fn stream(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Query(params): Query<StreamParams>,
) -> Result<Response, ApiError> {
    let record = state
        .gateway
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("memory {id} not found")))?;

    let chunk_size = params.chunk_size.unwrap_or_else(|| state.streaming.chunk_size());
    let chunks = state.streaming.stream_chunks(
        &identity.user_id,
        &params.session_id,
        &record.content,
        chunk_size,
    );
    let lines = chunks.map(|chunk| {
        let mut line = serde_json::to_string(&chunk).unwrap_or_default();
        line.push('\n');
        Ok::<_, std::convert::Infallible>(line)
    });

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response())
}
