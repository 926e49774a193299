//! Memory gateway implementations.
//!
//! [`InMemoryGateway`] backs development and tests; it keeps records in
//! process memory with naive term-overlap search. [`HttpMemoryGateway`]
//! forwards every call to an external store over JSON HTTP. Selection
//! happens at startup from `gateway.base_url`.

use std::collections::HashMap;

use async_trait::async_trait;
use mnemo_core::{GatewayError, MemoryGateway, MemoryRecord, MemoryRelation, MessageItem, now_rfc3339};
use parking_lot::RwLock;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::debug;

// ─────────────────────────────────────────────────────────────────────────────
// In-memory gateway
// ─────────────────────────────────────────────────────────────────────────────

/// Process-local memory store.
#[derive(Default)]
pub struct InMemoryGateway {
    records: RwLock<HashMap<String, MemoryRecord>>,
    history: RwLock<HashMap<String, Vec<Value>>>,
    relations: RwLock<Vec<MemoryRelation>>,
}

/// Stable id for a memory: first 32 hex chars of a content digest.
fn derive_id(content: &str, metadata: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    if let Some(user) = metadata.get("user_id").and_then(Value::as_str) {
        hasher.update(user.as_bytes());
    }
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..32].to_string()
}

impl InMemoryGateway {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record_event(&self, id: &str, event: Value) {
        self.history
            .write()
            .entry(id.to_string())
            .or_default()
            .push(event);
    }

    /// Fraction of query terms present in `content`, case-insensitive.
    /// An empty query matches everything at full score.
    fn score(query: &str, content: &str) -> f64 {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if terms.is_empty() {
            return 1.0;
        }
        let haystack = content.to_lowercase();
        let hits = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
        hits as f64 / terms.len() as f64
    }

    fn matches_filters(metadata: &Value, filters: &Value) -> bool {
        let Value::Object(filters) = filters else {
            return true;
        };
        filters.iter().all(|(key, expected)| {
            expected.is_null() || metadata.get(key) == Some(expected)
        })
    }
}

#[async_trait]
impl MemoryGateway for InMemoryGateway {
    async fn add(
        &self,
        messages: Vec<MessageItem>,
        metadata: Value,
    ) -> Result<MemoryRecord, GatewayError> {
        let content = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let id = derive_id(&content, &metadata);

        // Metadata may name related memories; track them as edges.
        if let Some(related) = metadata.get("related_to").and_then(Value::as_array) {
            let relation_type = metadata
                .get("relation_type")
                .and_then(Value::as_str)
                .unwrap_or("related")
                .to_string();
            let mut relations = self.relations.write();
            for target in related.iter().filter_map(Value::as_str) {
                relations.push(MemoryRelation {
                    source_id: id.clone(),
                    target_id: target.to_string(),
                    relation_type: relation_type.clone(),
                    metadata: Value::Null,
                });
            }
        }

        let record = MemoryRecord {
            id: id.clone(),
            content,
            messages,
            metadata,
            score: None,
        };
        let _ = self.records.write().insert(id.clone(), record.clone());
        self.record_event(
            &id,
            json!({"event": "add", "timestamp": now_rfc3339()}),
        );
        debug!(memory_id = %id, "memory stored");
        Ok(record)
    }

    async fn update(&self, id: &str, updates: Value) -> Result<Option<MemoryRecord>, GatewayError> {
        let mut records = self.records.write();
        let Some(record) = records.get_mut(id) else {
            return Ok(None);
        };

        if let Some(content) = updates.get("content").and_then(Value::as_str) {
            record.content = content.to_string();
        }
        if let Some(Value::Object(patch)) = updates.get("metadata") {
            if let Value::Object(meta) = &mut record.metadata {
                for (key, value) in patch {
                    let _ = meta.insert(key.clone(), value.clone());
                }
            } else {
                record.metadata = Value::Object(patch.clone());
            }
        }
        let updated = record.clone();
        drop(records);

        self.record_event(
            id,
            json!({"event": "update", "changes": updates, "timestamp": now_rfc3339()}),
        );
        Ok(Some(updated))
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>, GatewayError> {
        Ok(self.records.read().get(id).cloned())
    }

    async fn search(
        &self,
        query: &str,
        filters: &Value,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, GatewayError> {
        let records = self.records.read();
        let mut hits: Vec<MemoryRecord> = records
            .values()
            .filter(|r| Self::matches_filters(&r.metadata, filters))
            .filter_map(|r| {
                let score = Self::score(query, &r.content);
                (score > 0.0).then(|| {
                    let mut hit = r.clone();
                    hit.score = Some(score);
                    hit
                })
            })
            .collect();
        drop(records);

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn history(&self, id: &str) -> Result<Vec<Value>, GatewayError> {
        Ok(self.history.read().get(id).cloned().unwrap_or_default())
    }

    async fn relations(&self, id: &str) -> Result<Vec<MemoryRelation>, GatewayError> {
        Ok(self
            .relations
            .read()
            .iter()
            .filter(|r| r.source_id == id || r.target_id == id)
            .cloned()
            .collect())
    }

    async fn cleanup(&self) -> Result<(), GatewayError> {
        self.records.write().clear();
        self.history.write().clear();
        self.relations.write().clear();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP gateway
// ─────────────────────────────────────────────────────────────────────────────

/// Memory store reached over JSON HTTP.
pub struct HttpMemoryGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMemoryGateway {
    /// Build a gateway for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Interpret an upstream response: 404 → `None`, other non-success →
    /// `Rejected`, undecodable body → `InvalidResponse`.
    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Option<T>, GatewayError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }

    fn required<T>(value: Option<T>) -> Result<T, GatewayError> {
        value.ok_or_else(|| GatewayError::InvalidResponse("unexpected 404".to_string()))
    }
}

#[async_trait]
impl MemoryGateway for HttpMemoryGateway {
    async fn add(
        &self,
        messages: Vec<MessageItem>,
        metadata: Value,
    ) -> Result<MemoryRecord, GatewayError> {
        let response = self
            .client
            .post(self.url("/memories"))
            .json(&json!({"messages": messages, "metadata": metadata}))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Self::required(Self::decode(response).await?)
    }

    async fn update(&self, id: &str, updates: Value) -> Result<Option<MemoryRecord>, GatewayError> {
        let response = self
            .client
            .put(self.url(&format!("/memories/{id}")))
            .json(&updates)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Self::decode(response).await
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>, GatewayError> {
        let response = self
            .client
            .get(self.url(&format!("/memories/{id}")))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Self::decode(response).await
    }

    async fn search(
        &self,
        query: &str,
        filters: &Value,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, GatewayError> {
        let response = self
            .client
            .post(self.url("/memories/search"))
            .json(&json!({"query": query, "filters": filters, "limit": limit}))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Self::required(Self::decode(response).await?)
    }

    async fn history(&self, id: &str) -> Result<Vec<Value>, GatewayError> {
        let response = self
            .client
            .get(self.url(&format!("/memories/{id}/history")))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self::decode(response).await?.unwrap_or_default())
    }

    async fn relations(&self, id: &str) -> Result<Vec<MemoryRelation>, GatewayError> {
        let response = self
            .client
            .get(self.url(&format!("/memories/{id}/relations")))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self::decode(response).await?.unwrap_or_default())
    }

    async fn cleanup(&self) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(self.url("/cleanup"))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        // Stores without a cleanup endpoint are fine.
        let _: Option<Value> = Self::decode(response).await?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(texts: &[&str]) -> Vec<MessageItem> {
        texts
            .iter()
            .map(|t| MessageItem {
                role: "user".into(),
                content: (*t).to_string(),
            })
            .collect()
    }

    // ── InMemoryGateway ─────────────────────────────────────────────

    #[tokio::test]
    async fn add_then_get_round_trip() {
        let gw = InMemoryGateway::new();
        let record = gw
            .add(messages(&["hello", "world"]), json!({"user_id": "u1"}))
            .await
            .unwrap();
        assert_eq!(record.content, "hello\nworld");

        let fetched = gw.get(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched.content, "hello\nworld");
        assert_eq!(fetched.metadata["user_id"], "u1");
    }

    #[tokio::test]
    async fn ids_are_stable_per_content_and_user() {
        let gw = InMemoryGateway::new();
        let a = gw.add(messages(&["x"]), json!({"user_id": "u1"})).await.unwrap();
        let b = gw.add(messages(&["x"]), json!({"user_id": "u1"})).await.unwrap();
        let c = gw.add(messages(&["x"]), json!({"user_id": "u2"})).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(a.id.len(), 32);
    }

    #[tokio::test]
    async fn get_absent_is_none() {
        let gw = InMemoryGateway::new();
        assert!(gw.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_merges_metadata_and_replaces_content() {
        let gw = InMemoryGateway::new();
        let record = gw
            .add(messages(&["v1"]), json!({"user_id": "u1", "kind": "note"}))
            .await
            .unwrap();

        let updated = gw
            .update(
                &record.id,
                json!({"content": "v2", "metadata": {"kind": "pinned"}}),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.content, "v2");
        assert_eq!(updated.metadata["kind"], "pinned");
        assert_eq!(updated.metadata["user_id"], "u1");
    }

    #[tokio::test]
    async fn update_absent_is_none() {
        let gw = InMemoryGateway::new();
        assert!(gw.update("missing", json!({})).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_scores_and_filters() {
        let gw = InMemoryGateway::new();
        let _ = gw
            .add(messages(&["rust borrow checker"]), json!({"user_id": "u1"}))
            .await
            .unwrap();
        let _ = gw
            .add(messages(&["rust async runtime"]), json!({"user_id": "u2"}))
            .await
            .unwrap();
        let _ = gw
            .add(messages(&["gardening tips"]), json!({"user_id": "u1"}))
            .await
            .unwrap();

        let hits = gw
            .search("rust", &json!({"user_id": "u1"}), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "rust borrow checker");
        assert_eq!(hits[0].score, Some(1.0));
    }

    #[tokio::test]
    async fn search_respects_limit_and_ordering() {
        let gw = InMemoryGateway::new();
        let _ = gw.add(messages(&["alpha beta"]), json!({})).await.unwrap();
        let _ = gw.add(messages(&["alpha only"]), json!({})).await.unwrap();

        let hits = gw.search("alpha beta", &json!({}), 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "alpha beta");
    }

    #[tokio::test]
    async fn null_filters_are_ignored() {
        let gw = InMemoryGateway::new();
        let _ = gw.add(messages(&["x"]), json!({"user_id": "u1"})).await.unwrap();
        let hits = gw
            .search("x", &json!({"user_id": null, "agent_id": null}), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn history_records_adds_and_updates() {
        let gw = InMemoryGateway::new();
        let record = gw.add(messages(&["v1"]), json!({})).await.unwrap();
        let _ = gw.update(&record.id, json!({"content": "v2"})).await.unwrap();

        let history = gw.history(&record.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["event"], "add");
        assert_eq!(history[1]["event"], "update");
    }

    #[tokio::test]
    async fn related_to_metadata_creates_edges() {
        let gw = InMemoryGateway::new();
        let base = gw.add(messages(&["base"]), json!({})).await.unwrap();
        let bridge = gw
            .add(
                messages(&["bridge"]),
                json!({"related_to": [base.id], "relation_type": "bridge"}),
            )
            .await
            .unwrap();

        let edges = gw.relations(&base.id).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source_id, bridge.id);
        assert_eq!(edges[0].relation_type, "bridge");
        // Visible from both endpoints.
        assert_eq!(gw.relations(&bridge.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cleanup_clears_everything() {
        let gw = InMemoryGateway::new();
        let record = gw.add(messages(&["x"]), json!({})).await.unwrap();
        gw.cleanup().await.unwrap();
        assert!(gw.get(&record.id).await.unwrap().is_none());
        assert!(gw.history(&record.id).await.unwrap().is_empty());
    }

    // ── HttpMemoryGateway ───────────────────────────────────────────

    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn http_gateway(server: &MockServer) -> HttpMemoryGateway {
        HttpMemoryGateway::new(&server.uri(), std::time::Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn http_add_posts_and_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/memories"))
            .and(body_partial_json(json!({"metadata": {"user_id": "u1"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "m1", "content": "hello", "metadata": {"user_id": "u1"}
            })))
            .mount(&server)
            .await;

        let gw = http_gateway(&server).await;
        let record = gw
            .add(messages(&["hello"]), json!({"user_id": "u1"}))
            .await
            .unwrap();
        assert_eq!(record.id, "m1");
        assert_eq!(record.content, "hello");
    }

    #[tokio::test]
    async fn http_get_maps_404_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/memories/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let gw = http_gateway(&server).await;
        assert!(gw.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn http_search_sends_query_and_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/memories/search"))
            .and(body_partial_json(json!({"query": "rust", "limit": 5})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "m1", "content": "rust", "score": 0.9}
            ])))
            .mount(&server)
            .await;

        let gw = http_gateway(&server).await;
        let hits = gw.search("rust", &json!({}), 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, Some(0.9));
    }

    #[tokio::test]
    async fn http_server_error_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/memories/m1"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let gw = http_gateway(&server).await;
        let err = gw.get("m1").await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { status: 503, .. }));
    }

    #[tokio::test]
    async fn http_bad_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/memories/m1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let gw = http_gateway(&server).await;
        let err = gw.get("m1").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn http_unreachable_is_transport() {
        let gw = HttpMemoryGateway::new(
            "http://127.0.0.1:1",
            std::time::Duration::from_millis(200),
        )
        .unwrap();
        let err = gw.get("m1").await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }
}
