//! Liveness probe.

use axum::Json;
use serde_json::{Value, json};

/// `GET /health` — deliberately shallow: reports process liveness only,
/// never the gateway's.
pub async fn health() -> Json<Value> {
    Json(json!({"status": "healthy"}))
}
