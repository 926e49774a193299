//! Cross-session memory bridges.
//!
//! A bridge records that two working sessions share context. Bridge
//! strength grows linearly with the amount of shared context and saturates
//! at 1.0.

use axum::Extension;
use axum::extract::{Path, State};
use axum::response::Json;
use mnemo_core::{Identity, MessageItem};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Strength of a bridge built from `shared` context items.
fn bridge_strength(shared: usize) -> f64 {
    (0.2 * shared as f64).min(1.0)
}

/// Body of `POST /api/v1/bridge`.
#[derive(Debug, Deserialize)]
pub struct CreateBridgeRequest {
    /// Session the bridge originates from.
    pub session_id: String,
    /// Context items shared across sessions.
    #[serde(default)]
    pub shared_context: Vec<String>,
}

/// `POST /api/v1/bridge`
pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<CreateBridgeRequest>,
) -> Result<Json<Value>, ApiError> {
    let strength = bridge_strength(body.shared_context.len());
    let messages = body
        .shared_context
        .iter()
        .map(|item| MessageItem {
            role: "system".to_string(),
            content: item.clone(),
        })
        .collect();

    let record = state
        .gateway
        .add(
            messages,
            json!({
                "type": "bridge",
                "session_id": body.session_id,
                "user_id": identity.user_id,
                "strength": strength,
            }),
        )
        .await?;
    info!(
        bridge_id = %record.id,
        session_id = %body.session_id,
        strength,
        "memory bridge created"
    );
    Ok(Json(json!({
        "bridge_id": record.id,
        "session_id": body.session_id,
        "strength": strength,
        "record": record,
    })))
}

/// `GET /api/v1/bridge/{session_id}`
pub async fn list_for_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let bridges = state
        .gateway
        .search("", &json!({"type": "bridge", "session_id": session_id}), 100)
        .await?;
    Ok(Json(json!({"session_id": session_id, "bridges": bridges})))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_scales_with_context() {
        assert!((bridge_strength(0) - 0.0).abs() < f64::EPSILON);
        assert!((bridge_strength(1) - 0.2).abs() < f64::EPSILON);
        assert!((bridge_strength(3) - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn strength_saturates_at_one() {
        assert!((bridge_strength(5) - 1.0).abs() < f64::EPSILON);
        assert!((bridge_strength(50) - 1.0).abs() < f64::EPSILON);
    }
}
