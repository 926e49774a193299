//! Admin event broadcast.

use axum::Extension;
use axum::extract::{Path, Query, State};
use axum::response::Json;
use mnemo_core::Identity;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::AppState;

/// Query string of `POST /api/v1/broadcast/{event_type}`.
#[derive(Debug, Deserialize)]
pub struct BroadcastParams {
    /// Target one user; absent means every connected user.
    pub user_id: Option<String>,
}

/// `POST /api/v1/broadcast/{event_type}?user_id=`
///
/// Admin-only push of an arbitrary tagged event.
pub async fn send(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(event_type): Path<String>,
    Query(params): Query<BroadcastParams>,
    Json(data): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    if !identity.is_admin {
        return Err(ApiError::Forbidden(
            "broadcast requires an admin token".to_string(),
        ));
    }

    let recipients = state
        .dispatcher
        .broadcast(&event_type, data, params.user_id.as_deref())
        .await;
    Ok(Json(json!({
        "status": "sent",
        "event_type": event_type,
        "recipients": recipients,
    })))
}
