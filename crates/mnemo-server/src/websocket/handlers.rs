//! WebSocket endpoint handlers.
//!
//! Both endpoints authenticate and rate-check **before** accepting the
//! upgrade. An auth failure is refused as a plain HTTP 401; a rate-limit
//! failure completes the upgrade solely to deliver the 1008
//! policy-violation close frame. In neither case is anything registered.

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use mnemo_core::message::tags;
use mnemo_core::{Envelope, Identity};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::registry::ConnectionHandle;
use crate::error::{ApiError, ws_error_envelope};
use crate::ratelimit::Channel;
use crate::state::AppState;

/// Query string of both WebSocket endpoints.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Access token; WebSocket clients cannot set headers.
    pub token: Option<String>,
}

fn admit(
    state: &AppState,
    params: &WsParams,
    session_id: &str,
) -> Result<Option<Identity>, ApiError> {
    let identity = state
        .authenticator
        .authenticate_websocket(params.token.as_deref())?;
    if state.rate_limiter.check(Channel::Ws, &identity.user_id) {
        Ok(Some(identity))
    } else {
        info!(user_id = %identity.user_id, session_id, "websocket connection rate limited");
        Ok(None)
    }
}

/// Complete the upgrade only to refuse with a policy-violation close.
async fn close_policy_violation(mut socket: WebSocket) {
    let envelope = ws_error_envelope("rate_limit_exceeded", "rate limit exceeded", 429);
    let _ = socket.send(Message::Text(envelope.to_string().into())).await;
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: "rate limit exceeded".into(),
        })))
        .await;
}

/// `GET /ws/memory/{session_id}?token=` — the bidirectional relay.
pub async fn memory(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    match admit(&state, &params, &session_id) {
        Err(e) => e.into_response(),
        Ok(None) => ws.on_upgrade(close_policy_violation),
        Ok(Some(identity)) => ws.on_upgrade(move |socket| {
            relay_session(state, identity, session_id, socket)
        }),
    }
}

/// `GET /ws/stream/{session_id}?token=` — one-directional chunk delivery.
///
/// The session only receives; inbound frames are drained and ignored
/// until the peer closes.
pub async fn stream(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    match admit(&state, &params, &session_id) {
        Err(e) => e.into_response(),
        Ok(None) => ws.on_upgrade(close_policy_violation),
        Ok(Some(identity)) => ws.on_upgrade(move |socket| {
            stream_session(state, identity, session_id, socket)
        }),
    }
}

/// Register, greet, run the body, then clean up exactly once.
///
/// The writer task owns the sink and drains the connection's queue; it
/// hands the sink back once every queued frame (including any final error
/// envelope) is flushed, so the close frame goes out last.
async fn run_session<F, Fut>(
    state: AppState,
    identity: Identity,
    session_id: String,
    socket: WebSocket,
    body: F,
) where
    F: FnOnce(AppState, ConnectionHandle, futures::stream::SplitStream<WebSocket>) -> Fut,
    Fut: Future<Output = Option<u16>> + Send,
{
    let (mut sink, incoming) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(64);
    let handle = ConnectionHandle::new(identity.user_id.clone(), session_id.clone(), tx);
    state.registry.register(handle.clone()).await;

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        sink
    });

    let greeting = Envelope::new(
        tags::CONNECTION_ESTABLISHED,
        json!({"session_id": session_id, "user_id": identity.user_id}),
    );
    if let Ok(wire) = greeting.to_wire() {
        let _ = handle.send(wire);
    }
    info!(user_id = %identity.user_id, session_id, "websocket session open");

    let close = body(state.clone(), handle.clone(), incoming).await;

    state.registry.unregister(&identity.user_id, &session_id).await;
    drop(handle);

    // All senders are gone; the writer drains the queue and returns the sink.
    if let Ok(mut sink) = writer.await {
        if let Some(code) = close {
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code,
                    reason: "internal error".into(),
                })))
                .await;
        } else {
            let _ = sink.close().await;
        }
    }
    info!(user_id = %identity.user_id, session_id, "websocket session closed");
}

async fn relay_session(
    state: AppState,
    identity: Identity,
    session_id: String,
    socket: WebSocket,
) {
    run_session(state, identity, session_id, socket, |state, handle, incoming| async move {
        match state.streaming.relay_messages(incoming, &handle).await {
            Ok(()) => None,
            Err(e) => {
                warn!(
                    user_id = %handle.user_id,
                    session_id = %handle.session_id,
                    error = %e,
                    "relay terminated on protocol error"
                );
                let envelope = ws_error_envelope("protocol_error", &e.to_string(), 400);
                let _ = handle.send(envelope.to_string());
                Some(close_code::ERROR)
            }
        }
    })
    .await;
}

async fn stream_session(
    state: AppState,
    identity: Identity,
    session_id: String,
    socket: WebSocket,
) {
    run_session(state, identity, session_id, socket, |_state, handle, mut incoming| async move {
        while let Some(frame) = incoming.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(other) => {
                    debug!(
                        user_id = %handle.user_id,
                        session_id = %handle.session_id,
                        frame = ?other,
                        "ignoring inbound frame on stream endpoint"
                    );
                }
            }
        }
        None
    })
    .await;
}
