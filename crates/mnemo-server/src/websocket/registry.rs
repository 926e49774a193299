//! Live WebSocket connection bookkeeping and fan-out.

use std::collections::HashMap;

use mnemo_core::Envelope;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Send side of one registered WebSocket session.
///
/// The receive half lives in the session's writer task; dropping a handle
/// (e.g. on replace) closes the queue and unblocks that task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Owning user.
    pub user_id: String,
    /// Session within the user's connection bucket.
    pub session_id: String,
    /// Queue drained by the session's writer task.
    pub tx: tokio::sync::mpsc::Sender<String>,
}

impl ConnectionHandle {
    /// Create a handle for `(user_id, session_id)`.
    #[must_use]
    pub fn new(user_id: String, session_id: String, tx: tokio::sync::mpsc::Sender<String>) -> Self {
        Self { user_id, session_id, tx }
    }

    /// Queue a text frame without blocking.
    ///
    /// Returns `false` when the queue is full or the writer is gone.
    pub fn send(&self, message: String) -> bool {
        self.tx.try_send(message).is_ok()
    }
}

/// Connections keyed by `(user_id, session_id)`.
///
/// Registering an already-present key replaces the old handle silently
/// (last write wins); a client reconnecting with the same session id simply
/// takes over.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, HashMap<String, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, replacing any existing one for the same key.
    pub async fn register(&self, handle: ConnectionHandle) {
        let mut conns = self.connections.write().await;
        let sessions = conns.entry(handle.user_id.clone()).or_default();
        if sessions
            .insert(handle.session_id.clone(), handle.clone())
            .is_some()
        {
            debug!(
                user_id = %handle.user_id,
                session_id = %handle.session_id,
                "connection replaced"
            );
        } else {
            debug!(
                user_id = %handle.user_id,
                session_id = %handle.session_id,
                "connection registered"
            );
        }
    }

    /// Remove a connection. Idempotent; empty user buckets are dropped.
    pub async fn unregister(&self, user_id: &str, session_id: &str) {
        let mut conns = self.connections.write().await;
        if let Some(sessions) = conns.get_mut(user_id) {
            let _ = sessions.remove(session_id);
            if sessions.is_empty() {
                let _ = conns.remove(user_id);
            }
            debug!(user_id, session_id, "connection unregistered");
        }
    }

    /// Broadcast an enveloped event to every session of `user_id`.
    ///
    /// The envelope is stamped and serialized once, at send time. Sessions
    /// named in `exclude` are skipped (used so an update's originator gets
    /// only the ack). Unknown users are a no-op.
    pub async fn broadcast_to_user(
        &self,
        user_id: &str,
        message_type: &str,
        data: Value,
        exclude: Option<&str>,
    ) {
        let envelope = Envelope::new(message_type, data);
        let wire = match envelope.to_wire() {
            Ok(w) => w,
            Err(e) => {
                warn!(message_type, error = %e, "failed to serialize broadcast");
                return;
            }
        };

        let conns = self.connections.read().await;
        let Some(sessions) = conns.get(user_id) else {
            debug!(user_id, message_type, "broadcast to user with no connections");
            return;
        };
        for (session_id, handle) in sessions {
            if exclude == Some(session_id.as_str()) {
                continue;
            }
            if !handle.send(wire.clone()) {
                warn!(user_id, session_id, message_type, "failed to queue broadcast");
            }
        }
    }

    /// Send a pre-serialized frame to one specific session.
    ///
    /// Returns `false` when the session is unknown or its queue rejected
    /// the frame.
    pub async fn send_to_session(&self, user_id: &str, session_id: &str, wire: String) -> bool {
        let conns = self.connections.read().await;
        conns
            .get(user_id)
            .and_then(|sessions| sessions.get(session_id))
            .is_some_and(|handle| handle.send(wire))
    }

    /// All user ids with at least one live connection.
    pub async fn users(&self) -> Vec<String> {
        self.connections.read().await.keys().cloned().collect()
    }

    /// Session ids registered for `user_id`.
    pub async fn sessions_for(&self, user_id: &str) -> Vec<String> {
        let conns = self.connections.read().await;
        conns
            .get(user_id)
            .map(|sessions| sessions.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Total live connections across all users.
    pub async fn connection_count(&self) -> usize {
        let conns = self.connections.read().await;
        conns.values().map(HashMap::len).sum()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
