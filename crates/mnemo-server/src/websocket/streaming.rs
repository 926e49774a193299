//! Chunked content delivery and the bidirectional relay protocol.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use futures::{Stream, StreamExt};
use mnemo_core::message::{ChunkEnvelope, Inbound, ProtocolError, tags};
use mnemo_core::{Envelope, chunk_content};
use mnemo_settings::StreamingSettings;
use serde_json::json;
use tracing::{debug, warn};

use super::registry::{ConnectionHandle, ConnectionRegistry};

/// Streams memory content in chunks and runs relay sessions.
///
/// Chunk delivery is dual-path: every chunk is broadcast to the owning
/// user's live connections *and* yielded on the returned stream, so HTTP
/// callers can pull the same sequence the sockets see pushed.
pub struct StreamingCoordinator {
    registry: Arc<ConnectionRegistry>,
    chunk_size: usize,
    chunk_delay: Duration,
}

impl StreamingCoordinator {
    /// Build a coordinator over `registry` with settings-derived defaults.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, settings: &StreamingSettings) -> Self {
        Self {
            registry,
            chunk_size: settings.chunk_size,
            chunk_delay: Duration::from_millis(settings.chunk_delay_ms),
        }
    }

    /// Default chunk size from settings.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Stream `content` to `(user_id, session_id)` in `chunk_size`-character
    /// chunks.
    ///
    /// The stream is lazy; nothing is sent until it is polled. Chunks are
    /// 1-indexed, `done` is true exactly on the last, and a fixed pause
    /// separates consecutive chunks. If a chunk cannot be serialized the
    /// stream emits one terminal error chunk on both paths and stops.
    pub fn stream_chunks(
        &self,
        user_id: &str,
        session_id: &str,
        content: &str,
        chunk_size: usize,
    ) -> impl Stream<Item = ChunkEnvelope> + Send + use<> {
        let registry = Arc::clone(&self.registry);
        let delay = self.chunk_delay;
        let user_id = user_id.to_string();
        let session_id = session_id.to_string();
        let pieces = chunk_content(content, chunk_size);

        async_stream::stream! {
            let total = pieces.len();
            for (index, piece) in pieces.into_iter().enumerate() {
                if index > 0 {
                    tokio::time::sleep(delay).await;
                }
                let chunk = ChunkEnvelope::chunk(&session_id, index, total, piece);
                match serde_json::to_value(&chunk) {
                    Ok(data) => {
                        registry
                            .broadcast_to_user(&user_id, tags::MEMORY_CHUNK, data, None)
                            .await;
                        yield chunk;
                    }
                    Err(e) => {
                        warn!(user_id, session_id, error = %e, "chunk serialization failed");
                        let failure = Self::fail(&registry, &user_id, &session_id, e.to_string()).await;
                        yield failure;
                        return;
                    }
                }
            }
        }
    }

    /// Broadcast a terminal error chunk and return it for the pull path.
    pub async fn fail(
        registry: &ConnectionRegistry,
        user_id: &str,
        session_id: &str,
        message: String,
    ) -> ChunkEnvelope {
        let chunk = ChunkEnvelope::error(session_id, message);
        if let Ok(data) = serde_json::to_value(&chunk) {
            registry
                .broadcast_to_user(user_id, tags::ERROR, data, None)
                .await;
        }
        chunk
    }

    /// Drive one relay session until the peer disconnects.
    ///
    /// Receipt order is strict: each inbound frame is fully handled before
    /// the next is read.
    ///
    /// - `memory_update` fans out to the user's other sessions, then acks
    ///   the sender with a fresh timestamp.
    /// - `ping` answers `pong`, echoing the sender's timestamp verbatim.
    /// - Unknown tags are logged and ignored.
    /// - Peer close (or transport error) ends the session cleanly.
    /// - A structurally malformed payload is a [`ProtocolError`]; the
    ///   caller tears the session down.
    pub async fn relay_messages<S>(
        &self,
        mut incoming: S,
        handle: &ConnectionHandle,
    ) -> Result<(), ProtocolError>
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        while let Some(frame) = incoming.next().await {
            let message = match frame {
                Ok(m) => m,
                Err(e) => {
                    debug!(
                        user_id = %handle.user_id,
                        session_id = %handle.session_id,
                        error = %e,
                        "websocket transport error, closing relay"
                    );
                    return Ok(());
                }
            };

            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => return Ok(()),
                // Binary frames and protocol-level ping/pong are not part of
                // the relay protocol.
                Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => continue,
            };

            match Inbound::parse(&text)? {
                Inbound::MemoryUpdate { data } => {
                    self.registry
                        .broadcast_to_user(
                            &handle.user_id,
                            tags::MEMORY_UPDATE,
                            data,
                            Some(&handle.session_id),
                        )
                        .await;
                    let ack = Envelope::new(tags::MEMORY_UPDATE_ACK, json!({"status": "received"}));
                    match ack.to_wire() {
                        Ok(wire) => {
                            if !handle.send(wire) {
                                warn!(
                                    user_id = %handle.user_id,
                                    session_id = %handle.session_id,
                                    "failed to queue memory_update ack"
                                );
                            }
                        }
                        Err(e) => warn!(error = %e, "failed to serialize ack"),
                    }
                }
                Inbound::Ping { timestamp } => {
                    let pong = json!({"type": tags::PONG, "timestamp": timestamp});
                    if !handle.send(pong.to_string()) {
                        warn!(
                            user_id = %handle.user_id,
                            session_id = %handle.session_id,
                            "failed to queue pong"
                        );
                    }
                }
                Inbound::Unknown { tag } => {
                    warn!(
                        user_id = %handle.user_id,
                        session_id = %handle.session_id,
                        tag,
                        "ignoring message with unknown type"
                    );
                }
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
