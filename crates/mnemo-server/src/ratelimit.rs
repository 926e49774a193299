//! Sliding-window rate limiting per client identity.
//!
//! HTTP requests and WebSocket messages draw from independent budgets.
//! Each client identity maps to a vector of admission instants; a check
//! prunes instants older than the window, counts what remains, and appends
//! on admission. The per-entry DashMap lock makes prune-count-append atomic
//! for one identity without serializing unrelated clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use dashmap::DashMap;
use mnemo_settings::RateLimitSettings;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Errors from rate-limit admission.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Neither an authenticated user nor a remote address was available.
    #[error("unable to identify client for rate limiting")]
    IdentifierMissing,
}

/// Which budget a check draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// HTTP request admission.
    Http,
    /// WebSocket message / connection admission.
    Ws,
}

/// Sliding-window limiter over two independent channels.
pub struct RateLimiter {
    http: DashMap<String, Vec<Instant>>,
    ws: DashMap<String, Vec<Instant>>,
    http_limit: usize,
    ws_limit: usize,
    window: Duration,
}

impl RateLimiter {
    /// Build a limiter from settings.
    #[must_use]
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            http: DashMap::new(),
            ws: DashMap::new(),
            http_limit: settings.http_limit,
            ws_limit: settings.ws_limit,
            window: Duration::from_secs(settings.window_secs),
        }
    }

    /// Resolve the identity a check is charged against.
    ///
    /// Authenticated user id wins; unauthenticated callers are keyed by
    /// remote address. With neither, admission is impossible.
    pub fn client_id(
        user_id: Option<&str>,
        remote_addr: Option<SocketAddr>,
    ) -> Result<String, RateLimitError> {
        if let Some(user) = user_id {
            return Ok(user.to_string());
        }
        remote_addr
            .map(|addr| addr.ip().to_string())
            .ok_or(RateLimitError::IdentifierMissing)
    }

    fn budget(&self, channel: Channel) -> (&DashMap<String, Vec<Instant>>, usize) {
        match channel {
            Channel::Http => (&self.http, self.http_limit),
            Channel::Ws => (&self.ws, self.ws_limit),
        }
    }

    /// Admit or deny one event for `client_id` on `channel`.
    ///
    /// Admission appends to the window; denial leaves it untouched, so a
    /// denied client is not pushed further into the future.
    pub fn check(&self, channel: Channel, client_id: &str) -> bool {
        let (map, limit) = self.budget(channel);
        let now = Instant::now();
        let mut entry = map.entry(client_id.to_string()).or_default();
        entry.retain(|t| now.duration_since(*t) < self.window);
        if entry.len() >= limit {
            debug!(client_id, ?channel, used = entry.len(), "rate limit exceeded");
            return false;
        }
        entry.push(now);
        trace!(client_id, ?channel, used = entry.len(), "rate limit admit");
        true
    }

    fn remaining(&self, channel: Channel, client_id: &str) -> usize {
        let (map, limit) = self.budget(channel);
        let now = Instant::now();
        let used = map.get(client_id).map_or(0, |entry| {
            entry
                .iter()
                .filter(|t| now.duration_since(**t) < self.window)
                .count()
        });
        limit.saturating_sub(used)
    }

    /// Advisory quota headers for `client_id`, covering both channels.
    ///
    /// Read-only: unknown identities report a full budget.
    #[must_use]
    pub fn headers_for(&self, client_id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let pairs = [
            ("x-ratelimit-limit", self.http_limit),
            ("x-ratelimit-remaining", self.remaining(Channel::Http, client_id)),
            ("x-ratelimit-window", self.window.as_secs() as usize),
            ("x-ws-ratelimit-limit", self.ws_limit),
            ("x-ws-ratelimit-remaining", self.remaining(Channel::Ws, client_id)),
        ];
        for (name, value) in pairs {
            if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
                let _ = headers.insert(HeaderName::from_static(name), value);
            }
        }
        headers
    }

    fn sweep(&self) {
        let now = Instant::now();
        let window = self.window;
        for map in [&self.http, &self.ws] {
            map.retain(|_, entry| {
                entry.retain(|t| now.duration_since(*t) < window);
                !entry.is_empty()
            });
        }
        trace!(http_clients = self.http.len(), ws_clients = self.ws.len(), "rate limit sweep");
    }

    /// Spawn the periodic stale-entry sweeper.
    ///
    /// Runs once per window duration until `token` is cancelled. Each map
    /// is swept independently; no lock spans both.
    pub fn spawn_sweeper(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => {
                        debug!("rate limit sweeper stopped");
                        return;
                    }
                    () = tokio::time::sleep(limiter.window) => limiter.sweep(),
                }
            }
        })
    }

    /// Number of tracked identities on a channel (for tests and diagnostics).
    #[must_use]
    pub fn tracked(&self, channel: Channel) -> usize {
        self.budget(channel).0.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
